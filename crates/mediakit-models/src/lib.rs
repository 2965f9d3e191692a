pub mod camera;
pub mod event;
pub mod playback;

pub use camera::{CameraDescription, DeviceOrientation, ExposureMode, FocusMode, LensDirection};
pub use event::{Notification, SessionEvent};
pub use playback::ReleaseMode;
