pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod graph;
pub mod library;
pub mod locator;
pub mod null;
pub mod registry;
pub mod session;
mod sink;

#[cfg(feature = "gst")]
pub mod gst;

pub use capture::CaptureSession;
pub use config::SessionConfig;
pub use error::{GraphError, SessionError};
pub use frame::{PixelFormat, VideoFrame};
pub use graph::{CaptureGraph, GraphBackend, GraphCallbacks, GraphState, MediaGraph};
pub use library::MediaLibrary;
pub use registry::{Disposable, SessionRegistry};
pub use session::{MediaSession, SessionState, UNKNOWN_TIME};
pub use sink::NotificationSink;
