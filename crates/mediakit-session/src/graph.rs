//! Abstraction over the native media graph.
//!
//! A session talks to its graph only through [`MediaGraph`] (and
//! [`CaptureGraph`] for camera graphs). Backends are created by a
//! [`GraphBackend`] and report frames and bus messages through a
//! [`GraphCallbacks`] handle, which may be invoked from any thread.
//!
//! The callback side never calls into the session. It stores the latest frame,
//! raises flags and queues bus messages; the session drains them on its control
//! thread through the paired [`ControlLink`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mediakit_models::{CameraDescription, DeviceOrientation, ExposureMode, FocusMode};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::frame::{FrameSlot, VideoFrame};

// ── Graph state ──────────────────────────────────────────────────────

/// Native graph states, ordered from idle to active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// Outcome of a state change request that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Success,
    /// The graph will reach the target state later; wait for it.
    Async,
    /// Live source, no preroll possible.
    NoPreroll,
}

/// A seek in the graph's time domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub rate: f64,
    pub position: Duration,
    /// Snap to the nearest key unit instead of decoding up to the exact position.
    pub key_unit: bool,
}

impl SeekRequest {
    pub fn key_unit(rate: f64, position: Duration) -> Self {
        Self {
            rate,
            position,
            key_unit: true,
        }
    }

    /// Flushing seek that keeps the exact position, used for rate changes.
    pub fn accurate(rate: f64, position: Duration) -> Self {
        Self {
            rate,
            position,
            key_unit: false,
        }
    }
}

// ── Bus messages ─────────────────────────────────────────────────────

/// Asynchronous message posted by the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    StateChanged { old: GraphState, new: GraphState },
    EndOfStream,
    Warning {
        source: String,
        message: String,
        debug: Option<String>,
    },
    Error {
        source: String,
        message: String,
        debug: Option<String>,
    },
    /// A still image or recording was written.
    CaptureDone { path: PathBuf },
}

// ── Graph traits ─────────────────────────────────────────────────────

/// Control surface of a playback graph.
///
/// All methods are called from the session's control thread.
pub trait MediaGraph: Send {
    /// Request a state transition.
    fn set_state(&mut self, state: GraphState) -> Result<StateChange, GraphError>;

    /// Block until a pending asynchronous transition completes or `timeout` elapses.
    fn wait_for_state(&mut self, timeout: Duration) -> Result<GraphState, GraphError>;

    fn current_state(&self) -> GraphState;

    fn set_uri(&mut self, uri: &str) -> Result<(), GraphError>;

    fn seek(&mut self, request: SeekRequest) -> Result<(), GraphError>;

    /// `None` when the graph cannot answer, e.g. before priming.
    fn query_duration(&self) -> Option<Duration>;

    fn query_position(&self) -> Option<Duration>;

    /// Linear volume in [0, 1].
    fn set_volume(&mut self, volume: f64);

    /// Stereo balance in [-1, 1]. Graphs without a panorama element return
    /// [`GraphError::Unsupported`].
    fn set_balance(&mut self, balance: f64) -> Result<(), GraphError>;

    /// Drop (or stop dropping) pending bus messages.
    fn set_flushing(&mut self, flushing: bool);

    /// Bring the graph to `Null` and release native resources. Called once,
    /// right before the graph is dropped.
    fn shutdown(&mut self);
}

/// A camera graph: a [`MediaGraph`] with capture controls.
pub trait CaptureGraph: MediaGraph {
    fn max_zoom(&self) -> f32;

    fn set_zoom(&mut self, zoom: f32) -> Result<(), GraphError>;

    /// Negotiated preview size, known after preroll.
    fn preview_size(&self) -> Option<(u32, u32)>;

    /// Start writing a still image. Completion arrives as [`BusMessage::CaptureDone`].
    fn start_image_capture(&mut self, path: &Path) -> Result<(), GraphError>;

    fn start_video_capture(&mut self, path: &Path) -> Result<(), GraphError>;

    /// Finish the current recording. Completion arrives as [`BusMessage::CaptureDone`].
    fn stop_video_capture(&mut self) -> Result<(), GraphError>;

    fn set_exposure_mode(&mut self, _mode: ExposureMode) -> Result<(), GraphError> {
        Err(GraphError::Unsupported("exposure mode"))
    }

    fn set_focus_mode(&mut self, _mode: FocusMode) -> Result<(), GraphError> {
        Err(GraphError::Unsupported("focus mode"))
    }

    /// `None` unlocks the capture orientation.
    fn set_capture_orientation(
        &mut self,
        _orientation: Option<DeviceOrientation>,
    ) -> Result<(), GraphError> {
        Err(GraphError::Unsupported("capture orientation"))
    }
}

/// Factory for native graphs plus the process-wide library hooks.
pub trait GraphBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process-wide library initialisation, called once by [`crate::MediaLibrary`].
    fn init(&self) -> Result<(), GraphError> {
        Ok(())
    }

    /// Process-wide teardown, called once.
    fn deinit(&self) {}

    fn build_player(
        &self,
        config: &SessionConfig,
        callbacks: GraphCallbacks,
    ) -> Result<Box<dyn MediaGraph>, GraphError>;

    fn build_camera(
        &self,
        config: &SessionConfig,
        callbacks: GraphCallbacks,
    ) -> Result<Box<dyn CaptureGraph>, GraphError>;

    fn available_cameras(&self) -> Vec<CameraDescription> {
        vec![CameraDescription::new("camera0")]
    }
}

/// Drive `graph` to `target`, waiting at most `timeout` for an async transition.
pub fn transition<G: MediaGraph + ?Sized>(
    graph: &mut G,
    target: GraphState,
    timeout: Duration,
) -> Result<(), GraphError> {
    match graph.set_state(target)? {
        StateChange::Success | StateChange::NoPreroll => Ok(()),
        StateChange::Async => {
            let reached = graph.wait_for_state(timeout)?;
            if reached == target {
                Ok(())
            } else {
                Err(GraphError::StateChange(target))
            }
        }
    }
}

// ── Callback handoff ─────────────────────────────────────────────────

struct CallbackShared {
    frame: FrameSlot,
    /// Open while the owning session is alive.
    active: AtomicBool,
    end_of_stream: AtomicBool,
    frame_pending: AtomicBool,
    bus: mpsc::UnboundedSender<BusMessage>,
}

/// Handle given to a graph for its callback thread(s).
#[derive(Clone)]
pub struct GraphCallbacks {
    shared: Arc<CallbackShared>,
}

impl GraphCallbacks {
    /// Create a callback handle and the control-thread end paired with it.
    pub fn channel() -> (GraphCallbacks, ControlLink) {
        let (bus, bus_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(CallbackShared {
            frame: FrameSlot::new(),
            active: AtomicBool::new(true),
            end_of_stream: AtomicBool::new(false),
            frame_pending: AtomicBool::new(false),
            bus,
        });
        (
            GraphCallbacks {
                shared: shared.clone(),
            },
            ControlLink { shared, bus_rx },
        )
    }

    /// Store a freshly decoded frame. Dropped once the session is disposed.
    pub fn frame_decoded(&self, frame: VideoFrame) {
        let shared = &self.shared;
        if shared.frame.replace_if_open(&shared.active, Arc::new(frame)) {
            shared.frame_pending.store(true, Ordering::Release);
        }
    }

    /// Hand a bus message to the control thread.
    pub fn post(&self, message: BusMessage) {
        if !self.is_active() {
            trace!(?message, "dropping bus message for inactive session");
            return;
        }
        match message {
            BusMessage::EndOfStream => {
                self.shared.end_of_stream.store(true, Ordering::Release);
            }
            other => {
                if self.shared.bus.send(other).is_err() {
                    debug!("control link closed, bus message dropped");
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }
}

/// Control-thread end of a [`GraphCallbacks`] pair.
pub struct ControlLink {
    shared: Arc<CallbackShared>,
    bus_rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl ControlLink {
    /// Consume the end-of-stream flag.
    pub fn take_end_of_stream(&self) -> bool {
        self.shared.end_of_stream.swap(false, Ordering::AcqRel)
    }

    pub fn end_of_stream_pending(&self) -> bool {
        self.shared.end_of_stream.load(Ordering::Acquire)
    }

    pub fn clear_end_of_stream(&self) {
        self.shared.end_of_stream.store(false, Ordering::Release);
    }

    /// Consume the "new frame since last poll" flag.
    pub fn take_frame_pending(&self) -> bool {
        self.shared.frame_pending.swap(false, Ordering::AcqRel)
    }

    /// All bus messages queued so far.
    pub fn drain(&mut self) -> Vec<BusMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.bus_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.shared.frame.latest()
    }

    /// Forget everything produced for the previous source.
    pub fn reset(&mut self) {
        self.shared.frame.clear();
        self.clear_end_of_stream();
        self.shared.frame_pending.store(false, Ordering::Release);
        let stale = self.drain().len();
        if stale > 0 {
            debug!(stale, "discarded bus messages from previous source");
        }
    }

    /// Stop accepting callbacks. In-flight callbacks complete as no-ops.
    pub fn deactivate(&mut self) {
        self.shared.frame.close(&self.shared.active);
        self.clear_end_of_stream();
        self.shared.frame_pending.store(false, Ordering::Release);
        self.drain();
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame() -> VideoFrame {
        VideoFrame::rgba(2, 2, 8, Bytes::from(vec![7u8; 16])).unwrap()
    }

    #[test]
    fn end_of_stream_only_sets_flag() {
        let (callbacks, mut link) = GraphCallbacks::channel();
        callbacks.post(BusMessage::EndOfStream);
        assert!(link.drain().is_empty());
        assert!(link.end_of_stream_pending());
        assert!(link.take_end_of_stream());
        assert!(!link.take_end_of_stream());
    }

    #[test]
    fn messages_cross_threads_in_order() {
        let (callbacks, mut link) = GraphCallbacks::channel();
        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                callbacks.post(BusMessage::Warning {
                    source: "src".into(),
                    message: format!("w{i}"),
                    debug: None,
                });
            }
        });
        handle.join().unwrap();
        let messages = link.drain();
        assert_eq!(messages.len(), 10);
        assert!(matches!(&messages[9], BusMessage::Warning { message, .. } if message == "w9"));
    }

    #[test]
    fn frames_raise_pending_flag_once() {
        let (callbacks, link) = GraphCallbacks::channel();
        callbacks.frame_decoded(frame());
        callbacks.frame_decoded(frame());
        assert!(link.take_frame_pending());
        assert!(!link.take_frame_pending());
        assert!(link.latest_frame().is_some());
    }

    #[test]
    fn deactivated_link_ignores_callbacks() {
        let (callbacks, mut link) = GraphCallbacks::channel();
        link.deactivate();
        callbacks.frame_decoded(frame());
        callbacks.post(BusMessage::EndOfStream);
        callbacks.post(BusMessage::CaptureDone { path: "a.jpg".into() });
        assert!(link.latest_frame().is_none());
        assert!(!link.take_end_of_stream());
        assert!(link.drain().is_empty());
        assert!(!callbacks.is_active());
    }

    #[test]
    fn reset_discards_previous_source_state() {
        let (callbacks, mut link) = GraphCallbacks::channel();
        callbacks.frame_decoded(frame());
        callbacks.post(BusMessage::EndOfStream);
        callbacks.post(BusMessage::StateChanged {
            old: GraphState::Null,
            new: GraphState::Ready,
        });
        link.reset();
        assert!(link.latest_frame().is_none());
        assert!(!link.end_of_stream_pending());
        assert!(link.drain().is_empty());
        assert!(link.is_active());
    }
}
