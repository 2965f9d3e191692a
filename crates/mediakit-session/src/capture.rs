//! Camera session: preview frames, zoom and still/video capture.
//!
//! Captures are asynchronous. The graph reports a written file as
//! [`BusMessage::CaptureDone`], which [`CaptureSession::poll`] turns into
//! `CaptureCompleted(path)`. Only one capture may be in flight; any failure is
//! reported as `CaptureCompleted("")`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mediakit_models::{DeviceOrientation, ExposureMode, FocusMode, Notification};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{GraphError, SessionError};
use crate::frame::VideoFrame;
use crate::graph::{
    transition, BusMessage, CaptureGraph, ControlLink, GraphBackend, GraphCallbacks, GraphState,
};
use crate::session::SessionState;
use crate::sink::{NotificationSink, Notifier};

pub const MIN_ZOOM: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
enum InFlight {
    Picture(PathBuf),
    Recording(PathBuf),
    /// Recording stopped, waiting for the file to be finalised.
    Finishing(PathBuf),
}

pub struct CaptureSession {
    graph: Option<Box<dyn CaptureGraph>>,
    link: ControlLink,
    notifier: Notifier,
    state: SessionState,
    zoom: f32,
    max_zoom: f32,
    preview: Option<(u32, u32)>,
    exposure: ExposureMode,
    focus: FocusMode,
    locked_orientation: Option<DeviceOrientation>,
    in_flight: Option<InFlight>,
    state_timeout: Duration,
}

impl CaptureSession {
    /// Build and preroll the camera graph.
    pub fn new(
        id: impl Into<String>,
        backend: &dyn GraphBackend,
        config: &SessionConfig,
        sink: impl NotificationSink + 'static,
    ) -> Result<Self, SessionError> {
        let id = id.into();
        let timeout = config.state_change_timeout();
        let (callbacks, link) = GraphCallbacks::channel();
        let mut graph = backend.build_camera(config, callbacks).map_err(|e| {
            error!(session = %id, error = %e, "failed to create a camera pipeline");
            e
        })?;

        if let Err(e) = transition(graph.as_mut(), GraphState::Paused, timeout) {
            error!(session = %id, error = %e, "camera failed to preroll");
            graph.shutdown();
            return Err(e.into());
        }

        let max_zoom = graph.max_zoom().max(MIN_ZOOM);
        let preview = graph.preview_size();
        info!(session = %id, max_zoom, ?preview, "camera session created");

        Ok(Self {
            graph: Some(graph),
            link,
            notifier: Notifier::new(id, Box::new(sink)),
            state: SessionState::Ready,
            zoom: MIN_ZOOM,
            max_zoom,
            preview,
            exposure: ExposureMode::default(),
            focus: FocusMode::default(),
            locked_orientation: None,
            in_flight: None,
            state_timeout: timeout,
        })
    }

    pub fn with_generated_id(
        backend: &dyn GraphBackend,
        config: &SessionConfig,
        sink: impl NotificationSink + 'static,
    ) -> Result<Self, SessionError> {
        Self::new(Uuid::new_v4().to_string(), backend, config, sink)
    }

    // ── Preview ──────────────────────────────────────────────────────

    pub fn play(&mut self) {
        if self.change_state(GraphState::Playing) {
            self.state = SessionState::Playing;
        }
    }

    pub fn pause(&mut self) {
        if self.change_state(GraphState::Paused) {
            self.state = SessionState::Paused;
        }
    }

    pub fn stop(&mut self) {
        if self.change_state(GraphState::Ready) {
            self.state = SessionState::Stopped;
        }
    }

    fn change_state(&mut self, target: GraphState) -> bool {
        let timeout = self.state_timeout;
        let Some(graph) = self.graph.as_mut() else {
            debug!(session = %self.notifier.session_id(), ?target, "camera disposed");
            return false;
        };
        match transition(graph.as_mut(), target, timeout) {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %self.notifier.session_id(), ?target, error = %e, "camera state change failed");
                false
            }
        }
    }

    // ── Zoom ─────────────────────────────────────────────────────────

    pub fn set_zoom_level(&mut self, zoom: f32) -> Result<(), SessionError> {
        if zoom.is_nan() || zoom < MIN_ZOOM || zoom > self.max_zoom {
            warn!(session = %self.id(), zoom, max = self.max_zoom, "zoom level out of range");
            return Err(SessionError::InvalidInput(format!(
                "zoom level {zoom} outside [{MIN_ZOOM}, {}]",
                self.max_zoom
            )));
        }
        let graph = self.graph.as_mut().ok_or(SessionError::Disposed)?;
        graph.set_zoom(zoom)?;
        self.zoom = zoom;
        Ok(())
    }

    pub fn zoom_level(&self) -> f32 {
        self.zoom
    }

    pub fn min_zoom_level(&self) -> f32 {
        MIN_ZOOM
    }

    pub fn max_zoom_level(&self) -> f32 {
        self.max_zoom
    }

    // ── Capture ──────────────────────────────────────────────────────

    /// Write a still image to `path`.
    pub fn take_picture(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        if !self.capture_slot_free() {
            return;
        }
        let result = match self.graph.as_mut() {
            Some(graph) => graph.start_image_capture(&path),
            None => Err(GraphError::ShutDown),
        };
        self.begin_capture(result, InFlight::Picture(path));
    }

    pub fn start_video_recording(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        if !self.capture_slot_free() {
            return;
        }
        let result = match self.graph.as_mut() {
            Some(graph) => graph.start_video_capture(&path),
            None => Err(GraphError::ShutDown),
        };
        self.begin_capture(result, InFlight::Recording(path));
    }

    /// Finish the current recording; completion arrives on a later poll.
    pub fn stop_video_recording(&mut self) {
        let path = match self.in_flight.take() {
            Some(InFlight::Recording(path)) => path,
            other => {
                self.in_flight = other;
                warn!(session = %self.id(), "no recording in progress");
                self.notifier
                    .emit(Notification::CaptureCompleted(String::new()));
                return;
            }
        };
        let result = match self.graph.as_mut() {
            Some(graph) => graph.stop_video_capture(),
            None => Err(GraphError::ShutDown),
        };
        match result {
            Ok(()) => self.in_flight = Some(InFlight::Finishing(path)),
            Err(e) => {
                warn!(session = %self.id(), error = %e, "failed to stop recording");
                self.notifier
                    .emit(Notification::CaptureCompleted(String::new()));
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.in_flight, Some(InFlight::Recording(_)))
    }

    pub fn capture_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    fn capture_slot_free(&self) -> bool {
        if self.in_flight.is_some() {
            warn!(session = %self.id(), "capture already in progress");
            self.notifier
                .emit(Notification::CaptureCompleted(String::new()));
            return false;
        }
        true
    }

    fn begin_capture(&mut self, result: Result<(), GraphError>, capture: InFlight) {
        match result {
            Ok(()) => {
                debug!(session = %self.id(), ?capture, "capture started");
                self.in_flight = Some(capture);
            }
            Err(e) => {
                warn!(session = %self.id(), error = %e, "failed to start capture");
                self.notifier
                    .emit(Notification::CaptureCompleted(String::new()));
            }
        }
    }

    // ── Camera controls ──────────────────────────────────────────────

    pub fn set_exposure_mode(&mut self, mode: ExposureMode) {
        self.exposure = mode;
        let result = self.graph.as_mut().map(|graph| graph.set_exposure_mode(mode));
        self.report_control("exposure mode", result);
    }

    pub fn set_focus_mode(&mut self, mode: FocusMode) {
        self.focus = mode;
        let result = self.graph.as_mut().map(|graph| graph.set_focus_mode(mode));
        self.report_control("focus mode", result);
    }

    pub fn lock_capture_orientation(&mut self, orientation: DeviceOrientation) {
        self.locked_orientation = Some(orientation);
        let result = self
            .graph
            .as_mut()
            .map(|graph| graph.set_capture_orientation(Some(orientation)));
        self.report_control("capture orientation", result);
    }

    pub fn unlock_capture_orientation(&mut self) {
        self.locked_orientation = None;
        let result = self
            .graph
            .as_mut()
            .map(|graph| graph.set_capture_orientation(None));
        self.report_control("capture orientation", result);
    }

    fn report_control(&self, control: &str, result: Option<Result<(), GraphError>>) {
        match result {
            Some(Ok(())) | None => {}
            Some(Err(GraphError::Unsupported(what))) => {
                debug!(session = %self.id(), what, "camera control not supported by graph");
            }
            Some(Err(e)) => {
                warn!(session = %self.id(), control, error = %e, "failed to apply camera control");
            }
        }
    }

    pub fn exposure_mode(&self) -> ExposureMode {
        self.exposure
    }

    pub fn focus_mode(&self) -> FocusMode {
        self.focus
    }

    pub fn locked_capture_orientation(&self) -> Option<DeviceOrientation> {
        self.locked_orientation
    }

    // ── Event pump ───────────────────────────────────────────────────

    pub fn poll(&mut self) {
        for message in self.link.drain() {
            match message {
                BusMessage::CaptureDone { path } => self.capture_done(path),
                BusMessage::Error {
                    source,
                    message,
                    debug: details,
                } => {
                    error!(session = %self.id(), %source, details = ?details, "{message}");
                    self.notifier.emit(Notification::Error(message));
                    if self.in_flight.take().is_some() {
                        self.notifier
                            .emit(Notification::CaptureCompleted(String::new()));
                    }
                }
                BusMessage::Warning {
                    source,
                    message,
                    debug: details,
                } => {
                    warn!(session = %self.id(), %source, details = ?details, "{message}");
                    self.notifier
                        .emit(Notification::Log(format!("{source}: {message}")));
                }
                BusMessage::StateChanged { old, new } => {
                    debug!(session = %self.id(), ?old, ?new, "camera state changed");
                }
                BusMessage::EndOfStream => {}
            }
        }
        if self.link.take_frame_pending() {
            self.notifier.emit(Notification::FrameDecoded);
        }
        // A camera has no end of stream worth reporting.
        self.link.clear_end_of_stream();
    }

    fn capture_done(&mut self, path: PathBuf) {
        match self.in_flight.take() {
            Some(InFlight::Recording(expected)) => {
                // Still recording; this is not the final file.
                debug!(session = %self.id(), path = %path.display(), "intermediate capture message");
                self.in_flight = Some(InFlight::Recording(expected));
            }
            Some(_) => {
                info!(session = %self.id(), path = %path.display(), "capture completed");
                self.notifier
                    .emit(Notification::CaptureCompleted(path.display().to_string()));
            }
            None => {
                debug!(session = %self.id(), path = %path.display(), "capture completion without request");
            }
        }
    }

    // ── Teardown and accessors ───────────────────────────────────────

    pub fn dispose(&mut self) {
        let Some(mut graph) = self.graph.take() else {
            warn!(session = %self.id(), "already disposed");
            return;
        };
        if self.in_flight.take().is_some() {
            debug!(session = %self.id(), "dropping capture in flight");
        }
        self.link.deactivate();
        graph.set_flushing(true);
        graph.shutdown();
        drop(graph);
        self.state = SessionState::Disposed;
        info!(session = %self.id(), "camera session disposed");
    }

    /// Preview size, preferring the latest decoded frame over the negotiated caps.
    pub fn preview_size(&self) -> Option<(u32, u32)> {
        self.latest_frame()
            .map(|frame| frame.size())
            .or(self.preview)
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.link.latest_frame()
    }

    pub fn id(&self) -> &str {
        self.notifier.session_id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.graph.is_some()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.graph.is_some() {
            self.dispose();
        }
    }
}
