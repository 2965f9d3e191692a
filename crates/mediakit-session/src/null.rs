//! In-memory graph backend.
//!
//! `NullGraph` behaves like a well-formed native graph without decoding
//! anything: it tracks state, position and duration, answers queries once
//! primed and records every call it receives. Each graph comes with a
//! [`NullDriver`] that plays the role of the engine's streaming thread, so
//! frames, end of stream and bus errors can be injected from any thread.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use mediakit_models::{CameraDescription, DeviceOrientation, ExposureMode, FocusMode, LensDirection};
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::frame::VideoFrame;
use crate::graph::{
    BusMessage, CaptureGraph, GraphBackend, GraphCallbacks, GraphState, MediaGraph, SeekRequest,
    StateChange,
};

/// Behaviour of graphs built by a [`NullBackend`].
#[derive(Debug, Clone)]
pub struct NullOptions {
    /// Reported once a source is primed. `None` simulates a live stream.
    pub duration: Option<Duration>,
    /// Whether the graph carries a balance element.
    pub has_panorama: bool,
    /// Upward transitions to Paused or Playing complete asynchronously.
    pub async_transitions: bool,
    /// Fail graph construction.
    pub fail_build: bool,
    pub max_zoom: f32,
    pub preview: (u32, u32),
    /// Keep captures in flight until [`NullDriver::finish_capture`].
    pub hold_captures: bool,
    /// Advance the position with the wall clock while playing and post end of
    /// stream when it reaches the duration.
    pub realtime: bool,
    /// Keep a log of every graph call for [`NullDriver::calls`].
    pub record_calls: bool,
}

impl Default for NullOptions {
    fn default() -> Self {
        Self {
            duration: Some(Duration::from_secs(60)),
            has_panorama: true,
            async_transitions: false,
            fail_build: false,
            max_zoom: 4.0,
            preview: (640, 480),
            hold_captures: false,
            realtime: false,
            record_calls: true,
        }
    }
}

/// A native call as seen by a [`NullGraph`].
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    SetState(GraphState),
    WaitForState,
    SetUri(String),
    Seek(SeekRequest),
    QueryDuration,
    QueryPosition,
    SetVolume(f64),
    SetBalance(f64),
    SetFlushing(bool),
    Shutdown,
    SetZoom(f32),
    StartImageCapture(PathBuf),
    StartVideoCapture(PathBuf),
    StopVideoCapture,
    SetExposureMode(ExposureMode),
    SetFocusMode(FocusMode),
    SetCaptureOrientation(Option<DeviceOrientation>),
}

#[derive(Debug)]
enum Capture {
    Image(PathBuf),
    Video(PathBuf),
}

struct NullState {
    state: GraphState,
    pending: Option<GraphState>,
    uri: Option<String>,
    duration: Option<Duration>,
    position: Duration,
    /// Set while playing in realtime mode.
    clock: Option<Instant>,
    eos_posted: bool,
    rate: f64,
    volume: f64,
    balance: f64,
    zoom: f32,
    flushing: bool,
    shut_down: bool,
    capture: Option<Capture>,
    fail_state_changes: bool,
    reject_seeks: bool,
    stall_async: bool,
    fail_captures: bool,
    frames: u32,
    calls: Vec<GraphCall>,
}

impl NullState {
    fn new(options: &NullOptions) -> Self {
        Self {
            state: GraphState::Null,
            pending: None,
            uri: None,
            duration: options.duration,
            position: Duration::ZERO,
            clock: None,
            eos_posted: false,
            rate: 1.0,
            volume: 1.0,
            balance: 0.0,
            zoom: 1.0,
            flushing: false,
            shut_down: false,
            capture: None,
            fail_state_changes: false,
            reject_seeks: false,
            stall_async: false,
            fail_captures: false,
            frames: 0,
            calls: Vec::new(),
        }
    }

    fn primed(&self) -> bool {
        self.state >= GraphState::Paused && self.uri.is_some()
    }

    fn clamp_to_duration(&self, position: Duration) -> Duration {
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn current_position(&self) -> Duration {
        let elapsed = self
            .clock
            .map(|start| start.elapsed().mul_f64(self.rate))
            .unwrap_or_default();
        self.clamp_to_duration(self.position + elapsed)
    }

    /// Fold wall clock progress into `position`.
    fn settle_clock(&mut self) {
        if self.clock.is_some() {
            self.position = self.current_position();
            self.clock = None;
        }
    }
}

fn lock(state: &Mutex<NullState>) -> MutexGuard<'_, NullState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory for [`NullGraph`]s.
pub struct NullBackend {
    options: NullOptions,
    last: Mutex<Option<NullDriver>>,
}

impl NullBackend {
    pub fn new(options: NullOptions) -> Self {
        Self {
            options,
            last: Mutex::new(None),
        }
    }

    /// Driver of the most recently built graph.
    pub fn last_driver(&self) -> Option<NullDriver> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn build(&self, callbacks: GraphCallbacks) -> Result<NullGraph, GraphError> {
        if self.options.fail_build {
            return Err(GraphError::ElementCreation {
                element: "null".into(),
                reason: "construction disabled".into(),
            });
        }
        let state = Arc::new(Mutex::new(NullState::new(&self.options)));
        let driver = NullDriver {
            state: state.clone(),
            callbacks: callbacks.clone(),
        };
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(driver);
        Ok(NullGraph {
            options: self.options.clone(),
            state,
            callbacks,
        })
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(NullOptions::default())
    }
}

impl GraphBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn build_player(
        &self,
        _config: &SessionConfig,
        callbacks: GraphCallbacks,
    ) -> Result<Box<dyn MediaGraph>, GraphError> {
        Ok(Box::new(self.build(callbacks)?))
    }

    fn build_camera(
        &self,
        _config: &SessionConfig,
        callbacks: GraphCallbacks,
    ) -> Result<Box<dyn CaptureGraph>, GraphError> {
        let graph = self.build(callbacks)?;
        // Cameras have no source locator; the device is implied.
        lock(&graph.state).uri = Some("null://camera".into());
        Ok(Box::new(graph))
    }

    fn available_cameras(&self) -> Vec<CameraDescription> {
        let mut camera = CameraDescription::new("null0");
        camera.lens_facing = LensDirection::Front;
        vec![camera]
    }
}

/// Deterministic in-memory graph.
pub struct NullGraph {
    options: NullOptions,
    state: Arc<Mutex<NullState>>,
    callbacks: GraphCallbacks,
}

impl NullGraph {
    fn lock(&self) -> MutexGuard<'_, NullState> {
        lock(&self.state)
    }

    fn record(&self, call: GraphCall) -> MutexGuard<'_, NullState> {
        let mut state = self.lock();
        trace!(?call, "null graph call");
        if self.options.record_calls {
            state.calls.push(call);
        }
        state
    }

    fn enter(&self, state: &mut NullState, target: GraphState) {
        let old = state.state;
        if old == target {
            return;
        }
        if old == GraphState::Playing {
            state.settle_clock();
        }
        state.state = target;
        if target == GraphState::Playing && self.options.realtime {
            state.clock = Some(Instant::now());
        }
        if target == GraphState::Null {
            state.position = Duration::ZERO;
            state.eos_posted = false;
        }
        if !state.flushing {
            self.callbacks
                .post(BusMessage::StateChanged { old, new: target });
        }
    }
}

impl MediaGraph for NullGraph {
    fn set_state(&mut self, target: GraphState) -> Result<StateChange, GraphError> {
        let mut state = self.record(GraphCall::SetState(target));
        if state.shut_down {
            return Err(GraphError::ShutDown);
        }
        if target == GraphState::Null {
            state.pending = None;
            self.enter(&mut state, target);
            return Ok(StateChange::Success);
        }
        if state.fail_state_changes || (target >= GraphState::Paused && state.uri.is_none()) {
            return Err(GraphError::StateChange(target));
        }
        if self.options.async_transitions && target > state.state && target >= GraphState::Paused
        {
            state.pending = Some(target);
            return Ok(StateChange::Async);
        }
        state.pending = None;
        self.enter(&mut state, target);
        Ok(StateChange::Success)
    }

    fn wait_for_state(&mut self, timeout: Duration) -> Result<GraphState, GraphError> {
        let mut state = self.record(GraphCall::WaitForState);
        let Some(target) = state.pending else {
            return Ok(state.state);
        };
        if state.stall_async {
            debug!(?target, ?timeout, "null graph stalled");
            return Err(GraphError::StateChangeTimeout(timeout));
        }
        state.pending = None;
        self.enter(&mut state, target);
        Ok(target)
    }

    fn current_state(&self) -> GraphState {
        self.lock().state
    }

    fn set_uri(&mut self, uri: &str) -> Result<(), GraphError> {
        let mut state = self.record(GraphCall::SetUri(uri.to_string()));
        if state.shut_down {
            return Err(GraphError::ShutDown);
        }
        state.uri = Some(uri.to_string());
        state.position = Duration::ZERO;
        state.duration = self.options.duration;
        state.eos_posted = false;
        Ok(())
    }

    fn seek(&mut self, request: SeekRequest) -> Result<(), GraphError> {
        let mut state = self.record(GraphCall::Seek(request));
        if state.reject_seeks {
            return Err(GraphError::Seek("seeks disabled".into()));
        }
        if !state.primed() {
            return Err(GraphError::Seek(format!("graph is {:?}", state.state)));
        }
        state.position = state.clamp_to_duration(request.position);
        state.rate = request.rate;
        state.eos_posted = false;
        if state.clock.is_some() {
            state.clock = Some(Instant::now());
        }
        Ok(())
    }

    fn query_duration(&self) -> Option<Duration> {
        let state = self.record(GraphCall::QueryDuration);
        if !state.primed() {
            return None;
        }
        state.duration
    }

    fn query_position(&self) -> Option<Duration> {
        let mut state = self.record(GraphCall::QueryPosition);
        if !state.primed() {
            return None;
        }
        let position = state.current_position();
        if state.clock.is_some() && !state.eos_posted && Some(position) == state.duration {
            state.eos_posted = true;
            self.callbacks.post(BusMessage::EndOfStream);
        }
        Some(position)
    }

    fn set_volume(&mut self, volume: f64) {
        self.record(GraphCall::SetVolume(volume)).volume = volume;
    }

    fn set_balance(&mut self, balance: f64) -> Result<(), GraphError> {
        let mut state = self.record(GraphCall::SetBalance(balance));
        if !self.options.has_panorama {
            return Err(GraphError::Unsupported("balance"));
        }
        state.balance = balance;
        Ok(())
    }

    fn set_flushing(&mut self, flushing: bool) {
        self.record(GraphCall::SetFlushing(flushing)).flushing = flushing;
    }

    fn shutdown(&mut self) {
        let mut state = self.record(GraphCall::Shutdown);
        state.pending = None;
        self.enter(&mut state, GraphState::Null);
        state.capture = None;
        state.shut_down = true;
    }
}

impl CaptureGraph for NullGraph {
    fn max_zoom(&self) -> f32 {
        self.options.max_zoom
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<(), GraphError> {
        self.record(GraphCall::SetZoom(zoom)).zoom = zoom;
        Ok(())
    }

    fn preview_size(&self) -> Option<(u32, u32)> {
        (self.lock().state >= GraphState::Paused).then_some(self.options.preview)
    }

    fn start_image_capture(&mut self, path: &Path) -> Result<(), GraphError> {
        let mut state = self.record(GraphCall::StartImageCapture(path.to_path_buf()));
        check_capture(&state)?;
        if self.options.hold_captures {
            state.capture = Some(Capture::Image(path.to_path_buf()));
        } else {
            self.callbacks.post(BusMessage::CaptureDone {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn start_video_capture(&mut self, path: &Path) -> Result<(), GraphError> {
        let mut state = self.record(GraphCall::StartVideoCapture(path.to_path_buf()));
        check_capture(&state)?;
        state.capture = Some(Capture::Video(path.to_path_buf()));
        Ok(())
    }

    fn stop_video_capture(&mut self) -> Result<(), GraphError> {
        let mut state = self.record(GraphCall::StopVideoCapture);
        match state.capture.take() {
            Some(Capture::Video(path)) => {
                self.callbacks.post(BusMessage::CaptureDone { path });
                Ok(())
            }
            other => {
                state.capture = other;
                Err(GraphError::Capture("no recording in progress".into()))
            }
        }
    }

    fn set_exposure_mode(&mut self, mode: ExposureMode) -> Result<(), GraphError> {
        self.record(GraphCall::SetExposureMode(mode));
        Ok(())
    }

    fn set_focus_mode(&mut self, mode: FocusMode) -> Result<(), GraphError> {
        self.record(GraphCall::SetFocusMode(mode));
        Ok(())
    }

    fn set_capture_orientation(
        &mut self,
        orientation: Option<DeviceOrientation>,
    ) -> Result<(), GraphError> {
        self.record(GraphCall::SetCaptureOrientation(orientation));
        Ok(())
    }
}

fn check_capture(state: &NullState) -> Result<(), GraphError> {
    if state.fail_captures {
        return Err(GraphError::Capture("captures disabled".into()));
    }
    if state.state < GraphState::Paused {
        return Err(GraphError::Capture(format!("camera is {:?}", state.state)));
    }
    if state.capture.is_some() {
        return Err(GraphError::Capture("capture already running".into()));
    }
    Ok(())
}

/// Test-side handle of a [`NullGraph`]. Cloneable and usable from any thread.
#[derive(Clone)]
pub struct NullDriver {
    state: Arc<Mutex<NullState>>,
    callbacks: GraphCallbacks,
}

impl NullDriver {
    fn lock(&self) -> MutexGuard<'_, NullState> {
        lock(&self.state)
    }

    /// Deliver a solid RGBA frame through the decode callback.
    pub fn push_frame(&self, width: u32, height: u32) {
        let value = {
            let mut state = self.lock();
            state.frames = state.frames.wrapping_add(1);
            (state.frames % 251) as u8
        };
        let data = Bytes::from(vec![value; width as usize * height as usize * 4]);
        match VideoFrame::rgba(width, height, width * 4, data) {
            Ok(frame) => self.callbacks.frame_decoded(frame),
            Err(e) => debug!(error = %e, "null frame rejected"),
        }
    }

    /// Jump to the end and post end of stream.
    pub fn end_of_stream(&self) {
        {
            let mut state = self.lock();
            state.settle_clock();
            if let Some(duration) = state.duration {
                state.position = duration;
            }
            state.eos_posted = true;
        }
        self.callbacks.post(BusMessage::EndOfStream);
    }

    pub fn warning(&self, message: &str) {
        self.callbacks.post(BusMessage::Warning {
            source: "null".into(),
            message: message.into(),
            debug: None,
        });
    }

    pub fn error(&self, message: &str) {
        self.callbacks.post(BusMessage::Error {
            source: "null".into(),
            message: message.into(),
            debug: Some("injected".into()),
        });
    }

    /// Move the playhead forward, stopping at the duration.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        let position = state.position + by;
        state.position = state.clamp_to_duration(position);
    }

    pub fn set_duration(&self, duration: Option<Duration>) {
        self.lock().duration = duration;
    }

    pub fn fail_state_changes(&self, fail: bool) {
        self.lock().fail_state_changes = fail;
    }

    pub fn reject_seeks(&self, reject: bool) {
        self.lock().reject_seeks = reject;
    }

    /// Make pending asynchronous transitions time out.
    pub fn stall_async(&self, stall: bool) {
        self.lock().stall_async = stall;
    }

    pub fn fail_captures(&self, fail: bool) {
        self.lock().fail_captures = fail;
    }

    /// Complete a held image capture. Returns `false` if none is in flight.
    pub fn finish_capture(&self) -> bool {
        let path = match self.lock().capture.take() {
            Some(Capture::Image(path)) | Some(Capture::Video(path)) => path,
            None => return false,
        };
        self.callbacks.post(BusMessage::CaptureDone { path });
        true
    }

    /// Abort the capture in flight with a bus error.
    pub fn abort_capture(&self, message: &str) -> bool {
        if self.lock().capture.take().is_none() {
            return false;
        }
        self.error(message);
        true
    }

    pub fn state(&self) -> GraphState {
        self.lock().state
    }

    pub fn uri(&self) -> Option<String> {
        self.lock().uri.clone()
    }

    pub fn position(&self) -> Duration {
        self.lock().current_position()
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn volume(&self) -> f64 {
        self.lock().volume
    }

    pub fn balance(&self) -> f64 {
        self.lock().balance
    }

    pub fn zoom(&self) -> f32 {
        self.lock().zoom
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GraphCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::transition;

    fn graph(options: NullOptions) -> (NullGraph, NullDriver, crate::graph::ControlLink) {
        let backend = NullBackend::new(options);
        let (callbacks, link) = GraphCallbacks::channel();
        let graph = backend.build(callbacks).unwrap();
        (graph, backend.last_driver().unwrap(), link)
    }

    #[test]
    fn paused_requires_a_source() {
        let (mut graph, _driver, _link) = graph(NullOptions::default());
        assert!(graph.set_state(GraphState::Ready).is_ok());
        assert!(matches!(
            graph.set_state(GraphState::Paused),
            Err(GraphError::StateChange(GraphState::Paused))
        ));
    }

    #[test]
    fn queries_need_priming() {
        let (mut graph, _driver, _link) = graph(NullOptions::default());
        graph.set_uri("null://a").unwrap();
        assert_eq!(graph.query_duration(), None);
        graph.set_state(GraphState::Paused).unwrap();
        assert_eq!(graph.query_duration(), Some(Duration::from_secs(60)));
        assert_eq!(graph.query_position(), Some(Duration::ZERO));
    }

    #[test]
    fn async_transitions_complete_on_wait() {
        let options = NullOptions {
            async_transitions: true,
            ..NullOptions::default()
        };
        let (mut graph, driver, _link) = graph(options);
        graph.set_uri("null://a").unwrap();
        assert_eq!(
            graph.set_state(GraphState::Paused).unwrap(),
            StateChange::Async
        );
        assert_eq!(graph.current_state(), GraphState::Null);
        assert_eq!(
            graph.wait_for_state(Duration::from_millis(10)).unwrap(),
            GraphState::Paused
        );
        assert_eq!(graph.current_state(), GraphState::Paused);

        driver.stall_async(true);
        let err = transition(&mut graph, GraphState::Playing, Duration::from_millis(10));
        assert!(matches!(err, Err(GraphError::StateChangeTimeout(_))));
        assert_eq!(driver.state(), GraphState::Paused);
    }

    #[test]
    fn seeks_clamp_to_duration() {
        let (mut graph, driver, _link) = graph(NullOptions::default());
        graph.set_uri("null://a").unwrap();
        graph.set_state(GraphState::Paused).unwrap();
        graph
            .seek(SeekRequest::key_unit(1.0, Duration::from_secs(600)))
            .unwrap();
        assert_eq!(driver.position(), Duration::from_secs(60));
    }

    #[test]
    fn unrecorded_graphs_keep_no_call_log() {
        let options = NullOptions {
            realtime: true,
            record_calls: false,
            ..NullOptions::default()
        };
        let (mut graph, driver, _link) = graph(options);
        graph.set_uri("null://a").unwrap();
        graph.set_state(GraphState::Playing).unwrap();
        for _ in 0..10_000 {
            graph.query_position();
        }
        assert!(driver.calls().is_empty());
        assert_eq!(driver.state(), GraphState::Playing);
    }

    #[test]
    fn state_changes_reach_the_bus() {
        let (mut graph, _driver, mut link) = graph(NullOptions::default());
        graph.set_state(GraphState::Ready).unwrap();
        assert_eq!(
            link.drain(),
            vec![BusMessage::StateChanged {
                old: GraphState::Null,
                new: GraphState::Ready
            }]
        );
    }
}
