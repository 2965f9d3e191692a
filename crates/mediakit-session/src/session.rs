//! Playback session: one player, one graph.
//!
//! # Threads
//!
//! A [`MediaSession`] is owned by a single control thread. The graph delivers
//! frames and bus messages on its own threads through [`GraphCallbacks`]; they
//! only touch the frame slot, two atomic flags and a message queue. Every
//! notification is emitted from a control-thread call ([`MediaSession::poll`],
//! [`MediaSession::query_position`] or a transport operation).
//!
//! # State machine
//!
//! ```text
//! Uninitialized --set_source--> Ready --resume--> Playing <--> Paused
//!                                 ^                   \         /
//!                                 +----set_source---- Stopped <-+
//! any --dispose--> Disposed
//! ```
//!
//! [`GraphCallbacks`]: crate::graph::GraphCallbacks

use std::sync::Arc;
use std::time::Duration;

use mediakit_models::{Notification, ReleaseMode};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::frame::VideoFrame;
use crate::graph::{
    transition, BusMessage, ControlLink, GraphBackend, GraphCallbacks, GraphState, MediaGraph,
    SeekRequest,
};
use crate::locator;
use crate::sink::{NotificationSink, Notifier};

/// Returned by duration/position queries when the graph cannot answer.
pub const UNKNOWN_TIME: i64 = -1;

/// Largest seek target whose nanosecond value still fits a 64-bit native clock.
pub const MAX_SEEK_MS: u64 = u64::MAX / 1_000_000;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Stopped,
    Disposed,
}

/// A playback session over one native graph.
pub struct MediaSession {
    graph: Option<Box<dyn MediaGraph>>,
    link: ControlLink,
    notifier: Notifier,
    state: SessionState,
    source: Option<String>,
    rate: f64,
    volume: f64,
    balance: f64,
    looping: bool,
    /// Primed: the graph holds a source and can answer queries.
    initialized: bool,
    playing: bool,
    /// Resume was requested before the session was primed.
    start_deferred: bool,
    /// Playback started before the duration was queryable.
    duration_pending: bool,
    state_timeout: Duration,
}

impl MediaSession {
    /// Build the graph and create a session around it.
    pub fn new(
        id: impl Into<String>,
        backend: &dyn GraphBackend,
        config: &SessionConfig,
        sink: impl NotificationSink + 'static,
    ) -> Result<Self, SessionError> {
        let id = id.into();
        let (callbacks, link) = GraphCallbacks::channel();
        let mut graph = backend.build_player(config, callbacks).map_err(|e| {
            error!(session = %id, error = %e, "failed to create a pipeline");
            e
        })?;

        let volume = clamp_volume(config.initial_volume).unwrap_or(1.0);
        graph.set_volume(volume);

        info!(session = %id, backend = backend.name(), "media session created");

        Ok(Self {
            graph: Some(graph),
            link,
            notifier: Notifier::new(id, Box::new(sink)),
            state: SessionState::Uninitialized,
            source: None,
            rate: 1.0,
            volume,
            balance: 0.0,
            looping: config.looping,
            initialized: false,
            playing: false,
            start_deferred: false,
            duration_pending: false,
            state_timeout: config.state_change_timeout(),
        })
    }

    /// Like [`MediaSession::new`] with a random id.
    pub fn with_generated_id(
        backend: &dyn GraphBackend,
        config: &SessionConfig,
        sink: impl NotificationSink + 'static,
    ) -> Result<Self, SessionError> {
        Self::new(Uuid::new_v4().to_string(), backend, config, sink)
    }

    // ── Source ───────────────────────────────────────────────────────

    /// Apply a new source and prime the graph.
    ///
    /// Setting the current source again only re-announces `Prepared`,
    /// unless the previous prime failed, in which case it is retried.
    pub fn set_source(&mut self, locator: &str) {
        if self.graph.is_none() {
            warn!(session = %self.id(), "set_source on a disposed session");
            return;
        }

        let uri = if locator.is_empty() {
            String::new()
        } else {
            locator::normalize(locator)
        };

        if self.initialized && self.source.as_deref() == Some(uri.as_str()) {
            debug!(session = %self.id(), uri = %uri, "source unchanged");
            self.notifier.emit(Notification::Prepared(true));
            return;
        }

        self.teardown();

        if uri.is_empty() {
            debug!(session = %self.id(), "source cleared");
            self.notifier.emit(Notification::Prepared(false));
            return;
        }
        self.source = Some(uri.clone());

        let primed = match self.prime(&uri) {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %self.id(), uri = %uri, error = %e, "unable to prepare source");
                false
            }
        };

        if primed {
            self.initialized = true;
            self.state = SessionState::Ready;
            info!(session = %self.id(), uri = %uri, "source prepared");
        }
        self.notifier.emit(Notification::Prepared(primed));

        if primed && self.start_deferred {
            debug!(session = %self.id(), "applying deferred start");
            self.resume();
        }
    }

    /// Set a local file as source.
    pub fn set_source_path(&mut self, path: &std::path::Path) {
        let uri = locator::from_path(path);
        self.set_source(&uri);
    }

    fn prime(&mut self, uri: &str) -> Result<(), SessionError> {
        let timeout = self.state_timeout;
        let graph = self.graph.as_mut().ok_or(SessionError::Disposed)?;
        graph.set_uri(uri)?;
        transition(graph.as_mut(), GraphState::Ready, timeout)?;
        transition(graph.as_mut(), GraphState::Paused, timeout)?;
        Ok(())
    }

    /// Flush the graph back to idle and forget the previous source.
    fn teardown(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_flushing(true);
            if let Err(e) = graph.set_state(GraphState::Null) {
                warn!(session = %self.notifier.session_id(), error = %e, "failed to reset pipeline");
            }
            graph.set_flushing(false);
        }
        self.link.reset();
        self.source = None;
        self.initialized = false;
        self.playing = false;
        self.duration_pending = false;
        self.state = SessionState::Uninitialized;
    }

    // ── Transport ────────────────────────────────────────────────────

    /// Start from the beginning.
    pub fn play(&mut self) {
        self.seek(0);
        self.resume();
    }

    /// Continue from the current position. Before the source is prepared this
    /// only records the request.
    pub fn resume(&mut self) {
        if self.graph.is_none() {
            debug!(session = %self.id(), "resume on a disposed session");
            return;
        }
        self.playing = true;

        if !self.initialized {
            self.start_deferred = true;
            debug!(session = %self.id(), "source not prepared yet, deferring start");
            return;
        }
        self.start_deferred = false;

        if let Err(e) = self.change_state(GraphState::Playing) {
            warn!(session = %self.id(), error = %e, "unable to start playback");
            self.playing = false;
            return;
        }
        self.state = SessionState::Playing;
        self.announce_duration();
    }

    pub fn pause(&mut self) {
        self.pause_graph();
    }

    fn pause_graph(&mut self) -> bool {
        self.playing = false;
        self.start_deferred = false;
        if !self.initialized {
            return false;
        }
        if let Err(e) = self.change_state(GraphState::Paused) {
            warn!(session = %self.id(), error = %e, "failed to pause");
            return false;
        }
        if self.state == SessionState::Playing || self.state == SessionState::Ready {
            self.state = SessionState::Paused;
        }
        true
    }

    /// Pause and rewind to zero.
    pub fn stop(&mut self) {
        let paused = self.pause_graph();
        if !self.initialized {
            return;
        }
        self.seek(0);
        if paused {
            self.state = SessionState::Stopped;
        }
    }

    /// Seek to `position_ms`. Emits `SeekCompleted` when the graph accepts it.
    pub fn seek(&mut self, position_ms: u64) {
        if !self.initialized {
            debug!(session = %self.id(), position_ms, "seek before source is prepared");
            return;
        }
        if position_ms > MAX_SEEK_MS {
            warn!(session = %self.id(), position_ms, "seek position out of range");
            return;
        }
        let request = SeekRequest::key_unit(self.rate, Duration::from_millis(position_ms));
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        if let Err(e) = graph.seek(request) {
            warn!(session = %self.notifier.session_id(), position_ms, error = %e, "failed to seek");
            return;
        }
        self.link.clear_end_of_stream();
        self.notifier.emit(Notification::SeekCompleted);
    }

    /// Change the playback rate, keeping the current position.
    pub fn set_rate(&mut self, rate: f64) {
        if !(rate > 0.0 && rate.is_finite()) {
            warn!(session = %self.id(), rate, "playback rate is not supported");
            return;
        }
        if !self.initialized {
            // Applied by the next seek.
            self.rate = rate;
            return;
        }
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let position = graph.query_position().unwrap_or_default();
        if let Err(e) = graph.seek(SeekRequest::accurate(rate, position)) {
            warn!(session = %self.notifier.session_id(), rate, error = %e, "failed to set playback rate");
            return;
        }
        self.rate = rate;
    }

    /// Set volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f64) {
        let Some(volume) = clamp_volume(volume) else {
            warn!(session = %self.id(), "volume is not a number");
            return;
        };
        self.volume = volume;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_volume(volume);
        }
    }

    /// Set stereo balance, clamped to [-1, 1].
    pub fn set_balance(&mut self, balance: f64) {
        if balance.is_nan() {
            warn!(session = %self.id(), "balance is not a number");
            return;
        }
        let balance = balance.clamp(-1.0, 1.0);
        self.balance = balance;
        if let Some(graph) = self.graph.as_mut() {
            if let Err(e) = graph.set_balance(balance) {
                warn!(session = %self.notifier.session_id(), error = %e, "balance not applied");
            }
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_release_mode(&mut self, mode: ReleaseMode) {
        self.set_looping(mode.is_looping());
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Duration in milliseconds, or [`UNKNOWN_TIME`].
    pub fn query_duration(&self) -> i64 {
        if !self.initialized {
            return UNKNOWN_TIME;
        }
        self.graph
            .as_ref()
            .and_then(|graph| graph.query_duration())
            .map(duration_to_ms)
            .unwrap_or(UNKNOWN_TIME)
    }

    /// Position in milliseconds, or [`UNKNOWN_TIME`].
    ///
    /// This is where a pending end of stream is turned into `PlaybackCompleted`
    /// (or a restart when looping); the position then reads 0.
    pub fn query_position(&mut self) -> i64 {
        if self.graph.is_none() {
            return UNKNOWN_TIME;
        }
        if self.link.take_end_of_stream() && self.initialized {
            self.complete_playback();
            return 0;
        }
        if !self.initialized {
            return UNKNOWN_TIME;
        }
        self.announce_pending_duration();
        self.graph
            .as_ref()
            .and_then(|graph| graph.query_position())
            .map(duration_to_ms)
            .unwrap_or(UNKNOWN_TIME)
    }

    fn complete_playback(&mut self) {
        if self.looping {
            debug!(session = %self.id(), "end of stream, looping");
            self.play();
        } else {
            info!(session = %self.id(), "playback completed");
            self.notifier.emit(Notification::PlaybackCompleted);
            self.stop();
        }
    }

    /// Most recent decoded frame, `None` before the first one.
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.link.latest_frame()
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.latest_frame().map(|frame| frame.size())
    }

    // ── Event pump ───────────────────────────────────────────────────

    /// Drain everything the graph reported since the last call and emit the
    /// resulting notifications. Call periodically from the control thread.
    pub fn poll(&mut self) {
        for message in self.link.drain() {
            self.handle_bus_message(message);
        }
        if self.link.take_frame_pending() {
            self.notifier.emit(Notification::FrameDecoded);
        }
        if self.link.end_of_stream_pending() {
            self.query_position();
        }
        self.announce_pending_duration();
    }

    fn handle_bus_message(&mut self, message: BusMessage) {
        match message {
            BusMessage::StateChanged { old, new } => {
                debug!(session = %self.id(), ?old, ?new, "graph state changed");
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
            BusMessage::Error {
                source,
                message,
                debug: details,
            } => {
                error!(session = %self.id(), %source, details = ?details, "{message}");
                self.notifier.emit(Notification::Error(message));
            }
            BusMessage::CaptureDone { path } => {
                debug!(session = %self.id(), path = %path.display(), "unexpected capture message");
            }
            BusMessage::EndOfStream => {
                // Posted as a flag by the callback handle.
            }
        }
    }

    fn announce_duration(&mut self) {
        match self.graph.as_ref().and_then(|graph| graph.query_duration()) {
            Some(duration) => {
                self.duration_pending = false;
                self.notifier
                    .emit(Notification::DurationKnown(duration.as_millis() as u64));
            }
            None => self.duration_pending = true,
        }
    }

    fn announce_pending_duration(&mut self) {
        if self.duration_pending && self.initialized {
            self.announce_duration();
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Return the graph to idle and forget the source. The session stays usable.
    pub fn release(&mut self) {
        if self.graph.is_none() {
            debug!(session = %self.id(), "release on a disposed session");
            return;
        }
        self.start_deferred = false;
        let idle = self
            .graph
            .as_ref()
            .map(|graph| graph.current_state() == GraphState::Null)
            .unwrap_or(true);
        if idle {
            self.link.reset();
            self.source = None;
            self.initialized = false;
            self.playing = false;
            self.duration_pending = false;
            self.state = SessionState::Uninitialized;
        } else {
            self.teardown();
        }
        info!(session = %self.id(), "media session released");
    }

    /// Release every native resource. Safe to call more than once.
    pub fn dispose(&mut self) {
        let Some(mut graph) = self.graph.take() else {
            warn!(session = %self.id(), "already disposed");
            return;
        };
        self.playing = false;
        self.initialized = false;
        self.start_deferred = false;
        self.duration_pending = false;
        self.source = None;
        self.link.deactivate();
        graph.set_flushing(true);
        graph.shutdown();
        drop(graph);
        self.state = SessionState::Disposed;
        info!(session = %self.id(), "media session disposed");
    }

    fn change_state(&mut self, target: GraphState) -> Result<(), SessionError> {
        let timeout = self.state_timeout;
        let graph = self.graph.as_mut().ok_or(SessionError::Disposed)?;
        transition(graph.as_mut(), target, timeout)?;
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        self.notifier.session_id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `false` once the session has been disposed.
    pub fn is_valid(&self) -> bool {
        self.graph.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        if self.graph.is_some() {
            self.stop();
            self.dispose();
        }
    }
}

fn clamp_volume(volume: f64) -> Option<f64> {
    if volume.is_nan() {
        None
    } else {
        Some(volume.clamp(0.0, 1.0))
    }
}

fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
