//! GStreamer backend.
//!
//! Players are built on `playbin` with an `audiopanorama` audio filter and an
//! RGBA `appsink` as video sink. Cameras use `camerabin` with an RGBA
//! viewfinder `appsink`. Bus messages are forwarded from a sync handler to the
//! session's [`GraphCallbacks`], so nothing here depends on a GLib main loop.

mod camera;
mod player;

use std::time::Duration;

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use mediakit_models::CameraDescription;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::frame::VideoFrame;
use crate::graph::{
    BusMessage, CaptureGraph, GraphBackend, GraphCallbacks, GraphState, MediaGraph, SeekRequest,
    StateChange,
};

pub use camera::GstCamera;
pub use player::GstPlayer;

/// Factory for GStreamer graphs.
#[derive(Debug, Default)]
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Self {
        Self
    }
}

impl GraphBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn init(&self) -> Result<(), GraphError> {
        gst::init().map_err(|e| GraphError::BackendInit(e.to_string()))?;
        info!(version = %gst::version_string(), "gstreamer initialised");
        Ok(())
    }

    fn deinit(&self) {
        // SAFETY: called once per process by `MediaLibrary`, after every
        // session built from this backend has been dropped.
        unsafe { gst::deinit() };
    }

    fn build_player(
        &self,
        config: &SessionConfig,
        callbacks: GraphCallbacks,
    ) -> Result<Box<dyn MediaGraph>, GraphError> {
        Ok(Box::new(GstPlayer::new(config, callbacks)?))
    }

    fn build_camera(
        &self,
        config: &SessionConfig,
        callbacks: GraphCallbacks,
    ) -> Result<Box<dyn CaptureGraph>, GraphError> {
        Ok(Box::new(GstCamera::new(config, callbacks)?))
    }

    fn available_cameras(&self) -> Vec<CameraDescription> {
        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some("Video/Source"), None);
        if let Err(e) = monitor.start() {
            warn!(error = %e, "device monitor unavailable");
            return vec![CameraDescription::new("camera0")];
        }
        let cameras: Vec<_> = monitor
            .devices()
            .iter()
            .map(|device| CameraDescription::new(device.display_name().as_str()))
            .collect();
        monitor.stop();
        if cameras.is_empty() {
            vec![CameraDescription::new("camera0")]
        } else {
            cameras
        }
    }
}

// ── Shared pipeline plumbing ─────────────────────────────────────────

pub(crate) fn make_element(factory: &str) -> Result<gst::Element, GraphError> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| GraphError::ElementCreation {
            element: factory.to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn to_gst_state(state: GraphState) -> gst::State {
    match state {
        GraphState::Null => gst::State::Null,
        GraphState::Ready => gst::State::Ready,
        GraphState::Paused => gst::State::Paused,
        GraphState::Playing => gst::State::Playing,
    }
}

pub(crate) fn from_gst_state(state: gst::State) -> GraphState {
    match state {
        gst::State::Ready => GraphState::Ready,
        gst::State::Paused => GraphState::Paused,
        gst::State::Playing => GraphState::Playing,
        _ => GraphState::Null,
    }
}

/// Top-level element plus its bus. Returns the element to `Null` on drop.
pub(crate) struct Pipeline {
    element: gst::Element,
    bus: gst::Bus,
    shut_down: bool,
}

impl Pipeline {
    /// Take ownership of `element` and route its bus to `callbacks`.
    pub(crate) fn new(element: gst::Element, callbacks: GraphCallbacks) -> Result<Self, GraphError> {
        let bus = element
            .bus()
            .ok_or_else(|| GraphError::BackendInit("pipeline has no bus".into()))?;
        let pipeline_name = element.name().to_string();
        bus.set_sync_handler(move |_bus, message| {
            if let Some(message) = translate(&pipeline_name, message) {
                callbacks.post(message);
            }
            gst::BusSyncReply::Drop
        });
        Ok(Self {
            element,
            bus,
            shut_down: false,
        })
    }

    pub(crate) fn element(&self) -> &gst::Element {
        &self.element
    }

    pub(crate) fn set_state(&self, state: GraphState) -> Result<StateChange, GraphError> {
        match self.element.set_state(to_gst_state(state)) {
            Ok(gst::StateChangeSuccess::Success) => Ok(StateChange::Success),
            Ok(gst::StateChangeSuccess::Async) => Ok(StateChange::Async),
            Ok(gst::StateChangeSuccess::NoPreroll) => Ok(StateChange::NoPreroll),
            Err(_) => Err(GraphError::StateChange(state)),
        }
    }

    pub(crate) fn wait_for_state(&self, timeout: Duration) -> Result<GraphState, GraphError> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let (result, current, pending) = self.element.state(gst::ClockTime::from_nseconds(nanos));
        match result {
            Ok(gst::StateChangeSuccess::Async) => {
                debug!(?current, ?pending, "state change still pending");
                Err(GraphError::StateChangeTimeout(timeout))
            }
            Ok(_) => Ok(from_gst_state(current)),
            Err(_) => Err(GraphError::StateChange(from_gst_state(pending))),
        }
    }

    pub(crate) fn current_state(&self) -> GraphState {
        from_gst_state(self.element.current_state())
    }

    pub(crate) fn seek(&self, request: SeekRequest) -> Result<(), GraphError> {
        let flags = if request.key_unit {
            gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT
        } else {
            gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE
        };
        let nanos = u64::try_from(request.position.as_nanos()).unwrap_or(u64::MAX);
        self.element
            .seek(
                request.rate,
                flags,
                gst::SeekType::Set,
                gst::ClockTime::from_nseconds(nanos),
                gst::SeekType::End,
                gst::ClockTime::ZERO,
            )
            .map_err(|e| GraphError::Seek(e.to_string()))
    }

    pub(crate) fn query_duration(&self) -> Option<Duration> {
        self.element
            .query_duration::<gst::ClockTime>()
            .map(|t| Duration::from_nanos(t.nseconds()))
    }

    pub(crate) fn query_position(&self) -> Option<Duration> {
        self.element
            .query_position::<gst::ClockTime>()
            .map(|t| Duration::from_nanos(t.nseconds()))
    }

    pub(crate) fn set_flushing(&self, flushing: bool) {
        self.bus.set_flushing(flushing);
    }

    /// Stop the pipeline and detach the bus handler. Runs at most once.
    pub(crate) fn shutdown(&mut self) {
        if std::mem::replace(&mut self.shut_down, true) {
            return;
        }
        if self.element.set_state(gst::State::Null).is_err() {
            warn!(pipeline = %self.element.name(), "failed to stop pipeline");
        }
        self.bus.unset_sync_handler();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn translate(pipeline_name: &str, message: &gst::Message) -> Option<BusMessage> {
    let source = message
        .src()
        .map(|src| src.path_string().to_string())
        .unwrap_or_default();
    match message.view() {
        gst::MessageView::Eos(_) => Some(BusMessage::EndOfStream),
        gst::MessageView::Error(err) => Some(BusMessage::Error {
            source,
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        }),
        gst::MessageView::Warning(w) => Some(BusMessage::Warning {
            source,
            message: w.error().to_string(),
            debug: w.debug().map(|d| d.to_string()),
        }),
        gst::MessageView::StateChanged(change) => {
            let from_pipeline = message
                .src()
                .is_some_and(|src| src.name().as_str() == pipeline_name);
            from_pipeline.then(|| BusMessage::StateChanged {
                old: from_gst_state(change.old()),
                new: from_gst_state(change.current()),
            })
        }
        gst::MessageView::Element(element) => {
            let structure = element.structure()?;
            if !matches!(structure.name().as_str(), "image-done" | "video-done") {
                return None;
            }
            let filename = structure.get::<String>("filename").ok()?;
            Some(BusMessage::CaptureDone {
                path: filename.into(),
            })
        }
        _ => None,
    }
}

/// RGBA caps accepted by every appsink built here.
pub(crate) fn rgba_caps() -> gst::Caps {
    gst_video::VideoCapsBuilder::new()
        .format(gst_video::VideoFormat::Rgba)
        .build()
}

/// Copy an RGBA sample into an owned frame.
pub(crate) fn sample_to_frame(sample: &gst::Sample) -> Result<VideoFrame, GraphError> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| GraphError::Capture("sample has no buffer".into()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| GraphError::Capture("sample has no caps".into()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| GraphError::Capture(format!("invalid video caps: {e}")))?;
    let map = buffer
        .map_readable()
        .map_err(|e| GraphError::Capture(e.to_string()))?;
    let stride = info.stride().first().copied().unwrap_or(0).max(0) as u32;
    let pts = buffer.pts().map(|t| Duration::from_nanos(t.nseconds()));
    VideoFrame::rgba(
        info.width(),
        info.height(),
        stride,
        Bytes::copy_from_slice(map.as_slice()),
    )
    .map(|frame| frame.with_pts(pts))
}

/// Negotiated size on an appsink's sink pad.
pub(crate) fn negotiated_size(sink: &gst::Element) -> Option<(u32, u32)> {
    let caps = sink.static_pad("sink")?.current_caps()?;
    let info = gst_video::VideoInfo::from_caps(&caps).ok()?;
    Some((info.width(), info.height()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_shutdown_runs_once() {
        gst::init().unwrap();
        let (callbacks, _link) = GraphCallbacks::channel();
        let element: gst::Element = gst::Pipeline::new().upcast();
        let mut pipeline = Pipeline::new(element.clone(), callbacks).unwrap();
        element.set_state(gst::State::Ready).unwrap();

        pipeline.shutdown();
        assert!(pipeline.shut_down);
        assert_eq!(element.current_state(), gst::State::Null);

        element.set_state(gst::State::Ready).unwrap();
        pipeline.shutdown();
        drop(pipeline);
        assert_eq!(element.current_state(), gst::State::Ready);
        element.set_state(gst::State::Null).unwrap();
    }
}
