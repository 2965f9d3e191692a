use std::path::Path;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info};

use super::{make_element, negotiated_size, rgba_caps, sample_to_frame, Pipeline};
use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::graph::{CaptureGraph, GraphCallbacks, GraphState, MediaGraph, SeekRequest, StateChange};

/// `camerabin` with an RGBA viewfinder.
pub struct GstCamera {
    pipeline: Pipeline,
    viewfinder: gst::Element,
}

impl GstCamera {
    pub fn new(config: &SessionConfig, callbacks: GraphCallbacks) -> Result<Self, GraphError> {
        let camerabin = make_element("camerabin")?;

        if let Some(device) = &config.camera_device {
            let source = make_element("v4l2src")?;
            source.set_property("device", device);
            let wrapper = make_element("wrappercamerabinsrc")?;
            wrapper.set_property("video-source", &source);
            camerabin.set_property("camera-source", &wrapper);
            info!(%device, "using capture device");
        }

        let (bin, viewfinder) = viewfinder_bin(callbacks.clone())?;
        camerabin.set_property("viewfinder-sink", &bin);

        let pipeline = Pipeline::new(camerabin, callbacks)?;
        Ok(Self {
            pipeline,
            viewfinder,
        })
    }

    fn camerabin(&self) -> &gst::Element {
        self.pipeline.element()
    }

    fn start_capture(&self, mode: &str, path: &Path) -> Result<(), GraphError> {
        if self.pipeline.current_state() < GraphState::Paused {
            return Err(GraphError::Capture("camera is not running".into()));
        }
        let ready: bool = self.camerabin().property("idle");
        if !ready {
            return Err(GraphError::Capture("camera is busy".into()));
        }
        let location = path
            .to_str()
            .ok_or_else(|| GraphError::Capture(format!("path is not UTF-8: {}", path.display())))?;
        self.camerabin().set_property_from_str("mode", mode);
        self.camerabin().set_property("location", location);
        self.camerabin().emit_by_name::<()>("start-capture", &[]);
        debug!(mode, location, "capture started");
        Ok(())
    }
}

/// `videoconvert ! appsink` wrapped in a bin with a ghost sink pad.
fn viewfinder_bin(callbacks: GraphCallbacks) -> Result<(gst::Bin, gst::Element), GraphError> {
    let convert = make_element("videoconvert")?;
    let appsink = gst_app::AppSink::builder()
        .caps(&rgba_caps())
        .max_buffers(1)
        .drop(true)
        .build();
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                if callbacks.is_active() {
                    match sample_to_frame(&sample) {
                        Ok(frame) => callbacks.frame_decoded(frame),
                        Err(e) => debug!(error = %e, "dropping viewfinder sample"),
                    }
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
    let appsink: gst::Element = appsink.upcast();

    let bin = gst::Bin::builder().name("viewfinder").build();
    bin.add_many([&convert, &appsink])
        .map_err(|e| GraphError::Link(e.to_string()))?;
    convert
        .link(&appsink)
        .map_err(|e| GraphError::Link(e.to_string()))?;
    let pad = convert
        .static_pad("sink")
        .ok_or_else(|| GraphError::Link("videoconvert has no sink pad".into()))?;
    let ghost = gst::GhostPad::with_target(&pad).map_err(|e| GraphError::Link(e.to_string()))?;
    bin.add_pad(&ghost)
        .map_err(|e| GraphError::Link(e.to_string()))?;
    Ok((bin, appsink))
}

impl MediaGraph for GstCamera {
    fn set_state(&mut self, state: GraphState) -> Result<StateChange, GraphError> {
        self.pipeline.set_state(state)
    }

    fn wait_for_state(&mut self, timeout: Duration) -> Result<GraphState, GraphError> {
        self.pipeline.wait_for_state(timeout)
    }

    fn current_state(&self) -> GraphState {
        self.pipeline.current_state()
    }

    fn set_uri(&mut self, _uri: &str) -> Result<(), GraphError> {
        Err(GraphError::Unsupported("camera source locator"))
    }

    fn seek(&mut self, _request: SeekRequest) -> Result<(), GraphError> {
        Err(GraphError::Unsupported("seeking a live camera"))
    }

    fn query_duration(&self) -> Option<Duration> {
        None
    }

    fn query_position(&self) -> Option<Duration> {
        self.pipeline.query_position()
    }

    fn set_volume(&mut self, volume: f64) {
        if self.camerabin().find_property("volume").is_some() {
            self.camerabin().set_property("volume", volume);
        }
    }

    fn set_balance(&mut self, _balance: f64) -> Result<(), GraphError> {
        Err(GraphError::Unsupported("balance"))
    }

    fn set_flushing(&mut self, flushing: bool) {
        self.pipeline.set_flushing(flushing);
    }

    fn shutdown(&mut self) {
        self.pipeline.shutdown();
    }
}

impl CaptureGraph for GstCamera {
    fn max_zoom(&self) -> f32 {
        self.camerabin().property("max-zoom")
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<(), GraphError> {
        self.camerabin().set_property("zoom", zoom);
        Ok(())
    }

    fn preview_size(&self) -> Option<(u32, u32)> {
        negotiated_size(&self.viewfinder)
    }

    fn start_image_capture(&mut self, path: &Path) -> Result<(), GraphError> {
        self.start_capture("mode-image", path)
    }

    fn start_video_capture(&mut self, path: &Path) -> Result<(), GraphError> {
        self.start_capture("mode-video", path)
    }

    fn stop_video_capture(&mut self) -> Result<(), GraphError> {
        self.camerabin().emit_by_name::<()>("stop-capture", &[]);
        Ok(())
    }
}
