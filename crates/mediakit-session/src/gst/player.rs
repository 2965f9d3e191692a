use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, warn};

use super::{make_element, rgba_caps, sample_to_frame, Pipeline};
use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::graph::{GraphCallbacks, GraphState, MediaGraph, SeekRequest, StateChange};

/// `playbin` with a balance filter and an RGBA frame sink.
pub struct GstPlayer {
    pipeline: Pipeline,
    /// `None` when `audiopanorama` is not installed.
    panorama: Option<gst::Element>,
}

impl GstPlayer {
    pub fn new(config: &SessionConfig, callbacks: GraphCallbacks) -> Result<Self, GraphError> {
        let playbin = make_element("playbin")?;

        let ssl_strict = config.ssl_strict;
        playbin.connect("source-setup", false, move |values| {
            let source = values.get(1)?.get::<gst::Element>().ok()?;
            if source.find_property("ssl-strict").is_some() {
                source.set_property("ssl-strict", ssl_strict);
            }
            None
        });

        let panorama = match panorama_bin() {
            Ok((bin, panorama)) => {
                playbin.set_property("audio-filter", &bin);
                Some(panorama)
            }
            Err(e) => {
                warn!(error = %e, "balance control unavailable");
                None
            }
        };

        let video_sink = if config.decode_video {
            frame_sink(callbacks.clone())
        } else {
            make_element("fakesink")?
        };
        playbin.set_property("video-sink", &video_sink);

        let pipeline = Pipeline::new(playbin, callbacks)?;
        Ok(Self { pipeline, panorama })
    }
}

/// `audiopanorama method=simple` wrapped in a bin with ghost pads.
fn panorama_bin() -> Result<(gst::Bin, gst::Element), GraphError> {
    let panorama = gst::ElementFactory::make("audiopanorama")
        .property_from_str("method", "simple")
        .build()
        .map_err(|e| GraphError::ElementCreation {
            element: "audiopanorama".into(),
            reason: e.to_string(),
        })?;
    let bin = gst::Bin::builder().name("panorama").build();
    bin.add(&panorama)
        .map_err(|e| GraphError::Link(e.to_string()))?;

    for direction in ["sink", "src"] {
        let pad = panorama
            .static_pad(direction)
            .ok_or_else(|| GraphError::Link(format!("audiopanorama has no {direction} pad")))?;
        let ghost =
            gst::GhostPad::with_target(&pad).map_err(|e| GraphError::Link(e.to_string()))?;
        bin.add_pad(&ghost)
            .map_err(|e| GraphError::Link(e.to_string()))?;
    }
    Ok((bin, panorama))
}

fn frame_sink(callbacks: GraphCallbacks) -> gst::Element {
    let appsink = gst_app::AppSink::builder()
        .caps(&rgba_caps())
        .max_buffers(1)
        .drop(true)
        .build();
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                if !callbacks.is_active() {
                    return Ok(gst::FlowSuccess::Ok);
                }
                match sample_to_frame(&sample) {
                    Ok(frame) => callbacks.frame_decoded(frame),
                    Err(e) => debug!(error = %e, "dropping undecodable sample"),
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
    appsink.upcast()
}

impl MediaGraph for GstPlayer {
    fn set_state(&mut self, state: GraphState) -> Result<StateChange, GraphError> {
        self.pipeline.set_state(state)
    }

    fn wait_for_state(&mut self, timeout: Duration) -> Result<GraphState, GraphError> {
        self.pipeline.wait_for_state(timeout)
    }

    fn current_state(&self) -> GraphState {
        self.pipeline.current_state()
    }

    fn set_uri(&mut self, uri: &str) -> Result<(), GraphError> {
        self.pipeline.element().set_property("uri", uri);
        Ok(())
    }

    fn seek(&mut self, request: SeekRequest) -> Result<(), GraphError> {
        self.pipeline.seek(request)
    }

    fn query_duration(&self) -> Option<Duration> {
        self.pipeline.query_duration()
    }

    fn query_position(&self) -> Option<Duration> {
        self.pipeline.query_position()
    }

    fn set_volume(&mut self, volume: f64) {
        self.pipeline.element().set_property("volume", volume);
    }

    fn set_balance(&mut self, balance: f64) -> Result<(), GraphError> {
        let panorama = self
            .panorama
            .as_ref()
            .ok_or(GraphError::Unsupported("balance"))?;
        panorama.set_property("panorama", balance as f32);
        Ok(())
    }

    fn set_flushing(&mut self, flushing: bool) {
        self.pipeline.set_flushing(flushing);
    }

    fn shutdown(&mut self) {
        self.pipeline.shutdown();
    }
}
