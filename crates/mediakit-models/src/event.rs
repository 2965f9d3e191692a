use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

// Event names as seen by channel adapters
pub const EVENT_PREPARED: &str = "audio.onPrepared";
pub const EVENT_DURATION: &str = "audio.onDuration";
pub const EVENT_SEEK_COMPLETE: &str = "audio.onSeekComplete";
pub const EVENT_COMPLETE: &str = "audio.onComplete";
pub const EVENT_LOG: &str = "audio.onLog";
pub const EVENT_ERROR: &str = "audio.onError";
pub const EVENT_FRAME: &str = "video.onFrame";
pub const EVENT_CAPTURED: &str = "camera.onCaptured";

/// High-level notification produced by a session.
///
/// Every variant is delivered on the control thread; none of them is ever
/// raised from inside a graph callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The source was applied. `false` when priming the graph failed.
    Prepared(bool),
    /// Duration of the current source in milliseconds.
    DurationKnown(u64),
    SeekCompleted,
    PlaybackCompleted,
    /// A new frame replaced the session's latest frame.
    FrameDecoded,
    /// An asynchronous capture finished. An empty path means it failed.
    CaptureCompleted(String),
    Log(String),
    /// A fatal or mid-stream error reported by the graph.
    Error(String),
}

impl Notification {
    /// Stable event name used by channel adapters.
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::Prepared(_) => EVENT_PREPARED,
            Notification::DurationKnown(_) => EVENT_DURATION,
            Notification::SeekCompleted => EVENT_SEEK_COMPLETE,
            Notification::PlaybackCompleted => EVENT_COMPLETE,
            Notification::FrameDecoded => EVENT_FRAME,
            Notification::CaptureCompleted(_) => EVENT_CAPTURED,
            Notification::Log(_) => EVENT_LOG,
            Notification::Error(_) => EVENT_ERROR,
        }
    }

    /// Whether a failed capture is being reported.
    pub fn is_capture_failure(&self) -> bool {
        matches!(self, Notification::CaptureCompleted(path) if path.is_empty())
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let has_value = !matches!(
            self,
            Notification::SeekCompleted
                | Notification::PlaybackCompleted
                | Notification::FrameDecoded
        );
        let mut map = serializer.serialize_map(Some(if has_value { 2 } else { 1 }))?;
        map.serialize_entry("event", self.event_name())?;
        match self {
            Notification::Prepared(ok) => map.serialize_entry("value", ok)?,
            Notification::DurationKnown(ms) => map.serialize_entry("value", ms)?,
            Notification::CaptureCompleted(path) => map.serialize_entry("value", path)?,
            Notification::Log(message) | Notification::Error(message) => {
                map.serialize_entry("value", message)?
            }
            Notification::SeekCompleted
            | Notification::PlaybackCompleted
            | Notification::FrameDecoded => {}
        }
        map.end()
    }
}

/// A notification tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub notification: Notification,
}

impl SessionEvent {
    pub fn new(session_id: impl Into<String>, notification: Notification) -> Self {
        Self {
            session_id: session_id.into(),
            notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_with_payload_carry_value() {
        let value = serde_json::to_value(Notification::DurationKnown(4200)).unwrap();
        assert_eq!(value, json!({ "event": "audio.onDuration", "value": 4200 }));

        let value = serde_json::to_value(Notification::Prepared(true)).unwrap();
        assert_eq!(value, json!({ "event": "audio.onPrepared", "value": true }));
    }

    #[test]
    fn unit_events_omit_value() {
        let value = serde_json::to_value(Notification::PlaybackCompleted).unwrap();
        assert_eq!(value, json!({ "event": "audio.onComplete" }));
    }

    #[test]
    fn session_event_is_flattened() {
        let event = SessionEvent::new("p1", Notification::CaptureCompleted("/tmp/a.jpg".into()));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "session_id": "p1", "event": "camera.onCaptured", "value": "/tmp/a.jpg" })
        );
    }

    #[test]
    fn empty_capture_path_is_failure() {
        assert!(Notification::CaptureCompleted(String::new()).is_capture_failure());
        assert!(!Notification::CaptureCompleted("x.jpg".into()).is_capture_failure());
        assert!(!Notification::SeekCompleted.is_capture_failure());
    }
}
