use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-session settings shared by players and cameras.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound for waiting on an asynchronous graph state change.
    pub state_change_timeout_ms: u64,
    /// Volume applied when the session is created.
    pub initial_volume: f64,
    /// Restart from the beginning at end of stream instead of completing.
    pub looping: bool,
    /// Keep TLS certificate checks on network sources. Disabled by default to
    /// accept misconfigured servers.
    pub ssl_strict: bool,
    /// Attach a video sink to players so frames become available.
    pub decode_video: bool,
    /// Capture device path, e.g. `/dev/video0`. `None` uses the default source.
    pub camera_device: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_change_timeout_ms: default_state_change_timeout_ms(),
            initial_volume: 1.0,
            looping: false,
            ssl_strict: false,
            decode_video: true,
            camera_device: None,
        }
    }
}

impl SessionConfig {
    pub fn state_change_timeout(&self) -> Duration {
        Duration::from_millis(self.state_change_timeout_ms)
    }
}

fn default_state_change_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: SessionConfig = toml::from_str("looping = true").unwrap();
        assert!(config.looping);
        assert_eq!(config.state_change_timeout(), Duration::from_secs(5));
        assert_eq!(config.initial_volume, 1.0);
        assert!(config.decode_video);
        assert!(config.camera_device.is_none());
    }
}
