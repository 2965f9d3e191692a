use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Exposure control of a capture device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum ExposureMode {
    #[default]
    Auto,
    Locked,
}

impl ExposureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExposureMode::Auto => "auto",
            ExposureMode::Locked => "locked",
        }
    }

    /// Parse a channel string, falling back to `Auto` for unknown values.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "auto" => ExposureMode::Auto,
            "locked" => ExposureMode::Locked,
            other => {
                warn!(value = other, "not a valid exposure mode, using auto");
                ExposureMode::Auto
            }
        }
    }
}

impl From<String> for ExposureMode {
    fn from(s: String) -> Self {
        Self::parse_lossy(&s)
    }
}

/// Focus control of a capture device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum FocusMode {
    #[default]
    Auto,
    Locked,
}

impl FocusMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FocusMode::Auto => "auto",
            FocusMode::Locked => "locked",
        }
    }

    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "auto" => FocusMode::Auto,
            "locked" => FocusMode::Locked,
            other => {
                warn!(value = other, "not a valid focus mode, using auto");
                FocusMode::Auto
            }
        }
    }
}

impl From<String> for FocusMode {
    fn from(s: String) -> Self {
        Self::parse_lossy(&s)
    }
}

/// Physical orientation used to lock capture output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum DeviceOrientation {
    PortraitUp,
    #[default]
    LandscapeLeft,
    PortraitDown,
    LandscapeRight,
}

impl DeviceOrientation {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceOrientation::PortraitUp => "portraitUp",
            DeviceOrientation::LandscapeLeft => "landscapeLeft",
            DeviceOrientation::PortraitDown => "portraitDown",
            DeviceOrientation::LandscapeRight => "landscapeRight",
        }
    }

    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "portraitUp" => DeviceOrientation::PortraitUp,
            "landscapeLeft" => DeviceOrientation::LandscapeLeft,
            "portraitDown" => DeviceOrientation::PortraitDown,
            "landscapeRight" => DeviceOrientation::LandscapeRight,
            other => {
                warn!(value = other, "not a valid device orientation, using landscapeLeft");
                DeviceOrientation::LandscapeLeft
            }
        }
    }

    /// Rotation in degrees relative to the sensor's natural orientation.
    pub fn degrees(self) -> u32 {
        match self {
            DeviceOrientation::PortraitUp => 0,
            DeviceOrientation::LandscapeLeft => 90,
            DeviceOrientation::PortraitDown => 180,
            DeviceOrientation::LandscapeRight => 270,
        }
    }
}

impl From<String> for DeviceOrientation {
    fn from(s: String) -> Self {
        Self::parse_lossy(&s)
    }
}

impl fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FocusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DeviceOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensDirection {
    Front,
    #[default]
    Back,
    External,
}

/// A capture device as reported to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescription {
    pub name: String,
    pub sensor_orientation: u32,
    pub lens_facing: LensDirection,
}

impl CameraDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sensor_orientation: 0,
            lens_facing: LensDirection::Back,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_strings_fall_back_to_defaults() {
        assert_eq!(ExposureMode::parse_lossy("bogus"), ExposureMode::Auto);
        assert_eq!(FocusMode::parse_lossy(""), FocusMode::Auto);
        assert_eq!(
            DeviceOrientation::parse_lossy("sideways"),
            DeviceOrientation::LandscapeLeft
        );
    }

    #[test]
    fn serde_uses_channel_strings() {
        let json = serde_json::to_string(&DeviceOrientation::PortraitDown).unwrap();
        assert_eq!(json, "\"portraitDown\"");

        let mode: FocusMode = serde_json::from_str("\"locked\"").unwrap();
        assert_eq!(mode, FocusMode::Locked);

        let mode: ExposureMode = serde_json::from_str("\"manual\"").unwrap();
        assert_eq!(mode, ExposureMode::Auto);
    }

    #[test]
    fn camera_description_is_camel_case() {
        let value = serde_json::to_value(CameraDescription::new("camera0")).unwrap();
        assert_eq!(value["name"], "camera0");
        assert_eq!(value["sensorOrientation"], 0);
        assert_eq!(value["lensFacing"], "back");
    }
}
