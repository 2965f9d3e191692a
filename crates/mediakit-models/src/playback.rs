use serde::{Deserialize, Serialize};

/// What a player does when its source reaches the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ReleaseMode {
    #[default]
    Release,
    Loop,
    Stop,
}

impl ReleaseMode {
    /// Parse a release mode string. Channel values are often fully qualified
    /// (`ReleaseMode.loop`), so anything mentioning `loop` selects looping.
    pub fn parse_lossy(s: &str) -> Self {
        if s.contains("loop") {
            ReleaseMode::Loop
        } else if s.contains("stop") {
            ReleaseMode::Stop
        } else {
            ReleaseMode::Release
        }
    }

    pub fn is_looping(self) -> bool {
        self == ReleaseMode::Loop
    }
}

impl From<String> for ReleaseMode {
    fn from(s: String) -> Self {
        Self::parse_lossy(&s)
    }
}
