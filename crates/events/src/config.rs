//! Bus configuration.

use serde::Deserialize;

/// Construction-time settings for a [`HookBus`](crate::HookBus).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name attached to every log line emitted by the bus.
    pub name: String,
    /// Start in the paused state: triggers queue until `start()` is called.
    pub start_paused: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "hookbus".to_string(),
            start_paused: false,
        }
    }
}

impl BusConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }

    /// Parse a config from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
