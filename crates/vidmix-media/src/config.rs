//! Playback configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vidmix_core::memory_budget::{memory_usage_maximum, DEFAULT_MEMORY_USAGE_POLICY};
use vidmix_core::{Result, VidmixError};

/// Settings a player is created with. All fields can be changed at runtime
/// through the matching `VideoFile` setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Share of the queue memory budget to use, in percent (0-100)
    pub memory_usage_policy: u32,
    /// Resume from the stop position instead of mark-in
    pub restart_where_stopped: bool,
    /// Show black instead of the first frame while stopped
    pub revert_to_black_when_stopped: bool,
    /// Loop between the marks when a file is opened
    pub loop_by_default: bool,
    /// Bound on each phase of stopping the decoding thread
    pub stop_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            memory_usage_policy: DEFAULT_MEMORY_USAGE_POLICY,
            restart_where_stopped: true,
            revert_to_black_when_stopped: false,
            loop_by_default: true,
            stop_timeout_ms: 500,
        }
    }
}

impl PlaybackConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| VidmixError::Serialization(e.to_string()))?;
        config.memory_usage_policy = config.memory_usage_policy.min(100);
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VidmixError::Serialization(e.to_string()))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms.max(1))
    }

    /// Queue memory budget in bytes for the current policy.
    pub fn queue_budget_bytes(&self) -> usize {
        memory_usage_maximum(self.memory_usage_policy)
    }
}
