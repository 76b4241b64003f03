use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::audio::Wave;
use crate::error::ConfigError;

/// Playback settings, stored as RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How often the scheduler wakes up.
    pub poll_interval_ms: u64,
    /// How far past "now" each wake-up schedules events.
    pub lookahead_ms: u64,
    /// Silence after the last event before a looping track restarts.
    pub loop_tail_secs: f64,
    pub output_gain: f32,
    pub voice_gain: f32,
    /// Time constant for volume changes.
    pub volume_smoothing_secs: f64,
    /// Scales master × music volume before it reaches the output gain.
    pub music_gain_scale: f32,
    pub wave: Wave,
    /// Output sample rate; the device default when unset.
    pub sample_rate: Option<u32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            lookahead_ms: 200,
            loop_tail_secs: 1.0,
            output_gain: 0.3,
            voice_gain: 0.1,
            volume_smoothing_secs: 0.1,
            music_gain_scale: 0.6,
            wave: Wave::Square,
            sample_rate: None,
        }
    }
}

impl PlayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path)?;
        let config: PlayerConfig = ron::from_str(&ron_string)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }
}
