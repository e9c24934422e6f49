use std::{collections::HashSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{OverlapPolicy, Result, TapCueError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tap lanes in display and export order.
    pub lanes: Vec<String>,
    pub playback: PlaybackConfig,
    pub calibration: CalibrationConfig,
    pub taps: TapConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lanes: vec!["J".to_string(), "K".to_string(), "L".to_string()],
            playback: PlaybackConfig::default(),
            calibration: CalibrationConfig::default(),
            taps: TapConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads a TOML config file, falling back to defaults when no path is
    /// given. Missing keys take their default values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        tracing::debug!(?path, lanes = ?config.lanes, "configuration loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lanes.is_empty() {
            return Err(TapCueError::Config("at least one lane is required".into()));
        }

        let mut seen = HashSet::new();
        for lane in &self.lanes {
            if !is_valid_lane_name(lane) {
                return Err(TapCueError::Config(format!(
                    "lane name `{lane}` must be ASCII alphanumerics, `_` or `-`"
                )));
            }
            if !seen.insert(lane.as_str()) {
                return Err(TapCueError::Config(format!("duplicate lane `{lane}`")));
            }
        }

        self.playback.validate()
    }
}

/// Lane names end up as bare CSV cells and cue name prefixes.
pub fn is_valid_lane_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Configuration specific to the playback clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How often the host should call [`crate::PlaybackClock::poll`].
    pub poll_interval_ms: u64,
    /// Fraction of the duration past which an idle engine counts as finished.
    pub end_margin: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            end_margin: 0.98,
        }
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if !(10..=100).contains(&self.poll_interval_ms) {
            return Err(TapCueError::Config(format!(
                "poll_interval_ms must be within 10..=100, got {}",
                self.poll_interval_ms
            )));
        }
        if !(self.end_margin > 0.0 && self.end_margin <= 1.0) {
            return Err(TapCueError::Config(format!(
                "end_margin must be within (0, 1], got {}",
                self.end_margin
            )));
        }
        Ok(())
    }
}

/// Default beat grid offered to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub bpm: f64,
    pub offset_ms: i64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            bpm: 90.0,
            offset_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub overlap: OverlapPolicy,
}
