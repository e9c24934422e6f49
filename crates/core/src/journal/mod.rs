use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TapCueError};

pub const EVENT_LOG_VERSION: &str = "1.0";

/// A single tap on the event log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggedEvent {
    /// Seconds from the start of the music.
    pub timestamp: f64,
    /// Seconds since the Unix epoch at the moment of the tap.
    pub absolute_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventLogMetadata {
    pub export_time: DateTime<Utc>,
    pub total_events: usize,
    pub version: String,
}

/// Serialised form of an event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventLogDocument {
    pub metadata: EventLogMetadata,
    pub events: Vec<LoggedEvent>,
}

impl EventLogDocument {
    /// Parses a document. Unknown or missing fields, a foreign version or a
    /// count that disagrees with the events reject the whole document.
    pub fn from_json(text: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(text)?;
        if document.metadata.version != EVENT_LOG_VERSION {
            return Err(TapCueError::msg(format!(
                "unsupported event log version `{}`",
                document.metadata.version
            )));
        }
        if document.metadata.total_events != document.events.len() {
            return Err(TapCueError::msg(format!(
                "event log declares {} events but contains {}",
                document.metadata.total_events,
                document.events.len()
            )));
        }
        Ok(document)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Flat list of tap moments, the alternate capture path to lane intervals.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Vec<LoggedEvent>,
    recording: bool,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Logs a tap at `music_offset` seconds. Taps outside a recording are
    /// dropped and `false` is returned.
    pub fn record(&mut self, music_offset: f64) -> bool {
        self.record_at(music_offset, Utc::now())
    }

    pub fn record_at(&mut self, music_offset: f64, at: DateTime<Utc>) -> bool {
        if !self.recording {
            return false;
        }
        let absolute_time = at.timestamp_micros() as f64 / 1_000_000.0;
        self.events.push(LoggedEvent {
            timestamp: music_offset,
            absolute_time,
        });
        true
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }

    pub fn document(&self) -> EventLogDocument {
        EventLogDocument {
            metadata: EventLogMetadata {
                export_time: Utc::now(),
                total_events: self.events.len(),
                version: EVENT_LOG_VERSION.to_string(),
            },
            events: self.events.clone(),
        }
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.document().to_json()?)?;
        tracing::info!(path = %path.display(), events = self.events.len(), "event log exported");
        Ok(())
    }

    /// Replaces the recorded events with the contents of `path`. On any error
    /// the current events are left untouched.
    pub fn import(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let document = EventLogDocument::from_json(&text)?;
        self.events = document.events;
        Ok(self.events.len())
    }
}
