use std::path::PathBuf;

/// Result alias that carries the custom [`TapCueError`] type.
pub type Result<T> = std::result::Result<T, TapCueError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TapCueError {
    /// Free-form failure with a readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The audio source could not be opened by the playback engine.
    #[error("failed to load `{}`: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
    /// Playback was requested before any source was loaded.
    #[error("no audio source loaded")]
    NotLoaded,
    /// The playback engine refused to start.
    #[error("playback failed: {0}")]
    Playback(String),
    /// Calibration parameters that would make the beat grid undefined.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    /// A tap table row or header that could not be decoded.
    #[error("tap table line {line}: {message}")]
    Table { line: usize, message: String },
    /// Event logs or project files that fail to (de)serialise.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration file parse failures.
    #[error("config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// Configuration values outside their valid range.
    #[error("invalid config: {0}")]
    Config(String),
    /// The cue sink rejected a call.
    #[error("cue sink: {0}")]
    Cue(String),
}

impl TapCueError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn table<T: Into<String>>(line: usize, message: T) -> Self {
        Self::Table {
            line,
            message: message.into(),
        }
    }
}

impl From<&str> for TapCueError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TapCueError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
