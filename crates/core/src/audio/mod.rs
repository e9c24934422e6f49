use std::path::{Path, PathBuf};

use crate::TimeSource;

/// Failure reported by an [`AudioBackend`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Play(String),
    /// The engine can only start playback from the beginning of the track.
    #[error("engine cannot start playback at an offset")]
    OffsetUnsupported,
}

/// Minimal capability surface of an audio engine.
///
/// Engines are treated as black boxes: they can start from an offset (maybe),
/// stop, and report whether they are still producing sound. There is no
/// position query; [`crate::PlaybackClock`] reconstructs position from wall
/// time instead.
pub trait AudioBackend {
    /// Opens `source` and returns its duration in milliseconds when known.
    fn load(&mut self, source: &Path) -> Result<Option<f64>, BackendError>;

    /// Starts playback at `start_ms`. Engines without offset support return
    /// [`BackendError::OffsetUnsupported`] for any non-zero start.
    fn play(&mut self, start_ms: f64) -> Result<(), BackendError>;

    fn stop(&mut self);

    /// Whether the engine is still producing sound.
    fn is_busy(&self) -> bool;
}

/// Silent engine that pretends to play a track of a fixed length.
///
/// Busy state is derived from the supplied time source, which makes it usable
/// for deterministic replays where no real audio device is involved.
#[derive(Debug)]
pub struct SimulatedBackend<T> {
    time: T,
    duration_ms: Option<f64>,
    supports_offset: bool,
    source: Option<PathBuf>,
    /// Wall time and track position at which the current run started.
    running: Option<(f64, f64)>,
}

impl<T: TimeSource> SimulatedBackend<T> {
    pub fn new(time: T, duration_ms: Option<f64>) -> Self {
        Self {
            time,
            duration_ms,
            supports_offset: true,
            source: None,
            running: None,
        }
    }

    /// Emulates engines that can only restart from zero.
    pub fn without_offset_support(mut self) -> Self {
        self.supports_offset = false;
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl<T: TimeSource> AudioBackend for SimulatedBackend<T> {
    fn load(&mut self, source: &Path) -> Result<Option<f64>, BackendError> {
        self.running = None;
        self.source = Some(source.to_path_buf());
        Ok(self.duration_ms)
    }

    fn play(&mut self, start_ms: f64) -> Result<(), BackendError> {
        if self.source.is_none() {
            return Err(BackendError::Play("nothing loaded".into()));
        }
        if start_ms > 0.0 && !self.supports_offset {
            return Err(BackendError::OffsetUnsupported);
        }
        self.running = Some((self.time.now_ms(), start_ms));
        Ok(())
    }

    fn stop(&mut self) {
        self.running = None;
    }

    fn is_busy(&self) -> bool {
        match (self.running, self.duration_ms) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some((since, start)), Some(duration)) => {
                start + (self.time.now_ms() - since) < duration
            }
        }
    }
}
