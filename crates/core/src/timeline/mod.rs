use std::{
    cell::Cell,
    path::Path,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{AudioBackend, BackendError, PlaybackConfig, Result, TapCueError};

/// Wall-clock reading in milliseconds from an arbitrary fixed origin.
pub trait TimeSource {
    fn now_ms(&self) -> f64;
}

/// Monotonic time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1_000.0
    }
}

/// Manually driven time. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<f64>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// How precisely a (re)start honoured the requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playback runs from the requested position.
    Exact,
    /// The engine could not start at an offset and restarted from zero.
    Restarted,
    /// Nothing changed, e.g. `play` while already playing.
    Unchanged,
}

/// Timing knobs for [`PlaybackClock`].
#[derive(Debug, Clone, Copy)]
pub struct ClockSettings {
    pub poll_interval: Duration,
    pub end_margin: f64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for ClockSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            end_margin: config.end_margin,
        }
    }
}

/// Reconstructs a continuous playback position from an engine that can only
/// start, stop and report busy.
///
/// While playing, `position = now - start_reference`, clamped to
/// `[0, duration]`. Pausing freezes the position and stops the engine;
/// resuming moves `start_reference` back by the frozen position so the same
/// formula keeps holding.
#[derive(Debug)]
pub struct PlaybackClock<B, T> {
    backend: B,
    time: T,
    settings: ClockSettings,
    state: PlaybackState,
    loaded: bool,
    duration_ms: Option<f64>,
    start_reference: Option<f64>,
    paused_position: f64,
}

impl<B: AudioBackend, T: TimeSource> PlaybackClock<B, T> {
    pub fn new(backend: B, time: T, settings: ClockSettings) -> Self {
        Self {
            backend,
            time,
            settings,
            state: PlaybackState::Stopped,
            loaded: false,
            duration_ms: None,
            start_reference: None,
            paused_position: 0.0,
        }
    }

    /// Loads a new source, stopping whatever was playing. Returns the
    /// duration in milliseconds when the engine knows it.
    pub fn load(&mut self, source: &Path) -> Result<Option<f64>> {
        self.stop();
        self.loaded = false;
        self.duration_ms = None;

        let duration = self.backend.load(source).map_err(|err| {
            tracing::warn!(source = %source.display(), %err, "failed to load audio source");
            TapCueError::Load {
                path: source.to_path_buf(),
                reason: err.to_string(),
            }
        })?;

        self.loaded = true;
        self.duration_ms = duration.filter(|d| d.is_finite() && *d >= 0.0);
        tracing::debug!(source = %source.display(), duration_ms = ?self.duration_ms, "loaded");
        Ok(self.duration_ms)
    }

    /// Starts playback from the current position, or resumes after a pause.
    pub fn play(&mut self) -> Result<PlayOutcome> {
        if !self.loaded {
            return Err(TapCueError::NotLoaded);
        }
        if self.state == PlaybackState::Playing {
            return Ok(PlayOutcome::Unchanged);
        }

        let outcome = self.start_at(self.paused_position)?;
        self.state = PlaybackState::Playing;
        tracing::debug!(position_ms = self.paused_position, ?outcome, "playing");
        Ok(outcome)
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.paused_position = self.position_ms();
        self.backend.stop();
        self.start_reference = None;
        self.state = PlaybackState::Paused;
        tracing::debug!(position_ms = self.paused_position, "paused");
    }

    pub fn stop(&mut self) {
        if self.state != PlaybackState::Stopped {
            tracing::debug!("stopped");
        }
        self.backend.stop();
        self.state = PlaybackState::Stopped;
        self.start_reference = None;
        self.paused_position = 0.0;
    }

    /// Moves the position to `ms`, clamped to the track. While playing this
    /// stops and restarts the engine at the new offset.
    pub fn seek(&mut self, ms: f64) -> Result<PlayOutcome> {
        let target = self.clamp(ms);
        if self.state != PlaybackState::Playing {
            self.paused_position = target;
            return Ok(PlayOutcome::Exact);
        }

        self.backend.stop();
        match self.start_at(target) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.state = PlaybackState::Stopped;
                self.start_reference = None;
                self.paused_position = 0.0;
                Err(err)
            }
        }
    }

    pub fn position_ms(&self) -> f64 {
        match (self.state, self.start_reference) {
            (PlaybackState::Playing, Some(reference)) => {
                self.clamp(self.time.now_ms() - reference)
            }
            _ => self.paused_position,
        }
    }

    /// Periodic check for the end of the track. Returns `true` when this call
    /// moved the clock to [`PlaybackState::Stopped`].
    ///
    /// The engine reports no reliable "ended" event, so the track counts as
    /// finished once the engine is idle and the computed position has reached
    /// `end_margin` of the duration. Without a known duration, idleness alone
    /// ends playback.
    pub fn poll(&mut self) -> bool {
        if self.state != PlaybackState::Playing || self.backend.is_busy() {
            return false;
        }

        let finished = match self.duration_ms {
            Some(duration) => self.position_ms() >= duration * self.settings.end_margin,
            None => true,
        };
        if finished {
            tracing::debug!(position_ms = self.position_ms(), "end of track");
            self.stop();
        }
        finished
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.duration_ms
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn start_at(&mut self, position: f64) -> Result<PlayOutcome> {
        match self.backend.play(position) {
            Ok(()) => {
                self.start_reference = Some(self.time.now_ms() - position);
                Ok(PlayOutcome::Exact)
            }
            Err(BackendError::OffsetUnsupported) => {
                tracing::warn!(position_ms = position, "engine cannot seek, restarting from zero");
                self.backend
                    .play(0.0)
                    .map_err(|err| TapCueError::Playback(err.to_string()))?;
                self.start_reference = Some(self.time.now_ms());
                self.paused_position = 0.0;
                Ok(PlayOutcome::Restarted)
            }
            Err(err) => {
                tracing::warn!(%err, "engine failed to start");
                Err(TapCueError::Playback(err.to_string()))
            }
        }
    }

    fn clamp(&self, ms: f64) -> f64 {
        let ms = ms.max(0.0);
        match self.duration_ms {
            Some(duration) => ms.min(duration),
            None => ms,
        }
    }
}
