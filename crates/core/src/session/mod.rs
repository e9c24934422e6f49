use std::{path::Path, str::FromStr};

use crate::{
    AppConfig, AudioBackend, ClockSettings, EventRecorder, ManualTime, PlayOutcome,
    PlaybackClock, Result, TapCueError, TapRecorder, TimeSource,
};

/// Playback clock and tap lanes driven by a single control thread.
///
/// Every press or lift reads the clock once and records the reading in the
/// same call, so a tap always lands at the position shown when it happened.
#[derive(Debug)]
pub struct TapSession<B, T> {
    clock: PlaybackClock<B, T>,
    recorder: TapRecorder,
    journal: EventRecorder,
}

impl<B: AudioBackend, T: TimeSource> TapSession<B, T> {
    pub fn new(backend: B, time: T, config: &AppConfig) -> Self {
        Self {
            clock: PlaybackClock::new(backend, time, ClockSettings::from(&config.playback)),
            recorder: TapRecorder::new(config.lanes.iter().cloned(), config.taps.overlap),
            journal: EventRecorder::new(),
        }
    }

    pub fn load(&mut self, source: &Path) -> Result<Option<f64>> {
        self.clock.load(source)
    }

    /// Records a press. The event log only receives presses that opened a
    /// new interval, so presses dropped while a key is held are not logged.
    pub fn press(&mut self, lane: &str) -> bool {
        let position = self.clock.position_ms();
        let before = self.recorder.count(lane);
        let accepted = self.recorder.tap(lane, position.round() as i64, false);
        if accepted && self.recorder.count(lane) > before {
            self.journal.record(position / 1_000.0);
        }
        accepted
    }

    pub fn lift(&mut self, lane: &str) -> bool {
        let position = self.clock.position_ms();
        self.recorder.tap(lane, position.round() as i64, true)
    }

    /// Closes keys that are still held at the current position.
    pub fn finish(&mut self) -> usize {
        let position = self.clock.position_ms().round() as i64;
        self.recorder.close_open(position)
    }

    pub fn clock(&self) -> &PlaybackClock<B, T> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock<B, T> {
        &mut self.clock
    }

    pub fn recorder(&self) -> &TapRecorder {
        &self.recorder
    }

    pub fn journal(&self) -> &EventRecorder {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut EventRecorder {
        &mut self.journal
    }
}

/// One control action of a scripted session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Play,
    Pause,
    Stop,
    Seek(f64),
    Press(String),
    Lift(String),
    Poll,
}

impl FromStr for SessionCommand {
    type Err = TapCueError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().unwrap_or_default();
        let argument = parts.next();
        if parts.next().is_some() {
            return Err(TapCueError::msg(format!("trailing input in `{s}`")));
        }

        let command = match (verb, argument) {
            ("play", None) => Self::Play,
            ("pause", None) => Self::Pause,
            ("stop", None) => Self::Stop,
            ("poll", None) => Self::Poll,
            ("seek", Some(ms)) => Self::Seek(
                ms.parse()
                    .map_err(|_| TapCueError::msg(format!("invalid seek position `{ms}`")))?,
            ),
            ("press", Some(lane)) => Self::Press(lane.to_string()),
            ("lift", Some(lane)) => Self::Lift(lane.to_string()),
            _ => return Err(TapCueError::msg(format!("unknown command `{s}`"))),
        };
        Ok(command)
    }
}

/// A command stamped with the wall time at which it happens.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub at_ms: f64,
    pub command: SessionCommand,
}

/// Parses `<wall_ms> <command> [argument]` lines. Blank lines and `#`
/// comments are skipped; wall times must not go backwards.
pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>> {
    let mut lines = Vec::new();
    let mut last = f64::NEG_INFINITY;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;

        let (at, rest) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| TapCueError::msg(format!("line {line_no}: missing command")))?;
        let at_ms = at
            .parse::<f64>()
            .ok()
            .filter(|ms| ms.is_finite())
            .ok_or_else(|| TapCueError::msg(format!("line {line_no}: invalid time `{at}`")))?;
        if at_ms < last {
            return Err(TapCueError::msg(format!(
                "line {line_no}: time {at} goes backwards"
            )));
        }
        last = at_ms;

        let command = rest
            .parse()
            .map_err(|err| TapCueError::msg(format!("line {line_no}: {err}")))?;
        lines.push(ScriptLine { at_ms, command });
    }
    Ok(lines)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accepted_taps: usize,
    pub rejected_taps: usize,
    pub restarts: usize,
    pub auto_stops: usize,
}

/// Runs `script` against `session`, moving `time` forward and polling the
/// clock at its configured interval between commands, as the UI timer would.
pub fn replay<B: AudioBackend>(
    session: &mut TapSession<B, ManualTime>,
    time: &ManualTime,
    script: &[ScriptLine],
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let tick = session.clock().poll_interval().as_secs_f64() * 1_000.0;
    let mut next_poll = script.first().map(|line| line.at_ms + tick).unwrap_or_default();

    for line in script {
        while tick > 0.0 && next_poll <= line.at_ms {
            time.set(next_poll);
            if session.clock_mut().poll() {
                summary.auto_stops += 1;
            }
            next_poll += tick;
        }
        time.set(line.at_ms);

        let accepted = match &line.command {
            SessionCommand::Play => {
                count_restart(&mut summary, session.clock_mut().play()?);
                continue;
            }
            SessionCommand::Seek(ms) => {
                count_restart(&mut summary, session.clock_mut().seek(*ms)?);
                continue;
            }
            SessionCommand::Pause => {
                session.clock_mut().pause();
                continue;
            }
            SessionCommand::Stop => {
                session.clock_mut().stop();
                continue;
            }
            SessionCommand::Poll => {
                if session.clock_mut().poll() {
                    summary.auto_stops += 1;
                }
                continue;
            }
            SessionCommand::Press(lane) => session.press(lane),
            SessionCommand::Lift(lane) => session.lift(lane),
        };

        if accepted {
            summary.accepted_taps += 1;
        } else {
            summary.rejected_taps += 1;
            tracing::warn!(at_ms = line.at_ms, command = ?line.command, "tap on unknown lane");
        }
    }
    Ok(summary)
}

fn count_restart(summary: &mut ReplaySummary, outcome: PlayOutcome) {
    if outcome == PlayOutcome::Restarted {
        summary.restarts += 1;
    }
}
