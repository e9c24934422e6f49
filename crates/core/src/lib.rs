//! Core library for the Tap Cue tool.
//!
//! An operator taps along to a playing track on a handful of lanes. The
//! [`PlaybackClock`] reconstructs the playback position from an engine that
//! only starts, stops and reports busy; the [`TapRecorder`] turns presses and
//! releases into intervals at that position; [`calibrate`] snaps the intervals
//! onto a BPM grid; and [`export_cues`] pushes the result into an external
//! project through a [`CueSink`].

pub mod audio;
pub mod calibration;
pub mod config;
pub mod cue;
pub mod error;
pub mod journal;
pub mod record;
pub mod session;
pub mod table;
pub mod timeline;

pub use audio::{AudioBackend, BackendError, SimulatedBackend};
pub use calibration::{calibrate, quantize, BeatGrid, CalibratedTap, QuantizedTime, MAX_BPM};
pub use config::{AppConfig, CalibrationConfig, PlaybackConfig, TapConfig};
pub use cue::{
    clear_custom_cues, export_cues, selectable_targets, CueKind, CueSink, CueSpec, CueTarget,
    ExportReport, ProjectCueSink,
};
pub use error::{Result, TapCueError};
pub use journal::{EventLogDocument, EventRecorder, LoggedEvent};
pub use record::{OverlapPolicy, TapEvent, TapRecorder, TapRow};
pub use session::{parse_script, replay, ReplaySummary, ScriptLine, SessionCommand, TapSession};
pub use timeline::{
    ClockSettings, ManualTime, MonotonicTime, PlayOutcome, PlaybackClock, PlaybackState,
    TimeSource,
};
