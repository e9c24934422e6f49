use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tap_cue_core::{
    calibrate, clear_custom_cues, export_cues, parse_script, replay, selectable_targets, table,
    AppConfig, BeatGrid, EventRecorder, ManualTime, ProjectCueSink, SimulatedBackend, TapCueError,
    TapSession,
};
use tracing_subscriber::EnvFilter;

fn main() -> tap_cue_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Calibrate {
            input,
            output,
            grid,
        } => run_calibrate(&config, &input, &output, grid),
        Commands::Replay {
            script,
            output,
            duration_ms,
            events,
        } => run_replay(&config, &script, &output, duration_ms, events.as_deref()),
        Commands::Targets { project } => run_targets(&project),
        Commands::PushCues {
            project,
            target,
            input,
            grid,
        } => run_push_cues(&config, &project, &target, &input, grid),
        Commands::ClearCues { project, target } => run_clear_cues(&project, &target),
        Commands::Events { path } => run_events(&path),
    }
}

fn run_calibrate(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    grid: GridArgs,
) -> tap_cue_core::Result<()> {
    let grid = grid.resolve(config)?;
    let rows = table::load_raw(input)?;
    if rows.is_empty() {
        tracing::warn!(?input, "raw tap table is empty");
    }
    table::save_calibrated(output, &calibrate(&rows, &grid))
}

fn run_replay(
    config: &AppConfig,
    script: &Path,
    output: &Path,
    duration_ms: Option<f64>,
    events: Option<&Path>,
) -> tap_cue_core::Result<()> {
    let lines = parse_script(&std::fs::read_to_string(script)?)?;

    let time = ManualTime::new();
    let backend = SimulatedBackend::new(time.clone(), duration_ms);
    let mut session = TapSession::new(backend, time.clone(), config);
    session.load(Path::new("simulated-track"))?;
    session.journal_mut().start_recording();

    let summary = replay(&mut session, &time, &lines)?;
    let closed = session.finish();
    tracing::info!(?summary, closed, "replay finished");

    table::save_raw(output, &session.recorder().rows())?;
    if let Some(events) = events {
        session.journal().export(events)?;
    }
    Ok(())
}

fn run_targets(project: &Path) -> tap_cue_core::Result<()> {
    let mut sink = ProjectCueSink::open(project)?;
    for target in selectable_targets(&mut sink) {
        println!("{}\t{} ({})", target.id, target.name, target.path);
    }
    Ok(())
}

fn run_push_cues(
    config: &AppConfig,
    project: &Path,
    target: &str,
    input: &Path,
    grid: GridArgs,
) -> tap_cue_core::Result<()> {
    let grid = grid.resolve(config)?;
    let rows = table::load_raw(input)?;
    if rows.is_empty() {
        return Err(TapCueError::msg("no raw taps to export"));
    }

    let mut sink = ProjectCueSink::open(project)?;
    let report = export_cues(&mut sink, target, &calibrate(&rows, &grid));
    println!("created {report} cues in `{target}`");
    if report.succeeded == 0 {
        return Err(TapCueError::Cue("failed to create any cues".into()));
    }
    Ok(())
}

fn run_clear_cues(project: &Path, target: &str) -> tap_cue_core::Result<()> {
    let mut sink = ProjectCueSink::open(project)?;
    match clear_custom_cues(&mut sink, target)? {
        0 => println!("no custom cues found"),
        removed => println!("deleted {removed} custom cues"),
    }
    Ok(())
}

fn run_events(path: &Path) -> tap_cue_core::Result<()> {
    let mut recorder = EventRecorder::new();
    let count = recorder.import(path)?;
    println!("{count} events");
    for event in recorder.events() {
        println!("{:>10.3}s  @ {:.3}", event.timestamp, event.absolute_time);
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tap rhythms against a track and turn them into cues", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Beat grid overrides; missing values come from the configuration.
#[derive(clap::Args, Debug, Clone, Copy)]
struct GridArgs {
    /// Tempo in beats per minute.
    #[arg(long)]
    bpm: Option<f64>,
    /// Time of beat zero in milliseconds.
    #[arg(long, allow_negative_numbers = true)]
    offset: Option<i64>,
}

impl GridArgs {
    fn resolve(self, config: &AppConfig) -> tap_cue_core::Result<BeatGrid> {
        let bpm = self.bpm.unwrap_or(config.calibration.bpm);
        let offset = self.offset.unwrap_or(config.calibration.offset_ms);
        BeatGrid::new(bpm, offset).inspect_err(|err| {
            tracing::warn!(bpm, offset, %err, "rejected beat grid");
        })
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Snap a raw tap table onto a beat grid.
    Calibrate {
        /// Raw tap table (`track,start,end`).
        input: PathBuf,
        /// Destination for the calibrated table.
        output: PathBuf,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Replay a timed control script against a simulated track.
    Replay {
        /// Script of `<wall_ms> <command> [argument]` lines.
        script: PathBuf,
        /// Destination for the raw tap table.
        output: PathBuf,
        /// Length of the simulated track in milliseconds.
        #[arg(long)]
        duration_ms: Option<f64>,
        /// Also write the press event log to this path.
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// List cue targets of a project file.
    Targets {
        project: PathBuf,
    },
    /// Calibrate raw taps and create one cue per tap in a project target.
    PushCues {
        project: PathBuf,
        /// Target id as printed by `targets`.
        #[arg(short, long)]
        target: String,
        /// Raw tap table (`track,start,end`).
        input: PathBuf,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Remove cues previously created by this tool from a project target.
    ClearCues {
        project: PathBuf,
        #[arg(short, long)]
        target: String,
    },
    /// Print the contents of an event log.
    Events {
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use tap_cue_core::MAX_BPM;

    use super::*;

    #[test]
    fn grid_args_override_config() {
        let args = GridArgs {
            bpm: Some(120.0),
            offset: None,
        };
        let grid = args.resolve(&AppConfig::default()).unwrap();
        assert_eq!(grid.bpm(), 120.0);
        assert_eq!(grid.offset_ms(), 0);
    }

    #[test]
    fn grid_args_reject_zero_and_oversized_tempo() {
        for bpm in [0.0, MAX_BPM + 1.0] {
            let args = GridArgs {
                bpm: Some(bpm),
                offset: Some(10),
            };
            let err = args.resolve(&AppConfig::default()).unwrap_err();
            assert!(matches!(err, TapCueError::InvalidCalibration(_)), "{bpm}");
        }
    }
}
