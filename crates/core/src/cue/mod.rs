use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{CalibratedTap, Result, TapCueError};

/// Object type requested for every cue created by this tool.
pub const CUE_OBJECT_TYPE: &str = "cue-marker";

/// Cue kind codes. Anything above [`CueKind::DEFAULT_MAX`] counts as custom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CueKind(pub u32);

impl CueKind {
    pub const DEFAULT_MAX: u32 = 1;
    /// Kind stamped on cues created by this tool.
    pub const CUSTOM: CueKind = CueKind(2);

    pub fn is_custom(self) -> bool {
        self.0 > Self::DEFAULT_MAX
    }
}

/// A destination that can host cues, e.g. a music segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueTarget {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// Arguments for a single cue creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueSpec {
    pub name: String,
    pub parent: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub time_ms: i64,
    pub cue_kind: CueKind,
}

impl CueSpec {
    pub fn custom(name: impl Into<String>, parent: impl Into<String>, time_ms: i64) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            object_type: CUE_OBJECT_TYPE.to_string(),
            time_ms,
            cue_kind: CueKind::CUSTOM,
        }
    }

    /// Cue for the snapped start of a calibrated tap.
    pub fn from_tap(tap: &CalibratedTap, parent: &str) -> Self {
        Self::custom(tap.cue_name(), parent, tap.start_calibrated)
    }
}

/// External project that receives cues. Calls may block on a remote round
/// trip; callers invoke them sequentially.
pub trait CueSink {
    fn list_targets(&mut self) -> Result<Vec<CueTarget>>;

    /// Removes the custom cues under `target_id`, leaving default cues alone.
    /// Returns how many were removed.
    fn clear(&mut self, target_id: &str) -> Result<usize>;

    fn create(&mut self, cue: &CueSpec) -> Result<()>;

    /// Persists everything created or removed since the last commit.
    fn commit(&mut self) -> Result<()>;
}

/// Outcome of an export pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub succeeded: usize,
    pub total: usize,
    pub committed: bool,
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.total)
    }
}

/// Creates one cue per calibrated tap under `target_id`, then commits once.
///
/// Individual failures are logged and skipped. A failed commit is logged and
/// reported through [`ExportReport::committed`].
pub fn export_cues<S: CueSink + ?Sized>(
    sink: &mut S,
    target_id: &str,
    taps: &[CalibratedTap],
) -> ExportReport {
    let mut succeeded = 0;
    for tap in taps {
        let cue = CueSpec::from_tap(tap, target_id);
        match sink.create(&cue) {
            Ok(()) => succeeded += 1,
            Err(err) => tracing::warn!(cue = %cue.name, %err, "failed to create cue"),
        }
    }

    let committed = match sink.commit() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%err, "failed to commit cues");
            false
        }
    };

    let report = ExportReport {
        succeeded,
        total: taps.len(),
        committed,
    };
    tracing::info!(target_id, %report, committed, "cue export finished");
    report
}

/// Removes custom cues from `target_id`, committing only if anything was
/// removed.
pub fn clear_custom_cues<S: CueSink + ?Sized>(sink: &mut S, target_id: &str) -> Result<usize> {
    let removed = sink.clear(target_id)?;
    if removed > 0 {
        sink.commit()?;
    }
    tracing::info!(target_id, removed, "custom cues cleared");
    Ok(removed)
}

/// Targets that can be offered to an operator: both a name and a path.
pub fn selectable_targets<S: CueSink + ?Sized>(sink: &mut S) -> Vec<CueTarget> {
    match sink.list_targets() {
        Ok(targets) => targets
            .into_iter()
            .filter(|target| !target.name.is_empty() && !target.path.is_empty())
            .collect(),
        Err(err) => {
            tracing::warn!(%err, "failed to list cue targets");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCue {
    pub name: String,
    pub time_ms: i64,
    pub cue_kind: CueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub cues: Vec<StoredCue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub segments: Vec<Segment>,
}

/// Cue sink over a JSON project file. Changes stay in memory until
/// [`CueSink::commit`] writes the file back.
#[derive(Debug)]
pub struct ProjectCueSink {
    path: PathBuf,
    project: ProjectDocument,
}

impl ProjectCueSink {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let project = serde_json::from_str(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            project,
        })
    }

    pub fn project(&self) -> &ProjectDocument {
        &self.project
    }

    fn segment_mut(&mut self, id: &str) -> Result<&mut Segment> {
        self.project
            .segments
            .iter_mut()
            .find(|segment| segment.id == id)
            .ok_or_else(|| TapCueError::Cue(format!("unknown target `{id}`")))
    }
}

impl CueSink for ProjectCueSink {
    fn list_targets(&mut self) -> Result<Vec<CueTarget>> {
        Ok(self
            .project
            .segments
            .iter()
            .map(|segment| CueTarget {
                id: segment.id.clone(),
                name: segment.name.clone(),
                path: segment.path.clone(),
            })
            .collect())
    }

    fn clear(&mut self, target_id: &str) -> Result<usize> {
        let segment = self.segment_mut(target_id)?;
        let before = segment.cues.len();
        segment.cues.retain(|cue| !cue.cue_kind.is_custom());
        Ok(before - segment.cues.len())
    }

    fn create(&mut self, cue: &CueSpec) -> Result<()> {
        if cue.object_type != CUE_OBJECT_TYPE {
            return Err(TapCueError::Cue(format!(
                "unsupported object type `{}`",
                cue.object_type
            )));
        }
        let segment = self.segment_mut(&cue.parent)?;
        segment.cues.push(StoredCue {
            name: cue.name.clone(),
            time_ms: cue.time_ms,
            cue_kind: cue.cue_kind,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.project)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(track: &str, sequence: i64, calibrated: i64) -> CalibratedTap {
        CalibratedTap {
            track: track.to_string(),
            start: calibrated + 3,
            end: None,
            start_sequence: sequence,
            start_calibrated: calibrated,
            end_sequence: None,
            end_calibrated: None,
        }
    }

    /// Sink that rejects creates whose index is listed in `failures`.
    #[derive(Default)]
    struct RecordingSink {
        failures: Vec<usize>,
        created: Vec<CueSpec>,
        attempts: usize,
        commits: usize,
        fail_commit: bool,
        custom_cues: usize,
    }

    impl CueSink for RecordingSink {
        fn list_targets(&mut self) -> Result<Vec<CueTarget>> {
            Err(TapCueError::Cue("unreachable".into()))
        }

        fn clear(&mut self, _target_id: &str) -> Result<usize> {
            Ok(std::mem::take(&mut self.custom_cues))
        }

        fn create(&mut self, cue: &CueSpec) -> Result<()> {
            let index = self.attempts;
            self.attempts += 1;
            if self.failures.contains(&index) {
                return Err(TapCueError::Cue("rejected".into()));
            }
            self.created.push(cue.clone());
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            if self.fail_commit {
                return Err(TapCueError::Cue("save failed".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn partial_failure_still_commits_once() {
        let mut sink = RecordingSink {
            failures: vec![1],
            ..Default::default()
        };
        let taps = [tap("J", 1, 500), tap("K", 2, 1_000), tap("L", 3, 1_500)];

        let report = export_cues(&mut sink, "seg-1", &taps);

        assert_eq!(report.to_string(), "2/3");
        assert!(report.committed);
        assert_eq!(sink.commits, 1);
        assert_eq!(sink.attempts, 3);
        assert_eq!(sink.created[1].name, "L_3");
    }

    #[test]
    fn cue_fields_come_from_the_snapped_start() {
        let mut sink = RecordingSink::default();
        export_cues(&mut sink, "seg-9", &[tap("K", 7, 3_500)]);

        let cue = &sink.created[0];
        assert_eq!(cue.name, "K_7");
        assert_eq!(cue.parent, "seg-9");
        assert_eq!(cue.time_ms, 3_500);
        assert_eq!(cue.object_type, CUE_OBJECT_TYPE);
        assert!(cue.cue_kind.is_custom());
    }

    #[test]
    fn commit_failure_is_reported_not_raised() {
        let mut sink = RecordingSink {
            fail_commit: true,
            ..Default::default()
        };
        let report = export_cues(&mut sink, "seg-1", &[tap("J", 0, 0)]);
        assert_eq!((report.succeeded, report.total), (1, 1));
        assert!(!report.committed);
    }

    #[test]
    fn clearing_nothing_skips_the_commit() {
        let mut sink = RecordingSink::default();
        assert_eq!(clear_custom_cues(&mut sink, "seg-1").unwrap(), 0);
        assert_eq!(sink.commits, 0);
    }

    #[test]
    fn clearing_cues_commits_once() {
        let mut sink = RecordingSink {
            custom_cues: 4,
            ..Default::default()
        };
        assert_eq!(clear_custom_cues(&mut sink, "seg-1").unwrap(), 4);
        assert_eq!(sink.commits, 1);
    }

    #[test]
    fn unreachable_sink_lists_no_targets() {
        let mut sink = RecordingSink::default();
        assert!(selectable_targets(&mut sink).is_empty());
    }

    fn project_file(dir: &Path) -> PathBuf {
        let project = ProjectDocument {
            segments: vec![
                Segment {
                    id: "{A}".into(),
                    name: "Intro".into(),
                    path: "\\Music\\Intro".into(),
                    cues: vec![
                        StoredCue {
                            name: "Entry Cue".into(),
                            time_ms: 0,
                            cue_kind: CueKind(0),
                        },
                        StoredCue {
                            name: "Exit Cue".into(),
                            time_ms: 30_000,
                            cue_kind: CueKind(1),
                        },
                        StoredCue {
                            name: "J_4".into(),
                            time_ms: 2_000,
                            cue_kind: CueKind::CUSTOM,
                        },
                    ],
                },
                Segment {
                    id: "{B}".into(),
                    name: String::new(),
                    path: "\\Music\\Unnamed".into(),
                    cues: Vec::new(),
                },
            ],
        };
        let path = dir.join("project.json");
        std::fs::write(&path, serde_json::to_string(&project).unwrap()).unwrap();
        path
    }

    #[test]
    fn project_sink_clears_only_custom_cues() {
        let dir = tempfile::tempdir().unwrap();
        let path = project_file(dir.path());
        let mut sink = ProjectCueSink::open(&path).unwrap();

        assert_eq!(clear_custom_cues(&mut sink, "{A}").unwrap(), 1);
        assert_eq!(clear_custom_cues(&mut sink, "{A}").unwrap(), 0);

        let reopened = ProjectCueSink::open(&path).unwrap();
        let names: Vec<_> = reopened.project().segments[0]
            .cues
            .iter()
            .map(|cue| cue.name.as_str())
            .collect();
        assert_eq!(names, ["Entry Cue", "Exit Cue"]);
    }

    #[test]
    fn project_sink_persists_exported_cues() {
        let dir = tempfile::tempdir().unwrap();
        let path = project_file(dir.path());
        let mut sink = ProjectCueSink::open(&path).unwrap();

        assert_eq!(selectable_targets(&mut sink).len(), 1);

        let report = export_cues(&mut sink, "{A}", &[tap("K", 1, 500), tap("L", 2, 1_000)]);
        assert_eq!(report.to_string(), "2/2");

        let reopened = ProjectCueSink::open(&path).unwrap();
        assert_eq!(reopened.project().segments[0].cues.len(), 5);
    }

    #[test]
    fn project_sink_rejects_unknown_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ProjectCueSink::open(&project_file(dir.path())).unwrap();

        let report = export_cues(&mut sink, "{missing}", &[tap("J", 1, 500)]);
        assert_eq!(report.succeeded, 0);
        assert!(sink.clear("{missing}").is_err());
    }
}
