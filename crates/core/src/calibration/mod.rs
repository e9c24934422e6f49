use serde::{Deserialize, Serialize};

use crate::{Result, TapCueError, TapRow};

/// Upper tempo bound. Beats shorter than a millisecond cannot be represented
/// on an integer millisecond grid.
pub const MAX_BPM: f64 = 60_000.0;

/// A timestamp snapped onto the beat grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedTime {
    /// Whole beats between the grid origin and the timestamp.
    pub beat_index: i64,
    pub ms: i64,
}

/// Beat grid defined by a tempo and the phase offset of beat zero.
///
/// Both rounding steps round half away from zero, so a tap exactly between
/// two beats snaps to the later one for timestamps past the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatGrid {
    bpm: f64,
    offset_ms: i64,
    beat_ms: f64,
}

impl BeatGrid {
    /// Validates the tempo before any grid arithmetic happens.
    pub fn new(bpm: f64, offset_ms: i64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TapCueError::InvalidCalibration(format!(
                "BPM must be greater than zero, got {bpm}"
            )));
        }
        if bpm > MAX_BPM {
            return Err(TapCueError::InvalidCalibration(format!(
                "BPM must not exceed {MAX_BPM}, got {bpm}"
            )));
        }

        Ok(Self {
            bpm,
            offset_ms,
            beat_ms: 60_000.0 / bpm,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn beat_ms(&self) -> f64 {
        self.beat_ms
    }

    pub fn quantize(&self, ms: f64) -> QuantizedTime {
        let offset = self.offset_ms as f64;
        let beat_index = ((ms - offset) / self.beat_ms).round() as i64;
        let snapped = (beat_index as f64 * self.beat_ms + offset).round() as i64;
        QuantizedTime {
            beat_index,
            ms: snapped,
        }
    }
}

/// Convenience wrapper that builds the grid and quantizes a single timestamp.
pub fn quantize(ms: f64, bpm: f64, offset_ms: i64) -> Result<QuantizedTime> {
    Ok(BeatGrid::new(bpm, offset_ms)?.quantize(ms))
}

/// Raw tap row plus its grid-snapped start and end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibratedTap {
    pub track: String,
    pub start: i64,
    pub end: Option<i64>,
    pub start_sequence: i64,
    pub start_calibrated: i64,
    pub end_sequence: Option<i64>,
    pub end_calibrated: Option<i64>,
}

impl CalibratedTap {
    pub fn from_row(row: &TapRow, grid: &BeatGrid) -> Self {
        let start = grid.quantize(row.start as f64);
        let end = row.end.map(|end| grid.quantize(end as f64));
        Self {
            track: row.track.clone(),
            start: row.start,
            end: row.end,
            start_sequence: start.beat_index,
            start_calibrated: start.ms,
            end_sequence: end.map(|q| q.beat_index),
            end_calibrated: end.map(|q| q.ms),
        }
    }

    /// Cue marker name, `<lane>_<start beat>`.
    pub fn cue_name(&self) -> String {
        format!("{}_{}", self.track, self.start_sequence)
    }
}

/// Quantizes every row and orders the result by snapped start time.
///
/// Snapping can swap taps from different lanes, so the output order may
/// differ from the raw chronology. Ties keep the raw start order.
pub fn calibrate(rows: &[TapRow], grid: &BeatGrid) -> Vec<CalibratedTap> {
    let mut calibrated: Vec<_> = rows
        .iter()
        .map(|row| CalibratedTap::from_row(row, grid))
        .collect();
    calibrated.sort_by_key(|tap| (tap.start_calibrated, tap.start));
    tracing::debug!(
        rows = calibrated.len(),
        bpm = grid.bpm(),
        offset_ms = grid.offset_ms(),
        "calibrated taps"
    );
    calibrated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(track: &str, start: i64, end: Option<i64>) -> TapRow {
        TapRow {
            track: track.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn snaps_to_nearest_beat() {
        let grid = BeatGrid::new(120.0, 0).unwrap();
        assert_eq!(grid.beat_ms(), 500.0);
        assert_eq!(
            grid.quantize(733.0),
            QuantizedTime {
                beat_index: 1,
                ms: 500
            }
        );
    }

    #[test]
    fn half_beat_ties_round_away_from_zero() {
        let grid = BeatGrid::new(120.0, 0).unwrap();
        assert_eq!(grid.quantize(250.0).beat_index, 1);
        assert_eq!(grid.quantize(250.0).ms, 500);
        assert_eq!(grid.quantize(-250.0).beat_index, -1);
    }

    #[test]
    fn offset_origin_is_preserved() {
        let q = quantize(100.0, 90.0, 100).unwrap();
        assert_eq!(q.beat_index, 0);
        assert_eq!(q.ms, 100);

        let q = quantize(800.0, 90.0, 100).unwrap();
        assert_eq!(q.beat_index, 1);
        assert_eq!(q.ms, 767);
    }

    #[test]
    fn rejects_degenerate_tempo() {
        for bpm in [0.0, -10.0, f64::NAN, f64::INFINITY, MAX_BPM * 2.0] {
            let err = BeatGrid::new(bpm, 0).unwrap_err();
            assert!(matches!(err, TapCueError::InvalidCalibration(_)), "{bpm}");
        }
        assert!(quantize(100.0, 0.0, 0).is_err());
    }

    #[test]
    fn quantizing_twice_changes_nothing() {
        for bpm in [1.0, 60.0, 90.0, 120.0, 133.7, 174.0, 999.0, 12_345.0] {
            for offset in [0, 37, 100, 5_000] {
                let grid = BeatGrid::new(bpm, offset).unwrap();
                for ms in (-2_000..20_000).step_by(7) {
                    let once = grid.quantize(ms as f64);
                    let twice = grid.quantize(once.ms as f64);
                    assert_eq!(once, twice, "bpm={bpm} offset={offset} ms={ms}");
                }
            }
        }
    }

    #[test]
    fn calibrates_both_columns_and_sorts_by_snapped_start() {
        let grid = BeatGrid::new(120.0, 0).unwrap();
        let rows = [
            row("J", 520, Some(990)),
            row("K", 260, Some(300)),
            row("J", 1_240, None),
        ];

        let calibrated = calibrate(&rows, &grid);
        let order: Vec<_> = calibrated.iter().map(|tap| tap.start).collect();
        assert_eq!(order, [260, 520, 1_240]);

        let first = &calibrated[0];
        assert_eq!((first.start_sequence, first.start_calibrated), (1, 500));
        assert_eq!((first.end_sequence, first.end_calibrated), (Some(1), Some(500)));
        assert_eq!(first.cue_name(), "K_1");

        let last = &calibrated[2];
        assert_eq!(last.start_calibrated, 1_000);
        assert_eq!(last.end_sequence, None);
        assert_eq!(last.end_calibrated, None);
    }

    #[test]
    fn lane_grouped_rows_are_interleaved() {
        let grid = BeatGrid::new(60.0, 0).unwrap();
        let rows = [
            row("J", 1_400, None),
            row("J", 2_600, None),
            row("K", 1_900, None),
            row("K", 2_100, None),
        ];

        let calibrated = calibrate(&rows, &grid);
        let order: Vec<_> = calibrated
            .iter()
            .map(|tap| (tap.track.as_str(), tap.start_calibrated))
            .collect();
        assert_eq!(
            order,
            [("J", 1_000), ("K", 2_000), ("K", 2_000), ("J", 3_000)]
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let grid = BeatGrid::new(90.0, 0).unwrap();
        assert!(calibrate(&[], &grid).is_empty());
    }
}
