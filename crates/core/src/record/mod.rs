use serde::{Deserialize, Serialize};

/// What to do with a press that arrives while the lane still has an open tap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the second press; the next lift closes the original tap.
    #[default]
    Ignore,
    /// Close the open tap at the new press time, then open a new one.
    AutoClose,
}

/// One press/release interval on a lane. `end_ms` is `None` while the key is
/// still held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapEvent {
    pub start_ms: i64,
    pub end_ms: Option<i64>,
}

impl TapEvent {
    pub fn is_open(&self) -> bool {
        self.end_ms.is_none()
    }
}

/// Flat `(track, start, end)` row of an exported raw tap table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapRow {
    pub track: String,
    pub start: i64,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LaneTaps {
    name: String,
    taps: Vec<TapEvent>,
}

/// Captures press/release pairs per lane.
///
/// Each lane holds at most one open tap at a time. A lift without an open tap
/// is ignored; a press on a lane with an open tap follows the configured
/// [`OverlapPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapRecorder {
    lanes: Vec<LaneTaps>,
    overlap: OverlapPolicy,
}

impl TapRecorder {
    pub fn new<I, S>(lanes: I, overlap: OverlapPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lanes: lanes
                .into_iter()
                .map(|name| LaneTaps {
                    name: name.into(),
                    taps: Vec::new(),
                })
                .collect(),
            overlap,
        }
    }

    /// Records a press (`is_lift == false`) or release on `lane`. Returns
    /// `false` only when the lane is not configured.
    pub fn tap(&mut self, lane: &str, timestamp_ms: i64, is_lift: bool) -> bool {
        let overlap = self.overlap;
        let Some(entry) = self.lanes.iter_mut().find(|entry| entry.name == lane) else {
            return false;
        };

        let pressed = TapEvent {
            start_ms: timestamp_ms,
            end_ms: None,
        };
        match (is_lift, entry.taps.last_mut().filter(|tap| tap.is_open())) {
            (true, Some(open)) => open.end_ms = Some(timestamp_ms),
            (true, None) => {
                tracing::debug!(lane, timestamp_ms, "lift without a press, ignored");
            }
            (false, Some(open)) => match overlap {
                OverlapPolicy::Ignore => {
                    tracing::debug!(lane, timestamp_ms, "press while held, ignored");
                }
                OverlapPolicy::AutoClose => {
                    open.end_ms = Some(timestamp_ms);
                    entry.taps.push(pressed);
                }
            },
            (false, None) => entry.taps.push(pressed),
        }

        tracing::trace!(lane, count = entry.taps.len(), "tap");
        true
    }

    /// Closes every open tap at `timestamp_ms`, e.g. when playback stops with
    /// keys still held. Returns how many taps were closed.
    pub fn close_open(&mut self, timestamp_ms: i64) -> usize {
        let mut closed = 0;
        for entry in &mut self.lanes {
            if let Some(tap) = entry.taps.last_mut().filter(|tap| tap.is_open()) {
                tap.end_ms = Some(timestamp_ms);
                closed += 1;
            }
        }
        closed
    }

    pub fn clear(&mut self) {
        for entry in &mut self.lanes {
            entry.taps.clear();
        }
    }

    /// Number of intervals recorded on `lane`, if it exists.
    pub fn count(&self, lane: &str) -> Option<usize> {
        self.lane(lane).map(<[TapEvent]>::len)
    }

    pub fn lane(&self, lane: &str) -> Option<&[TapEvent]> {
        self.lanes
            .iter()
            .find(|entry| entry.name == lane)
            .map(|entry| entry.taps.as_slice())
    }

    pub fn lane_names(&self) -> impl Iterator<Item = &str> {
        self.lanes.iter().map(|entry| entry.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|entry| entry.taps.is_empty())
    }

    /// Flattens the recording into table rows: lanes in configured order,
    /// taps in recording order within each lane.
    pub fn rows(&self) -> Vec<TapRow> {
        self.lanes
            .iter()
            .flat_map(|entry| {
                entry.taps.iter().map(|tap| TapRow {
                    track: entry.name.clone(),
                    start: tap.start_ms,
                    end: tap.end_ms,
                })
            })
            .collect()
    }
}
