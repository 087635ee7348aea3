use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::detection::Pose;
use crate::error::Result;
use crate::utils::write_atomically;

const POSE_SUFFIXES: [&str; 6] = ["x", "y", "z", "rx", "ry", "rz"];

/// Upper bound on rows reserved up front from an advertised frame count.
const MAX_RESERVED_ROWS: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq)]
pub struct PoseRow {
    /// Seconds.
    pub timestamp: f64,
    /// One entry per tracked marker, in tracking order.
    pub poses: Vec<Option<Pose>>,
}

/// Per-frame pose time series for a fixed list of marker ids.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseTable {
    marker_ids: Vec<i32>,
    rows: Vec<PoseRow>,
}

impl PoseTable {
    pub fn new(marker_ids: Vec<i32>) -> Self {
        Self::with_capacity(marker_ids, 0)
    }

    /// `frames` is a hint; the reservation is capped since video backends
    /// can advertise arbitrary frame counts.
    pub fn with_capacity(marker_ids: Vec<i32>, frames: usize) -> Self {
        Self {
            marker_ids,
            rows: Vec::with_capacity(frames.min(MAX_RESERVED_ROWS)),
        }
    }

    pub fn marker_ids(&self) -> &[i32] {
        &self.marker_ids
    }

    pub fn rows(&self) -> &[PoseRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends one frame. `poses` must hold one entry per tracked id.
    pub fn push_row(&mut self, timestamp: f64, poses: Vec<Option<Pose>>) {
        debug_assert_eq!(poses.len(), self.marker_ids.len());
        self.rows.push(PoseRow { timestamp, poses });
    }

    pub fn header(&self) -> String {
        let mut header = String::from("t");
        for id in &self.marker_ids {
            for suffix in POSE_SUFFIXES {
                let _ = write!(header, ",{id}_{suffix}");
            }
        }
        header
    }

    /// Comma-separated rendering: header line, then one line per frame.
    /// Undefined poses are six empty cells.
    pub fn to_csv(&self) -> String {
        let mut out = self.header();
        out.push('\n');
        for row in &self.rows {
            let _ = write!(out, "{:?}", row.timestamp);
            for pose in &row.poses {
                match pose {
                    Some(pose) => {
                        for value in pose.fields() {
                            let _ = write!(out, ",{value:?}");
                        }
                    }
                    None => out.push_str(",,,,,,"),
                }
            }
            out.push('\n');
        }
        out
    }

    /// Writes the table to `dst`; nothing is left at `dst` if writing fails.
    pub fn write_csv(&self, dst: &Path) -> Result<()> {
        let csv = self.to_csv();
        write_atomically(dst, |staging| Ok(fs::write(staging, csv)?))
    }
}
