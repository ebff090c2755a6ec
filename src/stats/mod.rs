//! Ingest counters per file and per monitored PID

use std::collections::BTreeMap;
use serde::Serialize;

/// Counters for one monitored PID
#[derive(Debug, Clone, Default, Serialize)]
pub struct PidStats {
    pub stream_type: u8,
    pub pes_units: u64,
    pub bytes: u64,
    pub boundaries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_pts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pts: Option<u64>,
}

/// Per-file ingest statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub packets: u64,
    pub malformed: u64,
    pub pes_units: u64,
    pub units_without_pts: u64,
    pub events_pushed: u64,
    pub implicit_triggered: u64,
    pub pids: BTreeMap<u16, PidStats>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a PID to track
    pub fn add_stream(&mut self, pid: u16, stream_type: u8) {
        self.pids.insert(pid, PidStats { stream_type, ..Default::default() });
    }

    /// Count a completed PES unit
    pub fn update_unit(&mut self, pid: u16, bytes: usize, pts: Option<u64>) {
        self.pes_units += 1;
        if pts.is_none() {
            self.units_without_pts += 1;
        }
        if let Some(stats) = self.pids.get_mut(&pid) {
            stats.pes_units += 1;
            stats.bytes += bytes as u64;
            if let Some(pts) = pts {
                stats.first_pts.get_or_insert(pts);
                stats.last_pts = Some(pts);
            }
        }
    }

    /// Count a boundary event pushed for a PID's own partitions
    pub fn update_boundary(&mut self, pid: u16) {
        self.events_pushed += 1;
        if let Some(stats) = self.pids.get_mut(&pid) {
            stats.boundaries += 1;
        }
    }

    pub fn update_implicit(&mut self) {
        self.events_pushed += 1;
        self.implicit_triggered += 1;
    }

    pub fn get(&self, pid: u16) -> Option<&PidStats> {
        self.pids.get(&pid)
    }

    /// Media time covered by a PID in seconds
    pub fn duration_secs(&self, pid: u16) -> Option<f64> {
        let s = self.pids.get(&pid)?;
        let span = s.last_pts?.checked_sub(s.first_pts?)?;
        Some(span as f64 / crate::constants::PTS_CLOCK_HZ as f64)
    }
}
