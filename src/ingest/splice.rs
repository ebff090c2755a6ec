//! SCTE-35 splice points that must coincide with EBP segment boundaries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error, info};

use crate::config::Config;
use crate::ebp::EbpStructure;
use crate::psi::SpliceInfoSection;

/// Outcome counters for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SpliceSummary {
    pub registered: u32,
    pub matched: u32,
    pub failed: u32,
}

pub struct SpliceTracker {
    file: usize,
    tolerance: u64,
    capacity: usize,
    /// PIDs that carry their own EBP and so must mark splice points.
    pids: BTreeSet<u16>,
    pending: BTreeMap<u16, BTreeSet<u64>>,
    /// event_id -> splice PTS, for dropping repeated sections.
    history: BTreeMap<u32, u64>,
    last_pts: HashMap<u16, u64>,
    summary: SpliceSummary,
}

impl SpliceTracker {
    pub fn new(file: usize, cfg: &Config, pids: impl IntoIterator<Item = u16>) -> Self {
        Self {
            file,
            tolerance: cfg.splice_tolerance_ticks,
            capacity: cfg.splice_history_capacity.max(1),
            pids: pids.into_iter().collect(),
            pending: BTreeMap::new(),
            history: BTreeMap::new(),
            last_pts: HashMap::new(),
            summary: SpliceSummary::default(),
        }
    }

    pub fn summary(&self) -> SpliceSummary {
        self.summary
    }

    pub fn passed(&self) -> bool {
        self.summary.failed == 0
    }

    /// Registers a scheduled splice_insert against every tracked PID.
    pub fn on_section(&mut self, section: &SpliceInfoSection) {
        let Some((insert, pts)) = section.scheduled_insert() else {
            debug!(file = self.file, "splice_info_section without scheduled insert");
            return;
        };
        if self.history.get(&insert.event_id) == Some(&pts) {
            return;
        }
        if self.history.len() >= self.capacity && !self.history.contains_key(&insert.event_id) {
            if let Some((&oldest, _)) = self.history.iter().min_by_key(|&(_, &p)| p) {
                self.history.remove(&oldest);
            }
        }
        self.history.insert(insert.event_id, pts);

        info!(file = self.file, event_id = insert.event_id, pts, "SCTE-35 splice point");
        for &pid in &self.pids {
            // a splice point already behind this PID cannot be matched any more
            if self.last_pts.get(&pid).is_some_and(|&last| last > pts + self.tolerance) {
                debug!(file = self.file, pid, pts, "splice point already passed");
                continue;
            }
            self.pending.entry(pid).or_default().insert(pts);
            self.summary.registered += 1;
        }
    }

    /// Checks one PES unit of `pid` against the pending splice points.
    pub fn on_unit(&mut self, pid: u16, pts: u64, ebp: Option<&EbpStructure>) {
        if !self.pids.contains(&pid) {
            return;
        }
        self.last_pts.insert(pid, pts);
        self.prune(pts);

        let Some(points) = self.pending.get_mut(&pid) else { return };

        let missed: Vec<u64> = points.range(..pts.saturating_sub(self.tolerance)).copied().collect();
        for point in missed {
            points.remove(&point);
            self.summary.failed += 1;
            error!(file = self.file, pid, pts = point, "splice point passed without a boundary");
        }

        let lo = pts.saturating_sub(self.tolerance);
        let hit = points.range(lo..=pts + self.tolerance).next().copied();
        if let Some(point) = hit {
            points.remove(&point);
            if ebp.is_some_and(|e| e.segment) {
                self.summary.matched += 1;
                info!(file = self.file, pid, pts, splice_pts = point, "splice point on segment boundary");
            } else {
                self.summary.failed += 1;
                error!(file = self.file, pid, pts, splice_pts = point, "no EBP segment boundary at splice point");
            }
        }
    }

    /// Drops history entries whose splice time is behind every tracked PID.
    pub fn prune(&mut self, pts: u64) {
        let horizon = self
            .pids
            .iter()
            .map(|pid| self.last_pts.get(pid).copied().unwrap_or(0))
            .min()
            .unwrap_or(pts);
        let tolerance = self.tolerance;
        self.history.retain(|_, &mut p| p + tolerance >= horizon);
    }

    /// End of input: every splice point still pending was missed.
    pub fn finish(&mut self) {
        for (pid, points) in std::mem::take(&mut self.pending) {
            for pts in points {
                self.summary.failed += 1;
                error!(file = self.file, pid, pts, "splice point never reached");
            }
        }
    }
}
