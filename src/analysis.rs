//! Cross-file validation of one stream slot.
//!
//! The worker first aligns every file's queue on the latest first boundary,
//! then pops one event per file at a time and compares them. Disagreements
//! are recorded as [`Mismatch`] values on the offending (file, slot); only
//! queue failures end the run.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::constants::{EBP_NUM_PARTITIONS, PTS_CLOCK_HZ};
use crate::error::{EbpError, Result};
use crate::fifo::FifoError;
use crate::topology::{Topology, describe};
use crate::types::{BoundaryEvent, FileStreamInfo, SapType};

/// One soft failure on one (file, slot).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    Pts { pts: u64, expected: u64 },
    Partition { pts: u64, partition_id: u8, expected: u8 },
    Jitter { pts: u64, partition_id: u8, predicted: u64, delta: u64, tolerance: u64 },
    AcquisitionPresence { pts: u64, present: bool },
    AcquisitionTime { pts: u64, seconds: u32, fraction: f64, expected_seconds: u32, expected_fraction: f64 },
    SapError { pts: u64 },
    SapSignaled { pts: u64, signaled: u8, computed: u8 },
    SapAboveMax { pts: u64, sap_type: u8, max: u8 },
    SapNotAllowed { pts: u64, sap_type: u8 },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::Pts { pts, expected } => write!(f, "PTS {pts} != {expected}"),
            Mismatch::Partition { pts, partition_id, expected } => {
                write!(f, "partition {partition_id} != {expected} at PTS {pts}")
            }
            Mismatch::Jitter { pts, partition_id, predicted, delta, tolerance } => write!(
                f,
                "jitter on partition {partition_id} at PTS {pts}: predicted {predicted}, delta {delta} > {tolerance}"
            ),
            Mismatch::AcquisitionPresence { pts, present } => {
                let what = if *present { "present" } else { "missing" };
                write!(f, "acquisition time {what} at PTS {pts}, other files disagree")
            }
            Mismatch::AcquisitionTime { pts, seconds, fraction, expected_seconds, expected_fraction } => write!(
                f,
                "acquisition time {seconds}+{fraction:.6} != {expected_seconds}+{expected_fraction:.6} at PTS {pts}"
            ),
            Mismatch::SapError { pts } => write!(f, "SAP type undecodable at PTS {pts}"),
            Mismatch::SapSignaled { pts, signaled, computed } => {
                write!(f, "signaled SAP {signaled} != computed {computed} at PTS {pts}")
            }
            Mismatch::SapAboveMax { pts, sap_type, max } => {
                write!(f, "SAP {sap_type} above descriptor maximum {max} at PTS {pts}")
            }
            Mismatch::SapNotAllowed { pts, sap_type } => {
                write!(f, "SAP {sap_type} without sap flag at PTS {pts}")
            }
        }
    }
}

/// Final state of one (file, slot) after analysis.
#[derive(Debug, Clone, Serialize)]
pub struct StreamVerdict {
    pub file: usize,
    pub slot: usize,
    pub pid: u16,
    pub is_video: bool,
    pub passed: bool,
    pub partitions: String,
    pub events: u64,
    pub discarded: u64,
    pub mismatches: Vec<Mismatch>,
}

fn fifo_err(file: usize, slot: usize) -> impl FnOnce(FifoError) -> EbpError {
    move |source| EbpError::Fifo { file, slot, source }
}

struct Lane<'a> {
    file: usize,
    info: &'a FileStreamInfo,
    active: bool,
    last_pts: [u64; EBP_NUM_PARTITIONS],
    verdict: StreamVerdict,
}

impl Lane<'_> {
    /// Consumes the sentinel so the queue counters balance.
    fn finish(&mut self, slot: usize) -> Result<()> {
        self.info.queue.pop().map_err(fifo_err(self.file, slot))?;
        self.active = false;
        Ok(())
    }

    fn fail(&mut self, slot: usize, partition_id: u8, m: Mismatch) {
        error!(file = self.file, slot, pid = self.info.pid, partition = partition_id, "{m}");
        self.verdict.passed = false;
        self.verdict.mismatches.push(m);
    }
}

pub struct AnalysisWorker<'a> {
    slot: usize,
    jitter_tolerance: u64,
    lanes: Vec<Lane<'a>>,
}

impl<'a> AnalysisWorker<'a> {
    /// `streams` holds one entry per file that carries the slot.
    pub fn new(slot: usize, streams: Vec<(usize, &'a FileStreamInfo)>, jitter_tolerance: u64) -> Self {
        let lanes = streams
            .into_iter()
            .map(|(file, info)| Lane {
                file,
                info,
                active: true,
                last_pts: [0; EBP_NUM_PARTITIONS],
                verdict: StreamVerdict {
                    file,
                    slot,
                    pid: info.pid,
                    is_video: info.is_video,
                    passed: true,
                    partitions: describe(&info.boundaries),
                    events: 0,
                    discarded: 0,
                    mismatches: Vec::new(),
                },
            })
            .collect();
        Self { slot, jitter_tolerance, lanes }
    }

    pub fn from_topology(slot: usize, topo: &'a Topology, cfg: &Config) -> Self {
        let streams = topo
            .slot_column(slot)
            .into_iter()
            .enumerate()
            .filter_map(|(file, info)| info.map(|i| (file, i)))
            .collect();
        Self::new(slot, streams, cfg.jitter_tolerance_ticks())
    }

    pub fn run(mut self) -> Result<Vec<StreamVerdict>> {
        let start = self.synchronize()?;
        info!(slot = self.slot, start_pts = ?start, "analysis synchronized");

        while self.step()? {}

        for lane in &self.lanes {
            info!(
                slot = self.slot,
                file = lane.file,
                pid = lane.info.pid,
                events = lane.verdict.events,
                passed = lane.verdict.passed,
                "analysis finished"
            );
        }
        Ok(self.lanes.into_iter().map(|l| l.verdict).collect())
    }

    /// Drops every event earlier than the latest first event across files.
    fn synchronize(&mut self) -> Result<Option<u64>> {
        let slot = self.slot;
        let mut start: Option<u64> = None;
        for lane in &mut self.lanes {
            match lane.info.queue.peek().map_err(fifo_err(lane.file, slot))? {
                Some(ev) => start = Some(start.map_or(ev.pts, |s| s.max(ev.pts))),
                None => lane.finish(slot)?,
            }
        }
        let Some(start) = start else { return Ok(None) };

        for lane in self.lanes.iter_mut().filter(|l| l.active) {
            loop {
                match lane.info.queue.peek().map_err(fifo_err(lane.file, slot))? {
                    None => {
                        lane.finish(slot)?;
                        break;
                    }
                    Some(ev) if ev.pts < start => {
                        lane.info.queue.pop().map_err(fifo_err(lane.file, slot))?;
                        lane.verdict.discarded += 1;
                        debug!(slot, file = lane.file, pts = ev.pts, start, "discarding event before start");
                    }
                    Some(_) => break,
                }
            }
        }
        Ok(Some(start))
    }

    /// Pops one event per active lane and checks them. False once all lanes ended.
    fn step(&mut self) -> Result<bool> {
        let slot = self.slot;
        let mut popped = Vec::new();
        for (idx, lane) in self.lanes.iter_mut().enumerate().filter(|(_, l)| l.active) {
            match lane.info.queue.pop().map_err(fifo_err(lane.file, slot))? {
                Some(ev) => popped.push((idx, ev)),
                None => {
                    debug!(slot, file = lane.file, "end of boundaries");
                    lane.active = false;
                }
            }
        }
        if popped.is_empty() {
            return Ok(self.lanes.iter().any(|l| l.active));
        }
        self.check(&popped);
        Ok(true)
    }

    fn check(&mut self, popped: &[(usize, BoundaryEvent)]) {
        let Some((_, reference)) = popped.first() else { return };
        let ref_acq = reference.ebp.as_ref().and_then(|e| e.acquisition_secs());

        for (idx, ev) in popped {
            let lane = &mut self.lanes[*idx];
            lane.verdict.events += 1;
            let pid = ev.partition_id;

            if ev.pts != reference.pts {
                lane.fail(self.slot, pid, Mismatch::Pts { pts: ev.pts, expected: reference.pts });
            }
            if pid != reference.partition_id {
                lane.fail(
                    self.slot,
                    pid,
                    Mismatch::Partition { pts: ev.pts, partition_id: pid, expected: reference.partition_id },
                );
            }
            if let Some(m) = jitter(lane, ev, self.jitter_tolerance) {
                lane.fail(self.slot, pid, m);
            }
            if let Some(last) = lane.last_pts.get_mut(pid as usize) {
                *last = ev.pts;
            }

            let acq = ev.ebp.as_ref().and_then(|e| e.acquisition_secs());
            match (acq, ref_acq) {
                (Some(_), None) | (None, Some(_)) => {
                    lane.fail(self.slot, pid, Mismatch::AcquisitionPresence { pts: ev.pts, present: acq.is_some() })
                }
                (Some((s, f)), Some((rs, rf))) if s != rs || f != rf => lane.fail(
                    self.slot,
                    pid,
                    Mismatch::AcquisitionTime {
                        pts: ev.pts,
                        seconds: s,
                        fraction: f,
                        expected_seconds: rs,
                        expected_fraction: rf,
                    },
                ),
                _ => {}
            }

            for m in sap_violations(ev) {
                lane.fail(self.slot, pid, m);
            }
            if ev.sap_type == SapType::NotSupported {
                debug!(slot = self.slot, file = lane.file, pts = ev.pts, "SAP type not supported for stream type");
            }
        }
    }
}

/// Distance from the boundary predicted by the descriptor's ebp_distance.
/// The first boundary of a partition has nothing to predict from.
fn jitter(lane: &Lane<'_>, ev: &BoundaryEvent, tolerance: u64) -> Option<Mismatch> {
    let last = *lane.last_pts.get(ev.partition_id as usize)?;
    if last == 0 {
        return None;
    }
    let desc = ev.descriptor.as_ref()?;
    let part = desc.partition(ev.partition_id)?;
    if part.ebp_distance == 0 || desc.ticks_per_second == 0 {
        return None;
    }
    let offset = u128::from(part.ebp_distance) * u128::from(PTS_CLOCK_HZ) / u128::from(desc.ticks_per_second);
    let Some(predicted) = u64::try_from(offset).ok().and_then(|o| last.checked_add(o)) else {
        warn!(
            file = lane.file,
            pid = lane.info.pid,
            partition = ev.partition_id,
            distance = part.ebp_distance,
            "ebp_distance out of PTS range, jitter not checked"
        );
        return None;
    };
    let delta = ev.pts.abs_diff(predicted);
    (delta > tolerance).then_some(Mismatch::Jitter {
        pts: ev.pts,
        partition_id: ev.partition_id,
        predicted,
        delta,
        tolerance,
    })
}

fn sap_violations(ev: &BoundaryEvent) -> Vec<Mismatch> {
    let computed = match ev.sap_type {
        SapType::NotSupported => return Vec::new(),
        SapType::Error => return vec![Mismatch::SapError { pts: ev.pts }],
        SapType::Type(t) => t,
    };
    let Some(marker) = &ev.ebp else { return Vec::new() };

    let mut out = Vec::new();
    if marker.sap_flag {
        if marker.sap_type != computed {
            out.push(Mismatch::SapSignaled { pts: ev.pts, signaled: marker.sap_type, computed });
        }
        let max = ev
            .descriptor
            .as_ref()
            .and_then(|d| d.partition(ev.partition_id))
            .map(|p| p.sap_type_max);
        if let Some(max) = max.filter(|&m| marker.sap_type > m) {
            out.push(Mismatch::SapAboveMax { pts: ev.pts, sap_type: marker.sap_type, max });
        }
    } else if !matches!(computed, 1 | 2) {
        out.push(Mismatch::SapNotAllowed { pts: ev.pts, sap_type: computed });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::ebp::EbpStructure;
    use crate::fifo::Fifo;
    use crate::psi::{EbpDescriptor, EbpPartition};
    use crate::types::BoundaryTable;

    fn descriptor() -> Arc<EbpDescriptor> {
        Arc::new(EbpDescriptor {
            ticks_per_second: 1,
            distance_width: 1,
            partitions: vec![EbpPartition {
                partition_id: 2,
                explicit: true,
                boundary: true,
                ebp_distance: 1,
                sap_type_max: 2,
                acquisition_time_flag: false,
                ebp_pid: None,
                representation_id: None,
            }],
        })
    }

    fn stream(pid: u16) -> FileStreamInfo {
        let mut boundaries = BoundaryTable::default();
        boundaries[2].is_boundary = true;
        FileStreamInfo {
            pid,
            stream_type: 0x1B,
            is_video: true,
            descriptor: Some(descriptor()),
            boundaries,
            queue: Arc::new(Fifo::new(16, [0])),
        }
    }

    fn event(pts: u64, sap: u8, sap_flag: bool) -> BoundaryEvent {
        BoundaryEvent {
            pts,
            partition_id: 2,
            sap_type: SapType::Type(sap),
            ebp: Some(EbpStructure { segment: true, sap_flag, sap_type: sap, ..Default::default() }),
            descriptor: Some(descriptor()),
        }
    }

    fn feed(info: &FileStreamInfo, pts: &[u64]) {
        for &p in pts {
            info.queue.push(event(p, 1, false)).unwrap();
        }
        info.queue.close_producer(0).unwrap();
    }

    fn analyze(streams: &[FileStreamInfo]) -> Vec<StreamVerdict> {
        let lanes = streams.iter().enumerate().collect();
        AnalysisWorker::new(0, lanes, 9000).run().unwrap()
    }

    #[test]
    fn aligned_boundaries_pass() {
        let streams = [stream(0x100), stream(0x200)];
        feed(&streams[0], &[90_000, 180_000, 270_000]);
        feed(&streams[1], &[90_000, 180_000, 270_000]);

        let verdicts = analyze(&streams);
        assert!(verdicts.iter().all(|v| v.passed && v.events == 3));
        for s in &streams {
            let (pushes, pops) = s.queue.counters();
            assert_eq!(pushes, pops);
        }
    }

    #[test]
    fn late_boundary_exceeds_jitter() {
        let streams = [stream(0x100), stream(0x200)];
        feed(&streams[0], &[90_000, 180_000, 270_000]);
        feed(&streams[1], &[90_000, 180_000, 290_000]);

        let verdicts = analyze(&streams);
        assert!(verdicts[0].passed);
        assert!(!verdicts[1].passed);
        assert!(verdicts[1].mismatches.contains(&Mismatch::Jitter {
            pts: 290_000,
            partition_id: 2,
            predicted: 270_000,
            delta: 20_000,
            tolerance: 9000,
        }));
    }

    #[test]
    fn synchronizes_on_latest_start() {
        let streams = [stream(0x100), stream(0x200)];
        feed(&streams[0], &[90_000, 180_000, 270_000]);
        feed(&streams[1], &[180_000, 270_000]);

        let verdicts = analyze(&streams);
        assert_eq!(verdicts[0].discarded, 1);
        assert!(verdicts.iter().all(|v| v.passed && v.events == 2));
    }

    #[test]
    fn sap_three_without_flag_fails() {
        let m = sap_violations(&event(90_000, 3, false));
        assert_eq!(m, vec![Mismatch::SapNotAllowed { pts: 90_000, sap_type: 3 }]);
        assert!(sap_violations(&event(90_000, 2, false)).is_empty());
    }

    #[test]
    fn signaled_sap_is_checked_against_descriptor() {
        let mut ev = event(90_000, 3, true);
        assert_eq!(sap_violations(&ev), vec![Mismatch::SapAboveMax { pts: 90_000, sap_type: 3, max: 2 }]);

        ev.sap_type = SapType::Type(1);
        assert!(sap_violations(&ev).contains(&Mismatch::SapSignaled { pts: 90_000, signaled: 3, computed: 1 }));

        ev.sap_type = SapType::NotSupported;
        assert!(sap_violations(&ev).is_empty());
        ev.sap_type = SapType::Error;
        assert_eq!(sap_violations(&ev), vec![Mismatch::SapError { pts: 90_000 }]);
    }

    #[test]
    fn acquisition_time_must_agree() {
        let streams = [stream(0x100), stream(0x200)];
        let mut with_time = event(90_000, 1, false);
        if let Some(e) = with_time.ebp.as_mut() {
            e.acquisition_time = Some(5 << 32);
        }
        streams[0].queue.push(with_time).unwrap();
        streams[0].queue.close_producer(0).unwrap();
        feed(&streams[1], &[90_000]);

        let verdicts = analyze(&streams);
        assert!(verdicts[0].passed);
        assert_eq!(verdicts[1].mismatches, vec![Mismatch::AcquisitionPresence { pts: 90_000, present: false }]);
    }

    #[test]
    fn empty_queues_end_immediately() {
        let streams = [stream(0x100)];
        streams[0].queue.close_producer(0).unwrap();
        let verdicts = analyze(&streams);
        assert!(verdicts[0].passed);
        assert_eq!(verdicts[0].events, 0);
        assert_eq!(streams[0].queue.counters(), (1, 1));
    }

    #[test]
    fn file_ending_before_common_start_drains_its_queue() {
        let streams = [stream(0x100), stream(0x200)];
        feed(&streams[0], &[90_000]);
        feed(&streams[1], &[180_000]);

        let verdicts = analyze(&streams);
        assert_eq!(verdicts[0].discarded, 1);
        assert_eq!(verdicts[0].events, 0);
        assert_eq!(verdicts[1].events, 1);
        assert!(verdicts.iter().all(|v| v.passed));
        for s in &streams {
            assert_eq!(s.queue.counters(), (2, 2));
        }
    }

    #[test]
    fn eight_byte_distance_does_not_overflow() {
        let wide = Arc::new(EbpDescriptor {
            ticks_per_second: 1,
            distance_width: 8,
            partitions: vec![EbpPartition { ebp_distance: u64::MAX >> 8, ..descriptor().partitions[0].clone() }],
        });
        let streams = [stream(0x100)];
        for pts in [90_000, 180_000] {
            let mut ev = event(pts, 1, false);
            ev.descriptor = Some(Arc::clone(&wide));
            streams[0].queue.push(ev).unwrap();
        }
        streams[0].queue.close_producer(0).unwrap();

        let verdicts = analyze(&streams);
        assert!(verdicts[0].passed, "{:?}", verdicts[0].mismatches);
        assert_eq!(verdicts[0].events, 2);
    }
}
