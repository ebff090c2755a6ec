//! Per-file ingest: TS packets in, ordered boundary events out.

pub mod splice;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::STREAM_TYPE_SCTE35;
use crate::demux::{PacketReader, PesAssembler, PesUnit, TsPacket};
use crate::ebp::{self, EbpStructure};
use crate::error::{EbpError, Result};
use crate::fifo::Fifo;
use crate::parsers::classify_sap;
use crate::psi::{SectionAssembler, parse_splice_info};
use crate::stats::IngestStats;
use crate::topology::Topology;
use crate::types::{BoundaryEvent, FileScan, SapType};

pub use splice::{SpliceSummary, SpliceTracker};

/// What one ingest worker hands back to the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub file: usize,
    pub path: PathBuf,
    /// False when a SCTE-35 splice point was not met by a segment boundary.
    pub passed: bool,
    pub interrupted: bool,
    pub splice: SpliceSummary,
    pub stats: IngestStats,
}

/// Closes this file's producer side of every queue it feeds, on any exit.
struct CloseGuard {
    file: usize,
    queues: Vec<Arc<Fifo<BoundaryEvent>>>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        for q in &self.queues {
            if let Err(e) = q.close_producer(self.file) {
                warn!(file = self.file, "closing queue: {e}");
            }
        }
    }
}

pub struct IngestWorker<'a> {
    file: usize,
    scan: &'a FileScan,
    topo: &'a Topology,
    assemblers: BTreeMap<u16, PesAssembler>,
    scte35: HashMap<u16, SectionAssembler>,
    splice: SpliceTracker,
    stats: IngestStats,
}

impl<'a> IngestWorker<'a> {
    pub fn new(file: usize, scan: &'a FileScan, topo: &'a Topology, cfg: &Config) -> Self {
        let mut stats = IngestStats::new();
        let assemblers = topo
            .monitored_pids(file)
            .into_iter()
            .map(|pid| {
                let stream_type = scan.stream(pid).map_or(0, |es| es.stream_type);
                stats.add_stream(pid, stream_type);
                (pid, PesAssembler::new(pid))
            })
            .collect();
        let scte35 = scan
            .streams
            .iter()
            .filter(|es| es.stream_type == STREAM_TYPE_SCTE35)
            .map(|es| (es.pid, SectionAssembler::default()))
            .collect();
        let splice_pids = topo
            .file_streams(file)
            .filter(|(_, info)| info.explicit_partitions().next().is_some())
            .map(|(_, info)| info.pid);

        Self {
            file,
            scan,
            topo,
            assemblers,
            scte35,
            splice: SpliceTracker::new(file, cfg, splice_pids),
            stats,
        }
    }

    /// Reads the whole file (or until `shutdown`), then closes its queues.
    pub fn run(mut self, shutdown: &AtomicBool) -> Result<IngestReport> {
        let _guard = CloseGuard { file: self.file, queues: self.topo.producer_queues(self.file) };
        let path = self.scan.path.clone();
        let interrupted = self.read_all(&path, shutdown)?;

        for unit in self.assemblers.values_mut().filter_map(PesAssembler::flush).collect::<Vec<_>>() {
            self.on_unit(unit)?;
        }
        if !interrupted {
            self.splice.finish();
        }

        let s = &self.stats;
        info!(
            file = self.file,
            packets = s.packets,
            malformed = s.malformed,
            pes = s.pes_units,
            events = s.events_pushed,
            implicit = s.implicit_triggered,
            "ingest finished"
        );
        Ok(IngestReport {
            file: self.file,
            path,
            passed: self.splice.passed(),
            interrupted,
            splice: self.splice.summary(),
            stats: self.stats,
        })
    }

    /// Returns true when stopped by the shutdown flag.
    fn read_all(&mut self, path: &Path, shutdown: &AtomicBool) -> Result<bool> {
        let mut reader = PacketReader::open(path)
            .map_err(|source| EbpError::Open { path: path.to_path_buf(), source })?;
        info!(file = self.file, path = %path.display(), "ingest started");

        loop {
            if shutdown.load(Ordering::Relaxed) {
                warn!(file = self.file, "shutdown requested, flushing queues");
                return Ok(true);
            }
            let chunk = match reader.next_packet() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(false),
                Err(source) => return Err(EbpError::Read { path: path.to_path_buf(), source }),
            };
            self.stats.packets += 1;
            let pkt = match TsPacket::parse(chunk) {
                Ok(pkt) => pkt,
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(file = self.file, packet = self.stats.packets, "skipping packet: {e}");
                    continue;
                }
            };
            if pkt.transport_error {
                self.stats.malformed += 1;
                debug!(file = self.file, pid = pkt.pid, "transport error indicator set");
                continue;
            }

            if let Some(asm) = self.scte35.get_mut(&pkt.pid) {
                if let Some(payload) = asm.push(pkt.pusi, pkt.payload) {
                    match parse_splice_info(&payload) {
                        Ok(section) => self.splice.on_section(&section),
                        Err(e) => warn!(file = self.file, pid = pkt.pid, "bad splice_info_section: {e}"),
                    }
                }
            } else if let Some(asm) = self.assemblers.get_mut(&pkt.pid) {
                if let Some(unit) = asm.push(&pkt) {
                    self.on_unit(unit)?;
                }
            }
        }
    }

    fn on_unit(&mut self, unit: PesUnit) -> Result<()> {
        self.stats.update_unit(unit.pid, unit.es.len(), unit.pts);
        let Some(pts) = unit.pts else {
            debug!(file = self.file, pid = unit.pid, "PES unit without PTS");
            return Ok(());
        };
        let marker = unit.private_data.as_deref().and_then(ebp::find_in_private_data);
        self.splice.on_unit(unit.pid, pts, marker.as_ref());

        let Some(marker) = marker else {
            return Ok(());
        };
        let stream_type = self.scan.stream(unit.pid).map_or(0, |es| es.stream_type);
        let sap_type = classify_sap(stream_type, &unit.es);
        debug!(file = self.file, pid = unit.pid, pts, sap = %sap_type, rai = unit.random_access, "EBP marker");

        self.push_own(unit.pid, pts, sap_type, &marker)?;
        self.push_implicit(unit.pid, pts, sap_type, &marker)
    }

    /// Events for partitions this PID signals for its own slot.
    fn push_own(&mut self, pid: u16, pts: u64, sap_type: SapType, marker: &EbpStructure) -> Result<()> {
        let topo = self.topo;
        for (slot, info) in topo.file_streams(self.file).filter(|(_, info)| info.pid == pid) {
            for partition_id in info.explicit_partitions().filter(|&id| marker.is_partition(id)) {
                let event = BoundaryEvent {
                    pts,
                    partition_id,
                    sap_type,
                    ebp: Some(marker.clone()),
                    descriptor: info.descriptor.clone(),
                };
                info.queue.push(event).map_err(|source| EbpError::Fifo { file: self.file, slot, source })?;
                self.stats.update_boundary(pid);
                debug!(file = self.file, slot, pid, pts, partition = partition_id, "boundary");
            }
        }
        Ok(())
    }

    /// Synthetic events for streams that take their boundaries from this PID.
    fn push_implicit(&mut self, pid: u16, pts: u64, sap_type: SapType, marker: &EbpStructure) -> Result<()> {
        let topo = self.topo;
        for target in topo.implicit_targets(self.file, pid) {
            if !marker.is_partition(target.partition_id) {
                continue;
            }
            let Some(info) = topo.get(target.file, target.slot) else { continue };
            let event = BoundaryEvent {
                pts,
                partition_id: target.partition_id,
                sap_type,
                ebp: None,
                descriptor: info.descriptor.clone(),
            };
            info.queue
                .push(event)
                .map_err(|source| EbpError::Fifo { file: target.file, slot: target.slot, source })?;
            self.stats.update_implicit();
            debug!(
                file = target.file,
                slot = target.slot,
                pid = info.pid,
                trigger_file = self.file,
                trigger_pid = pid,
                pts,
                partition = target.partition_id,
                "implicit boundary"
            );
        }
        Ok(())
    }
}

/// Runs the ingest worker for one file.
pub fn run(file: usize, scan: &FileScan, topo: &Topology, cfg: &Config, shutdown: &AtomicBool) -> Result<IngestReport> {
    IngestWorker::new(file, scan, topo, cfg).run(shutdown)
}
