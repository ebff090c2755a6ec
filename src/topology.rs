//! Per (file, slot) boundary tables and the queues that carry their events.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::constants::{EBP_MAX_PARTITION_ID, EBP_NUM_PARTITIONS};
use crate::error::{EbpError, Result};
use crate::fifo::Fifo;
use crate::identity::SlotPlan;
use crate::types::{BoundaryEvent, BoundaryTable, EsEntry, FileScan, FileStreamInfo, StreamSlot};

/// A partition of another stream that is driven by this PID's boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplicitTarget {
    pub file: usize,
    pub slot: usize,
    pub partition_id: u8,
}

#[derive(Debug)]
pub struct Topology {
    pub slots: Vec<StreamSlot>,
    pub num_files: usize,
    streams: BTreeMap<(usize, usize), FileStreamInfo>,
    triggers: HashMap<(usize, u16), Vec<ImplicitTarget>>,
}

impl Topology {
    /// `None` when the slot's stream does not exist in that file.
    pub fn get(&self, file: usize, slot: usize) -> Option<&FileStreamInfo> {
        self.streams.get(&(file, slot))
    }

    /// Slots present in `file`, in slot order.
    pub fn file_streams(&self, file: usize) -> impl Iterator<Item = (usize, &FileStreamInfo)> {
        self.streams
            .range((file, 0)..(file + 1, 0))
            .map(|(&(_, slot), info)| (slot, info))
    }

    /// One entry per file for the given slot.
    pub fn slot_column(&self, slot: usize) -> Vec<Option<&FileStreamInfo>> {
        (0..self.num_files).map(|f| self.get(f, slot)).collect()
    }

    pub fn implicit_targets(&self, file: usize, pid: u16) -> &[ImplicitTarget] {
        self.triggers.get(&(file, pid)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// PIDs the ingest worker of `file` has to demultiplex.
    pub fn monitored_pids(&self, file: usize) -> BTreeSet<u16> {
        let own = self.file_streams(file).map(|(_, info)| info.pid);
        let referenced = self.triggers.keys().filter(|(f, _)| *f == file).map(|&(_, pid)| pid);
        own.chain(referenced).collect()
    }

    /// Queues `file` pushes into: its own plus implicit targets elsewhere.
    pub fn producer_queues(&self, file: usize) -> Vec<Arc<Fifo<BoundaryEvent>>> {
        let mut keys: BTreeSet<(usize, usize)> =
            self.file_streams(file).map(|(slot, _)| (file, slot)).collect();
        for ((f, _), targets) in &self.triggers {
            if *f == file {
                keys.extend(targets.iter().map(|t| (t.file, t.slot)));
            }
        }
        keys.into_iter()
            .filter_map(|k| self.streams.get(&k).map(|info| Arc::clone(&info.queue)))
            .collect()
    }

    pub fn all_queues(&self) -> impl Iterator<Item = ((usize, usize), &Arc<Fifo<BoundaryEvent>>)> {
        self.streams.iter().map(|(&k, info)| (k, &info.queue))
    }

    pub fn abort_all(&self) {
        for (_, q) in self.all_queues() {
            q.abort();
        }
    }
}

/// Boundary table of one stream, before implicit file resolution.
fn boundary_table(files: &[FileScan], file: usize, es: &EsEntry) -> Result<BoundaryTable> {
    let mut table = BoundaryTable::default();

    if let Some(desc) = &es.ebp_descriptor {
        for part in &desc.partitions {
            if part.partition_id > EBP_MAX_PARTITION_ID {
                return Err(EbpError::PartitionOutOfRange {
                    file,
                    pid: es.pid,
                    partition_id: part.partition_id,
                });
            }
            let entry = &mut table[part.partition_id as usize];
            entry.is_boundary = part.boundary;
            entry.is_implicit = !part.explicit;
            if let Some(pid) = part.ebp_pid.filter(|_| !part.explicit) {
                entry.implicit_pid = pid;
                entry.implicit_file = implicit_file(files, file, pid)?;
            }
        }
        return Ok(table);
    }

    if let Some(ebp) = &es.in_band_ebp {
        for id in 1..=EBP_MAX_PARTITION_ID {
            table[id as usize].is_boundary = ebp.is_partition(id);
        }
        return Ok(table);
    }

    if es.is_video() {
        return Err(EbpError::VideoWithoutEbp { file, pid: es.pid });
    }
    let video = files[file]
        .video()
        .ok_or(EbpError::NoInheritanceSource { file, pid: es.pid })?;
    let mut inherited = boundary_table(files, file, video)?;
    for entry in inherited.iter_mut().filter(|e| e.is_boundary) {
        entry.is_implicit = true;
        entry.implicit_pid = video.pid;
        entry.implicit_file = file;
    }
    info!(file, pid = es.pid, video_pid = video.pid, "audio inherits video boundaries implicitly");
    Ok(inherited)
}

/// Owning file of an implicitly referenced PID: same file first, then the others.
fn implicit_file(files: &[FileScan], file: usize, pid: u16) -> Result<usize> {
    if files[file].stream(pid).is_some() {
        return Ok(file);
    }
    files
        .iter()
        .position(|f| f.stream(pid).is_some())
        .ok_or(EbpError::ImplicitPidNotFound { file, pid })
}

pub fn build(files: &[FileScan], plan: &SlotPlan, fifo_capacity: usize) -> Result<Topology> {
    let mut tables = BTreeMap::new();
    for (f, scan) in files.iter().enumerate() {
        for slot in &plan.slots {
            let Some(es) = plan.stream_for(scan, slot) else {
                debug!(file = f, slot = slot.index, "stream absent in file");
                continue;
            };
            tables.insert((f, slot.index), (es, boundary_table(files, f, es)?));
        }
    }

    let mut triggers: HashMap<(usize, u16), Vec<ImplicitTarget>> = HashMap::new();
    for (&(f, s), (_, table)) in &tables {
        for (id, entry) in table.iter().enumerate() {
            if entry.is_boundary && entry.is_implicit {
                triggers
                    .entry((entry.implicit_file, entry.implicit_pid))
                    .or_default()
                    .push(ImplicitTarget { file: f, slot: s, partition_id: id as u8 });
            }
        }
    }

    let mut streams = BTreeMap::new();
    for ((f, s), (es, table)) in tables {
        let producers: BTreeSet<usize> = std::iter::once(f)
            .chain(table.iter().filter(|e| e.is_boundary && e.is_implicit).map(|e| e.implicit_file))
            .collect();
        info!(
            file = f,
            slot = s,
            pid = es.pid,
            partitions = %describe(&table),
            "boundary topology"
        );
        streams.insert(
            (f, s),
            FileStreamInfo {
                pid: es.pid,
                stream_type: es.stream_type,
                is_video: es.is_video(),
                descriptor: es.ebp_descriptor.clone(),
                boundaries: table,
                queue: Arc::new(Fifo::new(fifo_capacity, producers)),
            },
        );
    }

    Ok(Topology { slots: plan.slots.clone(), num_files: files.len(), streams, triggers })
}

/// Compact rendering such as `1:E 2:I(481@0)`.
pub fn describe(table: &BoundaryTable) -> String {
    let parts: Vec<String> = (0..EBP_NUM_PARTITIONS)
        .filter(|&i| table[i].is_boundary)
        .map(|i| {
            let b = &table[i];
            if b.is_implicit {
                format!("{i}:I({}@{})", b.implicit_pid, b.implicit_file)
            } else {
                format!("{i}:E")
            }
        })
        .collect();
    if parts.is_empty() { "-".to_string() } else { parts.join(" ") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebp::EbpStructure;
    use crate::identity::{self, tests::{es, file}};
    use crate::psi::{EbpDescriptor, EbpPartition};

    fn explicit(id: u8) -> EbpPartition {
        EbpPartition {
            partition_id: id,
            explicit: true,
            boundary: true,
            ebp_distance: 1,
            sap_type_max: 2,
            acquisition_time_flag: false,
            ebp_pid: None,
            representation_id: None,
        }
    }

    fn with_descriptor(mut e: EsEntry, partitions: Vec<EbpPartition>) -> EsEntry {
        e.ebp_descriptor = Some(Arc::new(EbpDescriptor {
            ticks_per_second: 1,
            distance_width: 1,
            partitions,
        }));
        e
    }

    fn in_band(mut e: EsEntry) -> EsEntry {
        e.in_band_ebp = Some(EbpStructure { fragment: true, segment: true, ..Default::default() });
        e
    }

    #[test]
    fn audio_inherits_video_implicitly() {
        let f = file(vec![in_band(es(0x100, 0x1B, "")), es(0x101, 0x0F, "eng")]);
        let files = [f];
        let plan = identity::resolve(&files).unwrap();
        let topo = build(&files, &plan, 8).unwrap();

        let audio = topo.get(0, 1).unwrap();
        for id in [1, 2] {
            let b = audio.boundaries[id];
            assert!(b.is_boundary && b.is_implicit);
            assert_eq!((b.implicit_pid, b.implicit_file), (0x100, 0));
        }
        assert!(!audio.boundaries[3].is_boundary);
        assert_eq!(topo.implicit_targets(0, 0x100).len(), 2);
        assert_eq!(topo.producer_queues(0).len(), 2);
    }

    #[test]
    fn partition_above_nine_is_fatal() {
        let f = file(vec![with_descriptor(es(0x100, 0x1B, ""), vec![explicit(10)])]);
        let files = [f];
        let plan = identity::resolve(&files).unwrap();
        let err = build(&files, &plan, 8).unwrap_err();
        assert!(err.to_string().contains("PartitionID > 9"));
    }

    #[test]
    fn video_without_ebp_is_fatal() {
        let files = [file(vec![es(0x100, 0x1B, "")])];
        let plan = identity::resolve(&files).unwrap();
        assert!(matches!(build(&files, &plan, 8), Err(EbpError::VideoWithoutEbp { pid: 0x100, .. })));
    }

    #[test]
    fn implicit_pid_resolves_to_other_file() {
        let mut implicit = explicit(2);
        implicit.explicit = false;
        implicit.ebp_pid = Some(0x300);
        let a = file(vec![
            with_descriptor(es(0x100, 0x1B, ""), vec![explicit(1)]),
            with_descriptor(es(0x101, 0x0F, "eng"), vec![implicit]),
        ]);
        let b = file(vec![in_band(es(0x300, 0x1B, ""))]);
        let files = [a, b];
        let plan = identity::resolve(&files).unwrap();
        let topo = build(&files, &plan, 8).unwrap();

        let audio = topo.get(0, 1).unwrap();
        assert_eq!(audio.boundaries[2].implicit_file, 1);
        assert!(topo.get(1, 1).is_none());
        assert!(topo.monitored_pids(1).contains(&0x300));
        assert_eq!(topo.implicit_targets(1, 0x300), &[ImplicitTarget { file: 0, slot: 1, partition_id: 2 }]);
        assert_eq!(describe(&audio.boundaries), "2:I(768@1)");
    }

    #[test]
    fn unknown_implicit_pid_is_fatal() {
        let mut implicit = explicit(1);
        implicit.explicit = false;
        implicit.ebp_pid = Some(0x777);
        let files = [file(vec![with_descriptor(es(0x100, 0x1B, ""), vec![implicit])])];
        let plan = identity::resolve(&files).unwrap();
        assert!(matches!(build(&files, &plan, 8), Err(EbpError::ImplicitPidNotFound { pid: 0x777, .. })));
    }
}
