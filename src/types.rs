use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::constants::{EBP_NUM_PARTITIONS, is_audio_stream, is_video_stream};
use crate::ebp::EbpStructure;
use crate::fifo::Fifo;
use crate::psi::EbpDescriptor;

/// Stream access point classification of a PES unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SapType {
    Type(u8),
    NotSupported,
    Error,
}

impl std::fmt::Display for SapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SapType::Type(t) => write!(f, "{t}"),
            SapType::NotSupported => f.write_str("not supported"),
            SapType::Error => f.write_str("error"),
        }
    }
}

/// How a stream is matched across files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum IdentityKey {
    Video,
    Language(String),
    Pid(u16),
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKey::Video => f.write_str("video"),
            IdentityKey::Language(l) => write!(f, "lang {l}"),
            IdentityKey::Pid(p) => write!(f, "PID {p}"),
        }
    }
}

/// Canonical cross-file stream identity. Slot 0 is always video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSlot {
    pub index: usize,
    pub is_video: bool,
    pub key: IdentityKey,
}

/// Per-PID facts gathered by the pre-read pass.
#[derive(Debug, Clone)]
pub struct EsEntry {
    pub pid: u16,
    pub stream_type: u8,
    /// Sorted languages, component names and AC-3 language, `,`-separated.
    pub language_key: String,
    pub ebp_descriptor: Option<Arc<EbpDescriptor>>,
    /// Representative in-band EBP, only for PIDs without a descriptor.
    pub in_band_ebp: Option<EbpStructure>,
}

impl EsEntry {
    pub fn is_video(&self) -> bool {
        is_video_stream(self.stream_type)
    }

    pub fn is_audio(&self) -> bool {
        is_audio_stream(self.stream_type)
    }
}

/// Result of pre-reading one input file.
#[derive(Debug, Clone)]
pub struct FileScan {
    pub path: PathBuf,
    pub program_number: u16,
    pub pmt_pid: u16,
    pub streams: Vec<EsEntry>,
}

impl FileScan {
    pub fn stream(&self, pid: u16) -> Option<&EsEntry> {
        self.streams.iter().find(|s| s.pid == pid)
    }

    pub fn video(&self) -> Option<&EsEntry> {
        self.streams.iter().find(|s| s.is_video())
    }
}

/// Boundary membership of one partition for a (file, slot) stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionBoundary {
    pub is_boundary: bool,
    pub is_implicit: bool,
    pub implicit_pid: u16,
    pub implicit_file: usize,
}

pub type BoundaryTable = [PartitionBoundary; EBP_NUM_PARTITIONS];

/// Queue payload: one boundary on one partition.
#[derive(Debug, Clone)]
pub struct BoundaryEvent {
    pub pts: u64,
    pub partition_id: u8,
    pub sap_type: SapType,
    pub ebp: Option<EbpStructure>,
    pub descriptor: Option<Arc<EbpDescriptor>>,
}

/// State for one stream slot present in one file.
#[derive(Debug)]
pub struct FileStreamInfo {
    pub pid: u16,
    pub stream_type: u8,
    pub is_video: bool,
    pub descriptor: Option<Arc<EbpDescriptor>>,
    pub boundaries: BoundaryTable,
    pub queue: Arc<Fifo<BoundaryEvent>>,
}

impl FileStreamInfo {
    /// Partitions this stream signals itself.
    pub fn explicit_partitions(&self) -> impl Iterator<Item = u8> + '_ {
        self.boundaries
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_boundary && !b.is_implicit)
            .map(|(id, _)| id as u8)
    }
}
