//! Fatal error taxonomy for a validation run.
//!
//! Anything in here aborts the whole run. Per-stream mismatches are not
//! errors; they are recorded as [`crate::analysis::Mismatch`] values.

use std::path::PathBuf;

use thiserror::Error;

use crate::fifo::FifoError;

#[derive(Error, Debug)]
pub enum EbpError {
    /// Input file could not be opened or read.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read failure after the file was opened.
    #[error("read error on {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pre-read reached EOF without a usable PAT/PMT.
    #[error("no PAT/PMT found in {}", path.display())]
    MissingPsi { path: PathBuf },

    #[error("file {file}: more than one video stream found")]
    MultipleVideoStreams { file: usize },

    /// EBP descriptor declares a partition outside [0, 9].
    #[error("file {file} PID {pid}: PartitionID > 9 detected ({partition_id})")]
    PartitionOutOfRange {
        file: usize,
        pid: u16,
        partition_id: u8,
    },

    #[error("file {file}: video stream PID {pid} has no EBP descriptor and no EBP in stream")]
    VideoWithoutEbp { file: usize, pid: u16 },

    /// Audio needs to inherit from video but the file carries none.
    #[error("file {file}: audio PID {pid} has no EBP signal and no video stream to inherit from")]
    NoInheritanceSource { file: usize, pid: u16 },

    #[error("file {file}: cannot find any file with PID {pid} referenced by implicit EBP")]
    ImplicitPidNotFound { file: usize, pid: u16 },

    #[error("queue (file {file}, slot {slot}): {source}")]
    Fifo {
        file: usize,
        slot: usize,
        #[source]
        source: FifoError,
    },

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread {0} panicked")]
    WorkerPanicked(String),

    #[error("no input files")]
    NoInputs,
}

pub type Result<T> = std::result::Result<T, EbpError>;
