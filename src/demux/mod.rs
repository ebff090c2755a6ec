//! Transport-stream demultiplexing: packet view, PES reassembly and a
//! buffered packet reader over input files.

pub mod packet;
pub mod pes;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use thiserror::Error;

use crate::constants::{READ_CHUNK_PACKETS, TS_PACKET_SIZE};

pub use packet::{AdaptationField, TsPacket};
pub use pes::{PesAssembler, PesUnit};

/// Per-packet problems; callers log these and skip the packet.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("sync byte lost (found 0x{0:02X})")]
    SyncLost(u8),

    #[error("short packet ({0} bytes)")]
    ShortPacket(usize),

    #[error("PID {pid}: adaptation field overruns packet (length {len})")]
    AdaptationOverrun { pid: u16, len: usize },
}

/// Reads whole 188-byte packets from a file in large chunks.
pub struct PacketReader {
    inner: BufReader<File>,
    buf: Vec<u8>,
    filled: usize,
    pos: usize,
}

impl PacketReader {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            inner: BufReader::with_capacity(TS_PACKET_SIZE * READ_CHUNK_PACKETS, file),
            buf: vec![0u8; TS_PACKET_SIZE * READ_CHUNK_PACKETS],
            filled: 0,
            pos: 0,
        })
    }

    /// Next raw packet, `None` at EOF. A trailing partial packet is dropped.
    pub fn next_packet(&mut self) -> std::io::Result<Option<&[u8]>> {
        if self.pos + TS_PACKET_SIZE > self.filled {
            let tail = self.filled - self.pos;
            self.buf.copy_within(self.pos..self.filled, 0);
            self.filled = tail;
            self.pos = 0;
            while self.filled < self.buf.len() {
                let n = self.inner.read(&mut self.buf[self.filled..])?;
                if n == 0 {
                    break;
                }
                self.filled += n;
            }
            if self.filled < TS_PACKET_SIZE {
                return Ok(None);
            }
        }
        let start = self.pos;
        self.pos += TS_PACKET_SIZE;
        Ok(Some(&self.buf[start..start + TS_PACKET_SIZE]))
    }
}
