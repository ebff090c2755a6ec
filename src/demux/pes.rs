//! PES reassembly for the PIDs the validator monitors.

use bytes::{Bytes, BytesMut};

use crate::constants::{PES_START_CODE, PTS_MASK};
use crate::demux::packet::TsPacket;

/// A completed PES unit.
#[derive(Debug, Clone)]
pub struct PesUnit {
    pub pid: u16,
    pub pts: Option<u64>,
    /// Elementary-stream bytes following the PES header.
    pub es: Bytes,
    /// Transport private data of the unit's first packet.
    pub private_data: Option<Vec<u8>>,
    pub random_access: bool,
}

/// Accumulates one PID's payload from PUSI to the next PUSI.
pub struct PesAssembler {
    pid: u16,
    buf: BytesMut,
    private_data: Option<Vec<u8>>,
    random_access: bool,
    started: bool,
}

impl PesAssembler {
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            buf: BytesMut::with_capacity(64 * 1024),
            private_data: None,
            random_access: false,
            started: false,
        }
    }

    /// Feeds a packet of this PID; returns the previous unit when a new one starts.
    pub fn push(&mut self, pkt: &TsPacket<'_>) -> Option<PesUnit> {
        let done = if pkt.pusi { self.finish() } else { None };
        if pkt.pusi {
            self.started = true;
            self.private_data = pkt.private_data().map(<[u8]>::to_vec);
            self.random_access = pkt.adaptation.is_some_and(|af| af.random_access);
        }
        if self.started {
            self.buf.extend_from_slice(pkt.payload);
        }
        done
    }

    /// Completes the pending unit at end of input.
    pub fn flush(&mut self) -> Option<PesUnit> {
        self.finish()
    }

    fn finish(&mut self) -> Option<PesUnit> {
        if !self.started {
            return None;
        }
        self.started = false;
        let raw = self.buf.split().freeze();
        let (pts, es) = parse_pes_header(&raw)?;
        Some(PesUnit {
            pid: self.pid,
            pts,
            es: raw.slice(es..),
            private_data: self.private_data.take(),
            random_access: self.random_access,
        })
    }
}

/// Returns the PTS (if any) and the offset of the ES payload.
fn parse_pes_header(data: &[u8]) -> Option<(Option<u64>, usize)> {
    if data.len() < 9 || data[..3] != PES_START_CODE {
        return None;
    }
    let stream_id = data[3];
    // program_stream_map, padding, private_stream_2, ECM/EMM, directory, DSMCC, H.222.1 E
    if matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xFF | 0xF2 | 0xF8) {
        return Some((None, 6));
    }
    let header_len = data[8] as usize;
    let es = 9 + header_len;
    if es > data.len() {
        return None;
    }
    let pts = if data[7] & 0x80 != 0 && header_len >= 5 {
        Some(decode_pts(&data[9..14]))
    } else {
        None
    };
    Some((pts, es))
}

/// PTS from the PES header at the start of a PUSI payload.
pub fn peek_pts(payload: &[u8]) -> Option<u64> {
    parse_pes_header(payload)?.0
}

pub fn decode_pts(p: &[u8]) -> u64 {
    let pts = (((p[0] as u64 >> 1) & 0x07) << 30)
        | ((p[1] as u64) << 22)
        | (((p[2] as u64) >> 1) << 15)
        | ((p[3] as u64) << 7)
        | ((p[4] as u64) >> 1);
    pts & PTS_MASK
}
