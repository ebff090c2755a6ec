//! Zero-copy view over a single 188-byte transport packet.

use crate::constants::{TS_PACKET_SIZE, TS_SYNC_BYTE};
use crate::demux::DemuxError;

#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptationField<'a> {
    pub discontinuity: bool,
    pub random_access: bool,
    pub pcr: Option<u64>,
    pub private_data: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy)]
pub struct TsPacket<'a> {
    pub pid: u16,
    pub pusi: bool,
    pub transport_error: bool,
    pub continuity: u8,
    pub adaptation: Option<AdaptationField<'a>>,
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    pub fn parse(chunk: &'a [u8]) -> Result<Self, DemuxError> {
        if chunk.len() < TS_PACKET_SIZE {
            return Err(DemuxError::ShortPacket(chunk.len()));
        }
        if chunk[0] != TS_SYNC_BYTE {
            return Err(DemuxError::SyncLost(chunk[0]));
        }

        let pid = (((chunk[1] & 0x1F) as u16) << 8) | (chunk[2] as u16);
        let pusi = chunk[1] & 0x40 != 0;
        let transport_error = chunk[1] & 0x80 != 0;
        let afc = (chunk[3] & 0x30) >> 4;
        let continuity = chunk[3] & 0x0F;

        let mut payload_offset = 4usize;
        let mut adaptation = None;
        if afc & 0x02 != 0 {
            let af_len = chunk[4] as usize;
            payload_offset += 1 + af_len;
            if payload_offset > TS_PACKET_SIZE {
                return Err(DemuxError::AdaptationOverrun { pid, len: af_len });
            }
            adaptation = Some(parse_adaptation(&chunk[5..5 + af_len], pid)?);
        }

        let payload: &'a [u8] = if afc & 0x01 != 0 {
            &chunk[payload_offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(Self { pid, pusi, transport_error, continuity, adaptation, payload })
    }

    pub fn private_data(&self) -> Option<&'a [u8]> {
        self.adaptation.and_then(|af| af.private_data)
    }
}

fn parse_adaptation(af: &[u8], pid: u16) -> Result<AdaptationField<'_>, DemuxError> {
    let mut out = AdaptationField::default();
    let Some(&flags) = af.first() else { return Ok(out) };
    out.discontinuity = flags & 0x80 != 0;
    out.random_access = flags & 0x40 != 0;

    let overrun = || DemuxError::AdaptationOverrun { pid, len: af.len() };
    let mut idx = 1usize;
    if flags & 0x10 != 0 {
        let p = af.get(idx..idx + 6).ok_or_else(overrun)?;
        let base = ((p[0] as u64) << 25)
                | ((p[1] as u64) << 17)
                | ((p[2] as u64) << 9)
                | ((p[3] as u64) << 1)
                | ((p[4] as u64) >> 7);
        out.pcr = Some(base);
        idx += 6;
    }
    if flags & 0x08 != 0 {
        idx += 6; // OPCR
    }
    if flags & 0x04 != 0 {
        idx += 1; // splice_countdown
    }
    if flags & 0x02 != 0 {
        let len = *af.get(idx).ok_or_else(overrun)? as usize;
        out.private_data = Some(af.get(idx + 1..idx + 1 + len).ok_or_else(overrun)?);
    }
    Ok(out)
}
