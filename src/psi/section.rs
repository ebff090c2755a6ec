// psi/section.rs
//! Generic PSI section reader with CRC-32 (MPEG-2) validation, plus a
//! per-PID assembler for sections that span several TS packets.

use crc::{Crc, CRC_32_MPEG_2};

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

pub fn crc32(data: &[u8]) -> u32 {
    CRC_MPEG.checksum(data)
}

/// Locates the first section in a PUSI payload and checks its CRC.
/// Returns the section bytes from table_id up to and including the CRC.
pub fn section_bytes(payload: &[u8]) -> anyhow::Result<&[u8]> {
    if payload.is_empty() { anyhow::bail!("payload empty") }
    let start = 1 + payload[0] as usize;
    if payload.len() < start + 3 { anyhow::bail!("short section") }

    let sec_len = ((payload[start+1] & 0x0F) as usize) << 8 | payload[start+2] as usize;
    if sec_len < 4 { anyhow::bail!("invalid section_length") }
    let end = start + 3 + sec_len;
    if end > payload.len() { anyhow::bail!("truncated section") }

    let crc_calc = crc32(&payload[start..end-4]);
    let crc_pkt  = u32::from_be_bytes(payload[end-4..end].try_into()?);
    if crc_calc != crc_pkt {
        anyhow::bail!("CRC-32 mismatch");
    }
    Ok(&payload[start..end])
}

/// Long-form section header view returned by [`SectionReader::new`].
pub struct SectionReader<'a> {
    pub table_id:      u8,
    pub version:       u8,
    pub current_next:  bool,
    pub section_number:u8,
    pub last_section:  u8,
    pub program_number:u16,
    pub body:          &'a [u8],   // bytes between fixed header & CRC
}

impl<'a> SectionReader<'a> {
    /// Validates pointer, length and CRC-32.
    pub fn new(payload: &'a [u8]) -> anyhow::Result<Self> {
        let sec = section_bytes(payload)?;
        if sec.len() < 12 { anyhow::bail!("short long-form section") }

        Ok(Self {
            table_id:      sec[0],
            version:       (sec[5] & 0x3E) >> 1,
            current_next:  sec[5] & 0x01 != 0,
            section_number:sec[6],
            last_section:  sec[7],
            program_number: u16::from_be_bytes([sec[3], sec[4]]),
            body:          &sec[8 .. sec.len()-4],
        })
    }
}

/// Collects PSI payload from PUSI to section end across packets.
///
/// The buffered bytes keep the pointer field so the result can be fed
/// straight into [`SectionReader::new`] or [`section_bytes`].
#[derive(Default)]
pub struct SectionAssembler {
    buf: Vec<u8>,
    active: bool,
}

impl SectionAssembler {
    /// Feeds one packet payload; returns the complete payload once the
    /// section announced at the last PUSI is fully buffered.
    pub fn push(&mut self, pusi: bool, payload: &[u8]) -> Option<Vec<u8>> {
        if pusi {
            self.buf.clear();
            self.active = true;
        } else if !self.active {
            return None;
        }
        self.buf.extend_from_slice(payload);

        let start = 1 + *self.buf.first()? as usize;
        if self.buf.len() < start + 3 {
            return None;
        }
        let sec_len = ((self.buf[start+1] & 0x0F) as usize) << 8 | self.buf[start+2] as usize;
        let end = start + 3 + sec_len;
        if self.buf.len() >= end {
            self.active = false;
            return Some(std::mem::take(&mut self.buf));
        }
        None
    }
}
