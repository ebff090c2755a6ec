//! SCTE-35 splice_info_section decoding (splice_insert only).

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::constants::{PTS_MASK, TABLE_ID_SCTE35};
use crate::psi::section::section_bytes;

const SPLICE_NULL: u8 = 0x00;
const SPLICE_INSERT: u8 = 0x05;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInsert {
    pub event_id:         u32,
    pub cancel:           bool,
    pub out_of_network:   bool,
    pub program_splice:   bool,
    pub splice_immediate: bool,
    /// splice_time() PTS before pts_adjustment is applied.
    pub pts_time:         Option<u64>,
    pub break_duration:   Option<u64>,
    pub unique_program_id:u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceCommand {
    Null,
    Insert(SpliceInsert),
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceInfoSection {
    pub pts_adjustment: u64,
    pub command:        SpliceCommand,
}

impl SpliceInfoSection {
    /// Adjusted splice PTS of a scheduled, program-wide splice_insert.
    pub fn scheduled_insert(&self) -> Option<(&SpliceInsert, u64)> {
        let SpliceCommand::Insert(ins) = &self.command else { return None };
        if ins.cancel || ins.splice_immediate || !ins.program_splice {
            return None;
        }
        let pts = ins.pts_time?;
        Some((ins, (pts + self.pts_adjustment) & PTS_MASK))
    }
}

pub fn parse_splice_info(payload: &[u8]) -> anyhow::Result<SpliceInfoSection> {
    let sec = section_bytes(payload)?;
    if sec[0] != TABLE_ID_SCTE35 { anyhow::bail!("not a splice_info_section"); }
    if sec.len() < 18 { anyhow::bail!("short splice_info_section"); }

    let mut br = BitReader::endian(&sec[3..sec.len() - 4], BigEndian);
    br.skip(8)?;                                  // protocol_version
    if br.read_bit()? { anyhow::bail!("encrypted splice_info_section"); }
    br.skip(6)?;                                  // encryption_algorithm
    let pts_adjustment = br.read::<33, u64>()?;
    br.skip(8 + 12)?;                             // cw_index, tier
    let _command_length = br.read::<12, u16>()?;  // 0xFFF in legacy sections
    let command_type = br.read::<8, u8>()?;

    let command = match command_type {
        SPLICE_NULL => SpliceCommand::Null,
        SPLICE_INSERT => SpliceCommand::Insert(parse_splice_insert(&mut br)?),
        other => SpliceCommand::Other(other),
    };
    Ok(SpliceInfoSection { pts_adjustment, command })
}

fn parse_splice_insert<R: std::io::Read>(br: &mut BitReader<R, BigEndian>) -> anyhow::Result<SpliceInsert> {
    let mut ins = SpliceInsert {
        event_id: br.read::<32, u32>()?,
        cancel: br.read_bit()?,
        out_of_network: false,
        program_splice: false,
        splice_immediate: false,
        pts_time: None,
        break_duration: None,
        unique_program_id: 0,
    };
    br.skip(7)?;
    if ins.cancel {
        return Ok(ins);
    }

    ins.out_of_network = br.read_bit()?;
    ins.program_splice = br.read_bit()?;
    let duration_flag = br.read_bit()?;
    ins.splice_immediate = br.read_bit()?;
    br.skip(4)?;

    if ins.program_splice && !ins.splice_immediate {
        ins.pts_time = splice_time(br)?;
    }
    if !ins.program_splice {
        let component_count = br.read::<8, u8>()?;
        for _ in 0..component_count {
            br.skip(8)?;                          // component_tag
            if !ins.splice_immediate {
                splice_time(br)?;
            }
        }
    }
    if duration_flag {
        br.skip(1 + 6)?;                          // auto_return, reserved
        ins.break_duration = Some(br.read::<33, u64>()?);
    }
    ins.unique_program_id = br.read::<16, u16>()?;
    Ok(ins)
}

fn splice_time<R: std::io::Read>(br: &mut BitReader<R, BigEndian>) -> anyhow::Result<Option<u64>> {
    if br.read_bit()? {
        br.skip(6)?;
        Ok(Some(br.read::<33, u64>()?))
    } else {
        br.skip(7)?;
        Ok(None)
    }
}
