//! SAP classification for video elementary streams

use bitstream_io::{BigEndian, BitReader};
use crate::types::SapType;
use super::utils::{remove_emulation_prevention, start_codes, ue};

/// H.264: IDR is SAP 1, an I slice without IDR is SAP 3, anything else 0.
pub fn avc_sap(data: &[u8]) -> SapType {
    for i in start_codes(data) {
        match data[i] & 0x1F {
            5 => return SapType::Type(1),
            1 => {
                return match avc_slice_type(&data[i + 1..]) {
                    Some(2 | 4 | 7 | 9) => SapType::Type(3),
                    Some(_) => SapType::Type(0),
                    None => SapType::Error,
                };
            }
            _ => {}
        }
    }
    SapType::Error
}

fn avc_slice_type(raw: &[u8]) -> Option<u32> {
    let head = &raw[..raw.len().min(16)];
    let rbsp = remove_emulation_prevention(head);
    let mut br = BitReader::endian(&rbsp[..], BigEndian);
    ue(&mut br)?; // first_mb_in_slice
    ue(&mut br)
}

/// HEVC: classified from the first VCL NAL unit type.
pub fn hevc_sap(data: &[u8]) -> SapType {
    for i in start_codes(data) {
        let nal_type = (data[i] >> 1) & 0x3F;
        match nal_type {
            20 => return SapType::Type(1),         // IDR_N_LP
            19 => return SapType::Type(2),         // IDR_W_RADL
            16..=18 | 21 => return SapType::Type(3), // BLA_*, CRA
            0..=9 => return SapType::Type(0),
            _ => {}
        }
    }
    SapType::Error
}

/// MPEG-1/2 video: closed GOP is SAP 1, open GOP or bare I picture SAP 3.
pub fn mpeg2_sap(data: &[u8]) -> SapType {
    let mut closed_gop = None;
    for i in start_codes(data) {
        match data[i] {
            0xB8 => {
                // time_code:25 closed_gop:1 broken_link:1
                let Some(&b) = data.get(i + 4) else { return SapType::Error };
                closed_gop = Some(b & 0x40 != 0);
            }
            0x00 => {
                let Some(&b) = data.get(i + 2) else { return SapType::Error };
                let coding_type = (b >> 3) & 0x07;
                return match (coding_type, closed_gop) {
                    (1, Some(true)) => SapType::Type(1),
                    (1, _) => SapType::Type(3),
                    _ => SapType::Type(0),
                };
            }
            _ => {}
        }
    }
    SapType::Error
}
