//! Elementary-stream descriptors the validator cares about.
//!
//! The EBP descriptor is decoded bit-exactly; language, component name and
//! AC-3 descriptors only contribute text to the audio identity key.

use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;
use tracing::warn;

use crate::constants::{
    AC3_DESCRIPTOR_TAG, COMPONENT_NAME_DESCRIPTOR_TAG, DVB_AC3_DESCRIPTOR_TAG,
    EBP_DESCRIPTOR_TAG, LANGUAGE_DESCRIPTOR_TAG,
};

/// Iterates `(tag, data)` pairs of a descriptor loop, stopping at the
/// first entry whose length overruns the loop.
pub fn iter(mut loop_bytes: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    std::iter::from_fn(move || {
        let (&tag, rest) = loop_bytes.split_first()?;
        let (&len, rest) = rest.split_first()?;
        if rest.len() < len as usize {
            return None;
        }
        let (data, tail) = rest.split_at(len as usize);
        loop_bytes = tail;
        Some((tag, data))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EbpPartition {
    pub partition_id: u8,
    pub explicit: bool,
    pub boundary: bool,
    /// Distance to the next boundary in `ticks_per_second` units.
    pub ebp_distance: u64,
    pub sap_type_max: u8,
    pub acquisition_time_flag: bool,
    /// Referenced PID when the partition is implicit.
    pub ebp_pid: Option<u16>,
    pub representation_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EbpDescriptor {
    pub ticks_per_second: u32,
    pub distance_width: u8,
    pub partitions: Vec<EbpPartition>,
}

impl EbpDescriptor {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut br = BitReader::endian(data, BigEndian);

        let num_partitions = br.read::<5, u8>()?;
        let timescale_flag = br.read_bit()?;
        br.skip(2)?;

        let (ticks_per_second, distance_width) = if timescale_flag {
            let tps = br.read::<21, u32>()?;
            let width_minus_1 = br.read::<3, u8>()?;
            (tps, width_minus_1 + 1)
        } else {
            (1, 1)
        };
        if ticks_per_second == 0 {
            anyhow::bail!("EBP descriptor with ticks_per_second = 0");
        }

        let mut partitions = Vec::with_capacity(num_partitions as usize);
        for _ in 0..num_partitions {
            let explicit = br.read_bit()?;
            let rep_id_flag = br.read_bit()?;
            let partition_id = br.read::<5, u8>()?;
            let boundary = br.read_bit()?;

            let mut part = EbpPartition {
                partition_id,
                explicit,
                boundary,
                ebp_distance: 0,
                sap_type_max: 0,
                acquisition_time_flag: false,
                ebp_pid: None,
                representation_id: None,
            };
            if explicit {
                for _ in 0..distance_width {
                    part.ebp_distance = (part.ebp_distance << 8) | br.read::<8, u8>()? as u64;
                }
                part.sap_type_max = br.read::<3, u8>()?;
                br.skip(4)?;
                part.acquisition_time_flag = br.read_bit()?;
            } else {
                br.skip(3)?;
                part.ebp_pid = Some(br.read::<13, u16>()?);
            }
            if rep_id_flag {
                part.representation_id = Some(br.read::<64, u64>()?);
            }
            partitions.push(part);
        }

        Ok(Self { ticks_per_second, distance_width, partitions })
    }

    pub fn partition(&self, id: u8) -> Option<&EbpPartition> {
        self.partitions.iter().find(|p| p.partition_id == id)
    }
}

pub fn find_ebp(loop_bytes: &[u8]) -> Option<EbpDescriptor> {
    let (_, data) = iter(loop_bytes).find(|(tag, _)| *tag == EBP_DESCRIPTOR_TAG)?;
    match EbpDescriptor::parse(data) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("malformed EBP descriptor ignored: {e}");
            None
        }
    }
}

pub fn find_languages(loop_bytes: &[u8]) -> Vec<String> {
    iter(loop_bytes)
        .filter(|(tag, _)| *tag == LANGUAGE_DESCRIPTOR_TAG)
        .flat_map(|(_, data)| data.chunks_exact(4))
        .map(|entry| String::from_utf8_lossy(&entry[..3]).into_owned())
        .collect()
}

/// Text of every uncompressed segment of an ATSC multiple_string_structure.
pub fn find_component_names(loop_bytes: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    for (_, data) in iter(loop_bytes).filter(|(tag, _)| *tag == COMPONENT_NAME_DESCRIPTOR_TAG) {
        let Some((&number_strings, mut rest)) = data.split_first() else { continue };
        for _ in 0..number_strings {
            if rest.len() < 4 {
                break;
            }
            let number_segments = rest[3];
            rest = &rest[4..];
            let mut text = String::new();
            for _ in 0..number_segments {
                if rest.len() < 3 {
                    break;
                }
                let (compression, mode, n) = (rest[0], rest[1], rest[2] as usize);
                let Some(bytes) = rest.get(3..3 + n) else {
                    rest = &[];
                    break;
                };
                if compression == 0 && mode == 0 {
                    text.push_str(&String::from_utf8_lossy(bytes));
                }
                rest = &rest[3 + n..];
            }
            names.push(text);
        }
    }
    names
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ac3Descriptor {
    pub tag: u8,
    pub num_channels: Option<u8>,
    pub language: Option<String>,
}

pub fn find_ac3(loop_bytes: &[u8]) -> Option<Ac3Descriptor> {
    iter(loop_bytes).find_map(|(tag, data)| match tag {
        AC3_DESCRIPTOR_TAG => Some(parse_atsc_ac3(data)),
        DVB_AC3_DESCRIPTOR_TAG => Some(Ac3Descriptor { tag, num_channels: None, language: None }),
        _ => None,
    })
}

/// ATSC A/52 audio descriptor; trailing optional fields stop at the end of data.
fn parse_atsc_ac3(data: &[u8]) -> Ac3Descriptor {
    let mut out = Ac3Descriptor { tag: AC3_DESCRIPTOR_TAG, num_channels: None, language: None };
    let Some(&b2) = data.get(2) else { return out };
    let num_channels = (b2 >> 1) & 0x0F;
    out.num_channels = Some(num_channels);

    // langcod, langcod2 for 1+1, then mainid/asvcflags
    let mut idx = 4 + usize::from(num_channels == 0) + 1;
    let Some(&text_byte) = data.get(idx) else { return out };
    idx += 1 + (text_byte >> 1) as usize;
    let Some(&flags) = data.get(idx) else { return out };
    idx += 1;
    if flags & 0x80 != 0 {
        if let Some(lang) = data.get(idx..idx + 3) {
            out.language = Some(String::from_utf8_lossy(lang).into_owned());
        }
    }
    out
}
