//! In-band EBP structure carried in adaptation-field private data.

use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;
use tracing::warn;

use crate::constants::{
    EBP_DATA_FIELD_TAG, EBP_FIRST_EXT_PARTITION, EBP_MAX_PARTITION_ID, EBP_PARTITION_FRAGMENT,
    EBP_PARTITION_SEGMENT,
};
use crate::psi::descriptors;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EbpStructure {
    pub fragment: bool,
    pub segment: bool,
    pub sap_flag: bool,
    pub sap_type: u8,
    pub concealment: bool,
    pub grouping: Vec<u8>,
    /// NTP 64-bit timestamp.
    pub acquisition_time: Option<u64>,
    /// Raw ext_partitions byte; bit 1 is partition 3.
    pub ext_partitions: u8,
}

impl EbpStructure {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut br = BitReader::endian(data, BigEndian);
        let mut ebp = EbpStructure {
            fragment: br.read_bit()?,
            segment: br.read_bit()?,
            sap_flag: br.read_bit()?,
            ..Default::default()
        };
        let grouping_flag = br.read_bit()?;
        let time_flag = br.read_bit()?;
        ebp.concealment = br.read_bit()?;
        br.skip(1)?;
        let extension_flag = br.read_bit()?;

        let mut ext_partition_flag = false;
        if extension_flag {
            ext_partition_flag = br.read_bit()?;
            br.skip(7)?;
        }
        if ebp.sap_flag {
            ebp.sap_type = br.read::<3, u8>()?;
            br.skip(5)?;
        }
        if grouping_flag {
            loop {
                let more = br.read_bit()?;
                ebp.grouping.push(br.read::<7, u8>()?);
                if !more {
                    break;
                }
            }
        }
        if time_flag {
            ebp.acquisition_time = Some(br.read::<64, u64>()?);
        }
        if ext_partition_flag {
            ebp.ext_partitions = br.read::<8, u8>()?;
        }
        Ok(ebp)
    }

    /// Whether this structure marks a boundary on `partition_id`.
    pub fn is_partition(&self, partition_id: u8) -> bool {
        match partition_id {
            EBP_PARTITION_FRAGMENT => self.fragment,
            EBP_PARTITION_SEGMENT => self.segment,
            EBP_FIRST_EXT_PARTITION..=EBP_MAX_PARTITION_ID => {
                ((self.ext_partitions >> 1) >> (partition_id - EBP_FIRST_EXT_PARTITION)) & 1 != 0
            }
            _ => false,
        }
    }

    /// Acquisition time as (seconds, fraction of a second).
    pub fn acquisition_secs(&self) -> Option<(u32, f64)> {
        self.acquisition_time.map(|ntp| {
            let secs = (ntp >> 32) as u32;
            let frac = (ntp & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
            (secs, frac)
        })
    }

    /// Folds a later sighting into a representative sample.
    pub fn merge(&mut self, other: &EbpStructure) {
        self.fragment |= other.fragment;
        self.segment |= other.segment;
        self.ext_partitions |= other.ext_partitions;
    }
}

/// Finds the EBP data field among the private-data entries of a packet.
pub fn find_in_private_data(data: &[u8]) -> Option<EbpStructure> {
    let (_, body) = descriptors::iter(data).find(|(tag, _)| *tag == EBP_DATA_FIELD_TAG)?;
    match EbpStructure::parse(body) {
        Ok(ebp) => Some(ebp),
        Err(e) => {
            warn!("malformed EBP structure ignored: {e}");
            None
        }
    }
}
