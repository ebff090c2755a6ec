use crate::constants::TABLE_ID_PMT;
use crate::psi::descriptors::{self, Ac3Descriptor, EbpDescriptor};
use crate::psi::section::SectionReader;

/// ─────────── PMT ───────────
#[derive(Debug, Clone)]
pub struct PmtSection {
    pub version:        u8,
    pub program_number: u16,
    pub pcr_pid:        u16,
    pub streams:        Vec<EsInfo>,
}

/// One elementary-stream loop entry with its raw descriptor bytes.
#[derive(Debug, Clone)]
pub struct EsInfo {
    pub stream_type:    u8,
    pub elementary_pid: u16,
    pub descriptors:    Vec<u8>,
}

impl EsInfo {
    pub fn ebp_descriptor(&self) -> Option<EbpDescriptor> {
        descriptors::find_ebp(&self.descriptors)
    }

    /// ISO-639 codes from every language descriptor, in signalled order.
    pub fn languages(&self) -> Vec<String> {
        descriptors::find_languages(&self.descriptors)
    }

    pub fn component_names(&self) -> Vec<String> {
        descriptors::find_component_names(&self.descriptors)
    }

    pub fn ac3(&self) -> Option<Ac3Descriptor> {
        descriptors::find_ac3(&self.descriptors)
    }
}

pub fn parse_pmt(payload:&[u8]) -> anyhow::Result<PmtSection> {
    let sec = SectionReader::new(payload)?;
    if sec.table_id != TABLE_ID_PMT { anyhow::bail!("not PMT"); }
    let b = sec.body;
    if b.len() < 4 { anyhow::bail!("short PMT body"); }

    let pcr_pid       = (((b[0] & 0x1F) as u16) << 8) | (b[1] as u16);
    let prog_info_len = (((b[2] & 0x0F) as usize) << 8) | (b[3] as usize);
    let mut idx       = 4 + prog_info_len;

    let mut streams = Vec::new();
    while idx + 5 <= b.len() {
        let stype = b[idx];
        let pid   = (((b[idx+1] & 0x1F) as u16) << 8) | (b[idx+2] as u16);
        let eslen = (((b[idx+3] & 0x0F) as usize) << 8) | (b[idx+4] as usize);
        let desc_end = idx + 5 + eslen;
        if desc_end > b.len() { anyhow::bail!("ES_info_length overruns section"); }
        streams.push(EsInfo{
            stream_type: stype,
            elementary_pid: pid,
            descriptors: b[idx+5..desc_end].to_vec(),
        });
        idx = desc_end;
    }

    Ok(PmtSection{ version:sec.version,
                   program_number:sec.program_number,
                   pcr_pid,
                   streams })
}
