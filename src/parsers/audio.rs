//! Audio sync detection. Every complete audio frame is a SAP 1.

use crate::types::SapType;

fn sync_found(found: bool) -> SapType {
    if found { SapType::Type(1) } else { SapType::Error }
}

/// ADTS syncword 0xFFF with layer 00
pub fn aac_adts_sap(data: &[u8]) -> SapType {
    sync_found(data.windows(2).any(|w| w[0] == 0xFF && (w[1] & 0xF6) == 0xF0))
}

/// LATM AudioSyncStream syncword 0x2B7 (11 bits)
pub fn aac_latm_sap(data: &[u8]) -> SapType {
    sync_found(
        data.windows(2)
            .any(|w| (((w[0] as u16) << 3) | ((w[1] as u16) >> 5)) == 0x2B7),
    )
}

/// AC-3 and E-AC-3 sync frames start with 0x0B77
pub fn ac3_sap(data: &[u8]) -> SapType {
    sync_found(data.windows(2).any(|w| w == [0x0B, 0x77]))
}
