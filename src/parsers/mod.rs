//! Stream access point classifiers for elementary stream payloads
//!
//! Each codec family has its own rules; unsupported stream types report
//! [`SapType::NotSupported`] and undecodable payloads [`SapType::Error`].

mod audio;
mod utils;
mod video;

pub use audio::{aac_adts_sap, aac_latm_sap, ac3_sap};
pub use video::{avc_sap, hevc_sap, mpeg2_sap};

use crate::constants::*;
use crate::types::SapType;

/// SAP type of the access unit starting a PES payload
pub fn classify_sap(stream_type: u8, data: &[u8]) -> SapType {
    match stream_type {
        STREAM_TYPE_AVC => avc_sap(data),
        STREAM_TYPE_HEVC => hevc_sap(data),
        STREAM_TYPE_MPEG1_VIDEO | STREAM_TYPE_MPEG2_VIDEO => mpeg2_sap(data),
        STREAM_TYPE_AAC_ADTS => aac_adts_sap(data),
        STREAM_TYPE_AAC_LATM => aac_latm_sap(data),
        STREAM_TYPE_AC3 | STREAM_TYPE_EAC3 => ac3_sap(data),
        _ => SapType::NotSupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp2_audio_is_not_supported() {
        assert_eq!(classify_sap(STREAM_TYPE_MPEG2_AUDIO, &[0xFF, 0xFD]), SapType::NotSupported);
    }

    #[test]
    fn dispatches_by_stream_type() {
        assert_eq!(classify_sap(STREAM_TYPE_AC3, &[0x0B, 0x77]), SapType::Type(1));
        assert_eq!(classify_sap(STREAM_TYPE_AVC, &[0x0B, 0x77]), SapType::Error);
    }
}
