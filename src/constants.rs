//! Constants for MPEG-TS demuxing and EBP boundary validation

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const PAT_PID: u16 = 0x0000;

/// Packets pulled from disk per read call
pub const READ_CHUNK_PACKETS: usize = 4096;

/// PES packet constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// PTS constants
pub const PTS_CLOCK_HZ: u64 = 90_000; // 90 kHz
pub const PTS_MASK: u64 = (1u64 << 33) - 1; // 33-bit PTS counter

/// PSI table ids
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_SCTE35: u8 = 0xFC;

/// Descriptor tags
pub const LANGUAGE_DESCRIPTOR_TAG: u8 = 0x0A;
pub const AC3_DESCRIPTOR_TAG: u8 = 0x81;
pub const DVB_AC3_DESCRIPTOR_TAG: u8 = 0x6A;
pub const COMPONENT_NAME_DESCRIPTOR_TAG: u8 = 0xA3;
pub const EBP_DESCRIPTOR_TAG: u8 = 0xE9;

/// Adaptation-field private data tag carrying the EBP structure
pub const EBP_DATA_FIELD_TAG: u8 = 0xA9;

/// Partition layout: fragment, segment and up to 8 extension partitions
pub const EBP_NUM_PARTITIONS: usize = 10;
pub const EBP_MAX_PARTITION_ID: u8 = 9;
pub const EBP_PARTITION_FRAGMENT: u8 = 1;
pub const EBP_PARTITION_SEGMENT: u8 = 2;
pub const EBP_FIRST_EXT_PARTITION: u8 = 3;

/// Stream types
pub const STREAM_TYPE_MPEG1_VIDEO: u8 = 0x01;
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;
pub const STREAM_TYPE_MPEG4_VIDEO: u8 = 0x10;
pub const STREAM_TYPE_AAC_LATM: u8 = 0x11;
pub const STREAM_TYPE_AVC: u8 = 0x1B;
pub const STREAM_TYPE_HEVC: u8 = 0x24;
pub const STREAM_TYPE_AC3: u8 = 0x81;
pub const STREAM_TYPE_SCTE35: u8 = 0x86;
pub const STREAM_TYPE_EAC3: u8 = 0x87;

pub fn is_video_stream(stream_type: u8) -> bool {
    matches!(
        stream_type,
        STREAM_TYPE_MPEG1_VIDEO
            | STREAM_TYPE_MPEG2_VIDEO
            | STREAM_TYPE_MPEG4_VIDEO
            | STREAM_TYPE_AVC
            | STREAM_TYPE_HEVC
    )
}

pub fn is_audio_stream(stream_type: u8) -> bool {
    matches!(
        stream_type,
        STREAM_TYPE_MPEG1_AUDIO
            | STREAM_TYPE_MPEG2_AUDIO
            | STREAM_TYPE_AAC_ADTS
            | STREAM_TYPE_AAC_LATM
            | STREAM_TYPE_AC3
            | STREAM_TYPE_EAC3
    )
}

pub fn stream_type_name(st: u8) -> &'static str {
    match st {
        STREAM_TYPE_MPEG1_VIDEO => "MPEG-1",
        STREAM_TYPE_MPEG2_VIDEO => "MPEG-2",
        STREAM_TYPE_MPEG4_VIDEO => "MPEG-4",
        STREAM_TYPE_AVC => "H.264",
        STREAM_TYPE_HEVC => "HEVC",
        STREAM_TYPE_MPEG1_AUDIO | STREAM_TYPE_MPEG2_AUDIO => "MP2",
        STREAM_TYPE_AAC_ADTS => "AAC",
        STREAM_TYPE_AAC_LATM => "AAC-LATM",
        STREAM_TYPE_AC3 => "AC-3",
        STREAM_TYPE_EAC3 => "E-AC-3",
        STREAM_TYPE_SCTE35 => "SCTE-35",
        _ => "unk",
    }
}
