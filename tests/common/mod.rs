//! Minimal transport stream writer for building test inputs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ebp_validator::psi::section::crc32;

pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x101;
pub const SCTE35_PID: u16 = 0x1F0;

/// Video access unit starting with an IDR slice.
pub const IDR: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, 0x10];
/// One ADTS frame header plus a few bytes of payload.
pub const ADTS: &[u8] = &[0xFF, 0xF1, 0x50, 0x80, 0x02, 0x1F, 0xFC, 0x21, 0x00];

pub struct EsDef {
    pub stream_type: u8,
    pub pid: u16,
    pub descriptors: Vec<u8>,
}

impl EsDef {
    pub fn new(stream_type: u8, pid: u16) -> Self {
        Self { stream_type, pid, descriptors: Vec::new() }
    }

    pub fn with(mut self, descriptor: Vec<u8>) -> Self {
        self.descriptors.extend(descriptor);
        self
    }
}

/// ISO-639 language descriptor with one entry.
pub fn language(code: &str) -> Vec<u8> {
    let mut d = vec![0x0A, 4];
    d.extend_from_slice(code.as_bytes());
    d.push(0);
    d
}

/// EBP descriptor, default timescale (1 tick/s, 1-byte distances), with the
/// given explicit boundary partitions all one second apart.
pub fn ebp_descriptor(partitions: &[u8]) -> Vec<u8> {
    let mut body = vec![((partitions.len() as u8) << 3) | 0x03];
    for &p in partitions {
        body.push(0x80 | (p << 1) | 0x01);
        body.push(1); // ebp_distance
        body.push((2 << 5) | 0x1E); // sap_type_max 2, no acquisition time
    }
    let mut d = vec![0xE9, body.len() as u8];
    d.extend(body);
    d
}

/// Transport private data carrying an EBP structure.
pub fn ebp_private(fragment: bool, segment: bool) -> Vec<u8> {
    let flags = (u8::from(fragment) << 7) | (u8::from(segment) << 6) | 0x02;
    vec![0xA9, 0x01, flags]
}

fn encode_pts(pts: u64) -> [u8; 5] {
    [
        0x21 | (((pts >> 30) & 0x07) << 1) as u8,
        (pts >> 22) as u8,
        0x01 | (((pts >> 15) & 0x7F) << 1) as u8,
        (pts >> 7) as u8,
        0x01 | ((pts & 0x7F) << 1) as u8,
    ]
}

fn long_section(table_id: u8, extension: u16, body: &[u8]) -> Vec<u8> {
    let len = (5 + body.len() + 4) as u16;
    let mut sec = vec![table_id, 0xB0 | (len >> 8) as u8, len as u8];
    sec.extend_from_slice(&extension.to_be_bytes());
    sec.extend_from_slice(&[0xC1, 0x00, 0x00]);
    sec.extend_from_slice(body);
    let crc = crc32(&sec);
    sec.extend_from_slice(&crc.to_be_bytes());
    sec
}

/// splice_info_section with a scheduled program splice_insert.
pub fn splice_insert(event_id: u32, pts: u64) -> Vec<u8> {
    let mut cmd = event_id.to_be_bytes().to_vec();
    cmd.push(0x7F);
    cmd.push(0xCF);
    cmd.push(0xFE | (pts >> 32) as u8);
    cmd.extend_from_slice(&(pts as u32).to_be_bytes());
    cmd.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);

    let mut sec = vec![0xFC, 0, 0, 0x00, 0x00, 0, 0, 0, 0, 0x00];
    let cmd_len = cmd.len() as u16;
    sec.extend_from_slice(&[0xFF, 0xF0 | (cmd_len >> 8) as u8, cmd_len as u8, 0x05]);
    sec.extend(cmd);
    sec.extend_from_slice(&[0x00, 0x00]);
    let len = (sec.len() - 3 + 4) as u16;
    sec[1] = 0x30 | (len >> 8) as u8;
    sec[2] = len as u8;
    let crc = crc32(&sec);
    sec.extend_from_slice(&crc.to_be_bytes());
    sec
}

#[derive(Default)]
pub struct TsWriter {
    out: Vec<u8>,
    cc: HashMap<u16, u8>,
}

impl TsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pat(&mut self, program: u16) -> &mut Self {
        let mut body = program.to_be_bytes().to_vec();
        body.extend_from_slice(&(0xE000 | PMT_PID).to_be_bytes());
        let sec = long_section(0x00, 1, &body);
        self.section(0, &sec)
    }

    pub fn pmt(&mut self, program: u16, streams: &[EsDef]) -> &mut Self {
        let pcr = streams.first().map_or(0x1FFF, |s| s.pid);
        let mut body = (0xE000 | pcr).to_be_bytes().to_vec();
        body.extend_from_slice(&[0xF0, 0x00]);
        for es in streams {
            body.push(es.stream_type);
            body.extend_from_slice(&(0xE000 | es.pid).to_be_bytes());
            body.extend_from_slice(&(0xF000 | es.descriptors.len() as u16).to_be_bytes());
            body.extend_from_slice(&es.descriptors);
        }
        let sec = long_section(0x02, program, &body);
        self.section(PMT_PID, &sec)
    }

    pub fn section(&mut self, pid: u16, section: &[u8]) -> &mut Self {
        let mut payload = vec![0x00];
        payload.extend_from_slice(section);
        self.packetize(pid, None, &payload);
        self
    }

    /// One PES unit; `private` lands in the first packet's adaptation field.
    pub fn pes(&mut self, pid: u16, stream_id: u8, pts: u64, es: &[u8], private: Option<&[u8]>) -> &mut Self {
        let mut pes = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80, 0x80, 0x05];
        pes.extend_from_slice(&encode_pts(pts));
        pes.extend_from_slice(es);
        self.packetize(pid, private, &pes);
        self
    }

    pub fn video(&mut self, pts: u64, private: Option<&[u8]>) -> &mut Self {
        self.pes(VIDEO_PID, 0xE0, pts, IDR, private)
    }

    pub fn audio(&mut self, pid: u16, pts: u64) -> &mut Self {
        self.pes(pid, 0xC0, pts, ADTS, None)
    }

    fn packetize(&mut self, pid: u16, private: Option<&[u8]>, data: &[u8]) {
        let mut rest = data;
        let mut first = true;
        while first || !rest.is_empty() {
            let mut af = Vec::new();
            if first {
                if let Some(p) = private {
                    af.push(0x42); // random access, private data
                    af.push(p.len() as u8);
                    af.extend_from_slice(p);
                }
            }
            let mut has_af = !af.is_empty();
            let mut room = 184 - if has_af { 1 + af.len() } else { 0 };
            let take = rest.len().min(room);
            if take < room {
                if !has_af {
                    has_af = true;
                    room -= 1;
                    if take < room {
                        af.push(0x00);
                    }
                }
                while 1 + af.len() + take < 184 {
                    af.push(0xFF);
                }
            }

            let cc = self.cc.entry(pid).or_insert(0);
            let pusi = if first { 0x40 } else { 0x00 };
            let afc = if has_af { 0x30 } else { 0x10 };
            self.out.extend_from_slice(&[0x47, pusi | (pid >> 8) as u8, pid as u8, afc | *cc]);
            *cc = (*cc + 1) & 0x0F;
            if has_af {
                self.out.push(af.len() as u8);
                self.out.extend_from_slice(&af);
            }
            self.out.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            first = false;
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, &self.out).expect("write test stream");
        path
    }
}
