//! Bounded first pass over a file: PSI discovery and in-band EBP sampling.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{PAT_PID, PTS_MASK, is_audio_stream, is_video_stream};
use crate::demux::{PacketReader, TsPacket, pes};
use crate::ebp::{self, EbpStructure};
use crate::error::{EbpError, Result};
use crate::psi::{EsInfo, PmtSection, SectionAssembler, parse_pat, parse_pmt};
use crate::types::{EsEntry, FileScan};

/// Scan progress for one file.
#[derive(Debug, Default)]
pub struct ScanState {
    pub found_pat: bool,
    pub found_pmt: bool,
    pub search_ended: bool,
    pub program_number: u16,
    pub pmt_pid: Option<u16>,
    pub pmt: Option<PmtSection>,
    pub first_pts: Option<u64>,
    /// PIDs still waiting for an in-band EBP.
    pub awaiting: BTreeSet<u16>,
    pub in_band: HashMap<u16, EbpStructure>,
    pub packets: u64,
}

impl ScanState {
    pub fn done(&self) -> bool {
        self.found_pat && self.found_pmt && self.search_ended
    }

    fn on_pmt(&mut self, pmt: PmtSection) {
        self.awaiting = pmt
            .streams
            .iter()
            .filter(|s| is_video_stream(s.stream_type) || is_audio_stream(s.stream_type))
            .filter(|s| s.ebp_descriptor().is_none())
            .map(|s| s.elementary_pid)
            .collect();
        self.search_ended = self.awaiting.is_empty();
        self.found_pmt = true;
        self.pmt = Some(pmt);
    }

    /// Records a PUSI packet of a PID that needs in-band detection.
    fn on_pes_start(&mut self, pkt: &TsPacket<'_>, media_budget: u64) {
        if let Some(found) = pkt.private_data().and_then(ebp::find_in_private_data) {
            match self.in_band.get_mut(&pkt.pid) {
                Some(first) => first.merge(&found),
                None => {
                    debug!(pid = pkt.pid, "in-band EBP detected");
                    self.in_band.insert(pkt.pid, found);
                }
            }
            self.awaiting.remove(&pkt.pid);
            if self.awaiting.is_empty() {
                self.search_ended = true;
            }
        }

        if let Some(pts) = pes::peek_pts(pkt.payload) {
            let first = *self.first_pts.get_or_insert(pts);
            if pts.wrapping_sub(first) & PTS_MASK > media_budget {
                self.search_ended = true;
            }
        }
    }
}

/// Runs the pre-read pass for one file.
pub fn scan(path: &Path, cfg: &Config, shutdown: &AtomicBool) -> Result<FileScan> {
    let mut reader = PacketReader::open(path)
        .map_err(|source| EbpError::Open { path: path.to_path_buf(), source })?;
    let started = Instant::now();
    let wall_budget = Duration::from_secs(cfg.preread_wall_budget_secs);
    let media_budget = cfg.preread_media_budget_ticks();

    let mut state = ScanState::default();
    let mut pat_asm = SectionAssembler::default();
    let mut pmt_asm = SectionAssembler::default();

    while !state.done() {
        if shutdown.load(Ordering::Relaxed) || started.elapsed() > wall_budget {
            warn!(path = %path.display(), "pre-read stopped before completion");
            break;
        }
        let chunk = match reader.next_packet() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(source) => return Err(EbpError::Read { path: path.to_path_buf(), source }),
        };
        state.packets += 1;
        let pkt = match TsPacket::parse(chunk) {
            Ok(pkt) => pkt,
            Err(e) => {
                debug!(packet = state.packets, "skipping packet: {e}");
                continue;
            }
        };

        if pkt.pid == PAT_PID {
            if state.found_pat {
                continue;
            }
            if let Some(payload) = pat_asm.push(pkt.pusi, pkt.payload) {
                match parse_pat(&payload) {
                    Ok(pat) => {
                        if let Some(prog) = pat.first_program() {
                            info!(program = prog.program_number, pmt_pid = prog.pmt_pid, "PAT found");
                            state.program_number = prog.program_number;
                            state.pmt_pid = Some(prog.pmt_pid);
                            state.found_pat = true;
                        }
                    }
                    Err(e) => warn!("bad PAT: {e}"),
                }
            }
        } else if state.pmt_pid == Some(pkt.pid) {
            if state.found_pmt {
                continue;
            }
            if let Some(payload) = pmt_asm.push(pkt.pusi, pkt.payload) {
                match parse_pmt(&payload) {
                    Ok(pmt) => {
                        info!(streams = pmt.streams.len(), "PMT found");
                        state.on_pmt(pmt);
                    }
                    Err(e) => warn!("bad PMT: {e}"),
                }
            }
        } else if pkt.pusi && state.found_pmt && !state.search_ended && state.awaiting.contains(&pkt.pid) {
            state.on_pes_start(&pkt, media_budget);
        }
    }

    info!(
        path = %path.display(),
        packets = state.packets,
        in_band = state.in_band.len(),
        "pre-read finished"
    );
    let ScanState { pmt, pmt_pid, program_number, mut in_band, .. } = state;
    let (Some(pmt), Some(pmt_pid)) = (pmt, pmt_pid) else {
        return Err(EbpError::MissingPsi { path: path.to_path_buf() });
    };

    let streams = pmt
        .streams
        .iter()
        .map(|es| {
            let descriptor = es.ebp_descriptor().map(Arc::new);
            let in_band_ebp = if descriptor.is_none() { in_band.remove(&es.elementary_pid) } else { None };
            EsEntry {
                pid: es.elementary_pid,
                stream_type: es.stream_type,
                language_key: language_key(es),
                ebp_descriptor: descriptor,
                in_band_ebp,
            }
        })
        .collect();

    Ok(FileScan { path: path.to_path_buf(), program_number, pmt_pid, streams })
}

/// Identity text of an audio stream: sorted ISO-639 codes, sorted component
/// names, AC-3 language. Each list entry ends in `:`, sections end in `,`.
pub fn language_key(es: &EsInfo) -> String {
    let mut langs = es.languages();
    langs.sort();
    let mut names = es.component_names();
    names.sort();

    let mut key = String::new();
    for l in &langs {
        key.push_str(l);
        key.push(':');
    }
    key.push(',');
    for n in &names {
        key.push_str(n);
        key.push(':');
    }
    key.push(',');
    if let Some(lang) = es.ac3().and_then(|d| d.language) {
        key.push_str(&lang);
    }
    key
}
