//! Report generation for EBP validation results

use std::fmt::Write as _;

use serde::Serialize;

use crate::analysis::StreamVerdict;
use crate::constants::stream_type_name;
use crate::ingest::IngestReport;
use crate::topology::{Topology, describe};
use crate::types::{FileScan, StreamSlot};

/// Push/pop counters of one queue at teardown
#[derive(Debug, Clone, Serialize)]
pub struct QueueBalance {
    pub file: usize,
    pub slot: usize,
    pub pushes: u64,
    pub pops: u64,
}

impl QueueBalance {
    pub fn balanced(&self) -> bool {
        self.pushes == self.pops
    }
}

/// Outcome for one input file
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: usize,
    pub path: String,
    pub passed: bool,
    pub ingest: IngestReport,
    pub streams: Vec<StreamVerdict>,
}

/// Complete result of a validation run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub slots: Vec<StreamSlot>,
    pub files: Vec<FileResult>,
    pub queues: Vec<QueueBalance>,
    pub passed: bool,
    pub interrupted: bool,
}

impl ValidationReport {
    /// Groups verdicts by file; a file passes when its ingest flag and all streams pass.
    pub fn new(
        slots: Vec<StreamSlot>,
        ingest: Vec<IngestReport>,
        mut verdicts: Vec<StreamVerdict>,
        queues: Vec<QueueBalance>,
    ) -> Self {
        verdicts.sort_by_key(|v| (v.file, v.slot));
        let interrupted = ingest.iter().any(|r| r.interrupted);
        let files: Vec<FileResult> = ingest
            .into_iter()
            .map(|r| {
                let streams: Vec<StreamVerdict> = verdicts.iter().filter(|v| v.file == r.file).cloned().collect();
                FileResult {
                    file: r.file,
                    path: r.path.display().to_string(),
                    passed: r.passed && streams.iter().all(|s| s.passed),
                    ingest: r,
                    streams,
                }
            })
            .collect();
        let passed = files.iter().all(|f| f.passed) && queues.iter().all(QueueBalance::balanced);

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            slots,
            files,
            queues,
            passed,
            interrupted,
        }
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed { "PASS" } else { "FAIL" }
}

/// Report generator for validation results
pub struct Reporter;

impl Reporter {
    /// Human-readable report, suitable for a test log
    pub fn generate_text_report(report: &ValidationReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "TEST RESULTS");
        if report.interrupted {
            let _ = writeln!(out, "  (interrupted before end of input)");
        }
        for file in &report.files {
            let _ = writeln!(out, "FILE {} {}: {}", file.file, file.path, verdict(file.passed));
            let s = &file.ingest.splice;
            if s.registered > 0 {
                let _ = writeln!(
                    out,
                    "  SCTE-35 splice points: {} registered, {} matched, {} failed",
                    s.registered, s.matched, s.failed
                );
            }
            let st = &file.ingest.stats;
            let _ = writeln!(
                out,
                "  packets {} (malformed {}), PES {}, events {} (implicit {})",
                st.packets, st.malformed, st.pes_units, st.events_pushed, st.implicit_triggered
            );
            for v in &file.streams {
                let kind = if v.is_video { "video" } else { "audio" };
                let _ = writeln!(
                    out,
                    "  STREAM slot {} PID {} {}: {} [{}] boundaries {}",
                    v.slot,
                    v.pid,
                    kind,
                    verdict(v.passed),
                    v.partitions,
                    v.events
                );
                if let Some(secs) = st.duration_secs(v.pid) {
                    let _ = writeln!(out, "    media duration {secs:.3}s");
                }
                for m in &v.mismatches {
                    let _ = writeln!(out, "    - {m}");
                }
            }
        }
        for q in report.queues.iter().filter(|q| !q.balanced()) {
            let _ = writeln!(
                out,
                "QUEUE file {} slot {} unbalanced: {} pushes, {} pops",
                q.file, q.slot, q.pushes, q.pops
            );
        }
        let _ = writeln!(out, "OVERALL: {}", verdict(report.passed));
        let _ = writeln!(out, "TEST RESULTS END");
        out
    }

    /// Generate pretty-printed JSON string for CLI output
    pub fn generate_json_report(report: &ValidationReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }

    /// Stream layout discovered by pre-read and topology resolution
    pub fn generate_layout(scans: &[FileScan], topo: &Topology) -> String {
        let mut out = String::new();
        for (f, scan) in scans.iter().enumerate() {
            let _ = writeln!(
                out,
                "FILE {f} {} program {} PMT PID {}",
                scan.path.display(),
                scan.program_number,
                scan.pmt_pid
            );
            for es in &scan.streams {
                let signal = match (&es.ebp_descriptor, &es.in_band_ebp) {
                    (Some(_), _) => "descriptor",
                    (None, Some(_)) => "in-band",
                    (None, None) => "none",
                };
                let _ = writeln!(
                    out,
                    "  PID {} type 0x{:02X} ({}) EBP {} lang '{}'",
                    es.pid,
                    es.stream_type,
                    stream_type_name(es.stream_type),
                    signal,
                    es.language_key
                );
            }
        }
        for slot in &topo.slots {
            let _ = writeln!(out, "SLOT {} {}", slot.index, slot.key);
            for (f, info) in topo.slot_column(slot.index).into_iter().enumerate() {
                match info {
                    Some(info) => {
                        let _ = writeln!(out, "  file {f}: PID {} [{}]", info.pid, describe(&info.boundaries));
                    }
                    None => {
                        let _ = writeln!(out, "  file {f}: absent");
                    }
                }
            }
        }
        out
    }
}
