mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use common::*;
use ebp_validator::analysis::Mismatch;
use ebp_validator::config::Config;
use ebp_validator::error::EbpError;
use ebp_validator::pipeline;
use ebp_validator::report::ValidationReport;
use ebp_validator::types::IdentityKey;

const BOUNDARIES: [u64; 3] = [90_000, 180_000, 270_000];

fn video_audio_file(dir: &Path, name: &str, boundaries: &[u64]) -> PathBuf {
    let mut w = TsWriter::new();
    w.pat(1).pmt(
        1,
        &[
            EsDef::new(0x1B, VIDEO_PID).with(ebp_descriptor(&[1, 2])),
            EsDef::new(0x0F, AUDIO_PID).with(language("eng")),
        ],
    );
    let marker = ebp_private(true, true);
    for &pts in boundaries {
        w.video(pts, Some(&marker)).audio(AUDIO_PID, pts);
        w.video(pts + 45_000, None).audio(AUDIO_PID, pts + 45_000);
    }
    w.write(dir, name)
}

fn video_file(dir: &Path, name: &str, boundaries: &[u64]) -> PathBuf {
    let mut w = TsWriter::new();
    w.pat(1).pmt(1, &[EsDef::new(0x1B, VIDEO_PID).with(ebp_descriptor(&[1]))]);
    let marker = ebp_private(true, false);
    for &pts in boundaries {
        w.video(pts, Some(&marker));
    }
    w.write(dir, name)
}

fn run(paths: &[PathBuf]) -> Result<ValidationReport, EbpError> {
    pipeline::run(paths, &Config::default(), &AtomicBool::new(false))
}

#[test]
fn matching_renditions_pass() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        video_audio_file(dir.path(), "a.ts", &BOUNDARIES),
        video_audio_file(dir.path(), "b.ts", &BOUNDARIES),
    ];
    let report = run(&paths).unwrap();

    assert!(report.passed, "{report:#?}");
    assert_eq!(report.slots.len(), 2);
    for file in &report.files {
        assert_eq!(file.streams.len(), 2);
        assert!(file.streams.iter().all(|s| s.passed && s.events == 6 && s.mismatches.is_empty()));
        assert_eq!(file.ingest.stats.implicit_triggered, 6);
    }
    assert!(report.queues.iter().all(|q| q.pushes == q.pops));
    // one sentinel per queue on top of the events
    assert!(report.queues.iter().all(|q| q.pushes == 7));
}

#[test]
fn audio_without_ebp_inherits_video_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [video_audio_file(dir.path(), "a.ts", &BOUNDARIES)];
    let found = pipeline::discover(&paths, &Config::default(), &AtomicBool::new(false)).unwrap();

    let audio = found.topology.get(0, 1).unwrap();
    assert_eq!(audio.pid, AUDIO_PID);
    for id in [1, 2] {
        let b = audio.boundaries[id];
        assert!(b.is_boundary && b.is_implicit);
        assert_eq!((b.implicit_pid, b.implicit_file), (VIDEO_PID, 0));
    }
    let video = found.topology.get(0, 0).unwrap();
    assert!(video.boundaries[1].is_boundary && !video.boundaries[1].is_implicit);
}

#[test]
fn late_boundary_fails_jitter() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        video_file(dir.path(), "a.ts", &BOUNDARIES),
        video_file(dir.path(), "b.ts", &[90_000, 180_000, 290_000]),
    ];
    let report = run(&paths).unwrap();

    assert!(report.files[0].passed);
    assert!(!report.files[1].passed);
    assert!(!report.passed);
    let video = &report.files[1].streams[0];
    assert!(video.mismatches.contains(&Mismatch::Jitter {
        pts: 290_000,
        partition_id: 1,
        predicted: 270_000,
        delta: 20_000,
        tolerance: 9000,
    }));
}

#[test]
fn partition_above_nine_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = TsWriter::new();
    w.pat(1).pmt(1, &[EsDef::new(0x1B, VIDEO_PID).with(ebp_descriptor(&[10]))]);
    w.video(90_000, Some(&ebp_private(true, true)));
    let path = w.write(dir.path(), "bad.ts");

    let err = run(&[path]).unwrap_err();
    assert!(err.to_string().contains("PartitionID > 9"), "{err}");
}

#[test]
fn extra_language_gets_absent_entries() {
    let dir = tempfile::tempdir().unwrap();
    let spa_pid = 0x102;

    let mut a = TsWriter::new();
    a.pat(1).pmt(
        1,
        &[
            EsDef::new(0x1B, VIDEO_PID).with(ebp_descriptor(&[1])),
            EsDef::new(0x0F, AUDIO_PID).with(language("eng")),
        ],
    );
    let mut b = TsWriter::new();
    b.pat(1).pmt(
        1,
        &[
            EsDef::new(0x1B, VIDEO_PID).with(ebp_descriptor(&[1])),
            EsDef::new(0x0F, AUDIO_PID).with(language("eng")),
            EsDef::new(0x0F, spa_pid).with(language("spa")),
        ],
    );
    let marker = ebp_private(true, false);
    for &pts in &BOUNDARIES {
        a.video(pts, Some(&marker)).audio(AUDIO_PID, pts);
        b.video(pts, Some(&marker)).audio(AUDIO_PID, pts).audio(spa_pid, pts);
    }
    let paths = [a.write(dir.path(), "a.ts"), b.write(dir.path(), "b.ts")];

    let found = pipeline::discover(&paths, &Config::default(), &AtomicBool::new(false)).unwrap();
    let topo = &found.topology;
    assert_eq!(topo.slots.len(), 3);
    let spa = topo
        .slots
        .iter()
        .find(|s| s.key == IdentityKey::Language("spa:,,".into()))
        .unwrap();
    assert!(topo.get(0, spa.index).is_none());
    assert_eq!(topo.get(1, spa.index).unwrap().pid, spa_pid);

    let report = run(&paths).unwrap();
    assert!(report.passed, "{report:#?}");
    assert_eq!(report.files[0].streams.len(), 2);
    assert_eq!(report.files[1].streams.len(), 3);
}

fn spliced_file(dir: &Path, name: &str, splice_pts: u64) -> PathBuf {
    let mut w = TsWriter::new();
    w.pat(1).pmt(
        1,
        &[
            EsDef::new(0x1B, VIDEO_PID).with(ebp_descriptor(&[1, 2])),
            EsDef::new(0x86, SCTE35_PID),
        ],
    );
    w.section(SCTE35_PID, &splice_insert(7, splice_pts));
    let marker = ebp_private(true, true);
    for &pts in &BOUNDARIES {
        w.video(pts, Some(&marker)).video(pts + 45_000, None);
    }
    w.write(dir, name)
}

#[test]
fn splice_point_on_segment_boundary_passes() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(&[spliced_file(dir.path(), "a.ts", 180_000)]).unwrap();
    let file = &report.files[0];
    assert!(file.passed, "{report:#?}");
    assert_eq!(file.ingest.splice.matched, 1);
}

#[test]
fn splice_point_between_boundaries_fails_file() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(&[spliced_file(dir.path(), "a.ts", 225_000)]).unwrap();
    let file = &report.files[0];
    assert!(!file.ingest.passed);
    assert!(!file.passed);
    assert!(file.streams.iter().all(|s| s.passed));
}

#[test]
fn reruns_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        video_file(dir.path(), "a.ts", &BOUNDARIES),
        video_file(dir.path(), "b.ts", &[90_000, 180_000, 290_000]),
    ];
    let summary = |r: ValidationReport| {
        r.files
            .into_iter()
            .flat_map(|f| f.streams)
            .map(|s| (s.file, s.slot, s.passed, s.mismatches))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(run(&paths).unwrap()), summary(run(&paths).unwrap()));
}

#[test]
fn missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(&[dir.path().join("nope.ts")]).unwrap_err();
    assert!(matches!(err, EbpError::Open { .. }));
    assert!(matches!(run(&[]), Err(EbpError::NoInputs)));
}

#[tokio::test]
async fn peek_prints_layout() {
    use ebp_validator::validator::{Options, peek};

    let dir = tempfile::tempdir().unwrap();
    let path = video_audio_file(dir.path(), "a.ts", &BOUNDARIES);
    let opts = Options { files: vec![path], config: Config::default() };
    let layout = peek(opts, Arc::new(AtomicBool::new(false))).await.unwrap();

    assert!(layout.contains("SLOT 0 video"));
    assert!(layout.contains("1:I(256@0) 2:I(256@0)"));
}

#[test]
fn shutdown_flushes_every_queue() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        video_audio_file(dir.path(), "a.ts", &BOUNDARIES),
        video_audio_file(dir.path(), "b.ts", &BOUNDARIES),
    ];
    let found = pipeline::discover(&paths, &Config::default(), &AtomicBool::new(false)).unwrap();
    let report = pipeline::validate(found, &Config::default(), &AtomicBool::new(true)).unwrap();

    assert!(report.interrupted);
    assert_eq!(report.queues.len(), 4);
    // sentinel only
    assert!(report.queues.iter().all(|q| q.pushes == 1 && q.pops == 1));
    assert!(report.files.iter().all(|f| f.ingest.interrupted && f.streams.iter().all(|s| s.events == 0)));
}

#[test]
fn failing_ingest_worker_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        video_audio_file(dir.path(), "a.ts", &BOUNDARIES),
        video_audio_file(dir.path(), "b.ts", &BOUNDARIES),
    ];
    let found = pipeline::discover(&paths, &Config::default(), &AtomicBool::new(false)).unwrap();
    std::fs::remove_file(&paths[1]).unwrap();

    let shutdown = AtomicBool::new(false);
    let err = pipeline::validate(found, &Config::default(), &shutdown).unwrap_err();
    assert!(matches!(err, EbpError::Open { .. } | EbpError::Fifo { .. }), "{err}");
    assert!(shutdown.load(std::sync::atomic::Ordering::Relaxed));
}
