//! Runs pre-read, identity resolution and topology build, then the ingest and
//! analysis threads connected by the topology's queues.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{error, info};

use crate::analysis::{AnalysisWorker, StreamVerdict};
use crate::config::Config;
use crate::error::{EbpError, Result};
use crate::identity;
use crate::ingest::{self, IngestReport};
use crate::preread;
use crate::report::{QueueBalance, ValidationReport};
use crate::topology::{self, Topology};
use crate::types::FileScan;

/// Everything known before any boundary is read.
#[derive(Debug)]
pub struct Discovery {
    pub scans: Vec<FileScan>,
    pub topology: Topology,
}

/// Pre-reads every file in parallel and resolves the stream topology.
pub fn discover(paths: &[PathBuf], cfg: &Config, shutdown: &AtomicBool) -> Result<Discovery> {
    if paths.is_empty() {
        return Err(EbpError::NoInputs);
    }
    let scans = thread::scope(|s| {
        let mut handles = Vec::with_capacity(paths.len());
        for (f, path) in paths.iter().enumerate() {
            let name = format!("preread-{f}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(s, move || preread::scan(path, cfg, shutdown))
                .map_err(|source| EbpError::Spawn { name: name.clone(), source })?;
            handles.push((name, handle));
        }
        handles
            .into_iter()
            .map(|(name, h)| h.join().map_err(|_| EbpError::WorkerPanicked(name))?)
            .collect::<Result<Vec<_>>>()
    })?;

    let plan = identity::resolve(&scans)?;
    info!(
        files = scans.len(),
        slots = plan.slots.len(),
        by_language = plan.use_language,
        "stream identities resolved"
    );
    let topology = topology::build(&scans, &plan, cfg.fifo_capacity)?;
    Ok(Discovery { scans, topology })
}

enum Outcome {
    Ingest(IngestReport),
    Analysis(Vec<StreamVerdict>),
}

/// Full validation run.
pub fn run(paths: &[PathBuf], cfg: &Config, shutdown: &AtomicBool) -> Result<ValidationReport> {
    validate(discover(paths, cfg, shutdown)?, cfg, shutdown)
}

/// Ingest and analysis over an already discovered topology.
pub fn validate(found: Discovery, cfg: &Config, shutdown: &AtomicBool) -> Result<ValidationReport> {
    let Discovery { scans, topology: topo } = found;

    let outcomes = thread::scope(|s| {
        let topo = &topo;
        // a failed worker wakes every blocked peer before its thread ends
        let fatal = move |worker: &str, e: &EbpError| {
            error!(worker, "{e}");
            shutdown.store(true, Ordering::Relaxed);
            topo.abort_all();
        };

        let mut handles = Vec::new();
        for slot in 0..topo.slots.len() {
            let name = format!("analysis-{slot}");
            let h = spawn_worker(s, &name, fatal, move || {
                AnalysisWorker::from_topology(slot, topo, cfg).run().map(Outcome::Analysis)
            })
            .inspect_err(|e| fatal("pipeline", e))?;
            handles.push((name, h));
        }
        for (f, scan) in scans.iter().enumerate() {
            let name = format!("ingest-{f}");
            let h = spawn_worker(s, &name, fatal, move || {
                ingest::run(f, scan, topo, cfg, shutdown).map(Outcome::Ingest)
            })
            .inspect_err(|e| fatal("pipeline", e))?;
            handles.push((name, h));
        }

        let mut first_err = None;
        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, h) in handles {
            match h.join() {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(_) => {
                    let e = EbpError::WorkerPanicked(name);
                    fatal("pipeline", &e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    })?;

    let mut ingest_reports = Vec::new();
    let mut verdicts = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Ingest(r) => ingest_reports.push(r),
            Outcome::Analysis(v) => verdicts.extend(v),
        }
    }
    ingest_reports.sort_by_key(|r| r.file);

    Ok(ValidationReport::new(topo.slots.clone(), ingest_reports, verdicts, queue_balances(&topo)))
}

/// Spawns a named worker that runs `on_fatal` before exiting with an error.
fn spawn_worker<'scope, 'env, F, A>(
    s: &'scope thread::Scope<'scope, 'env>,
    name: &str,
    on_fatal: A,
    work: F,
) -> Result<thread::ScopedJoinHandle<'scope, Result<Outcome>>>
where
    F: FnOnce() -> Result<Outcome> + Send + 'scope,
    A: Fn(&str, &EbpError) + Send + 'scope,
{
    let worker = name.to_string();
    thread::Builder::new()
        .name(worker.clone())
        .spawn_scoped(s, move || {
            let r = work();
            if let Err(e) = &r {
                on_fatal(&worker, e);
            }
            r
        })
        .map_err(|source| EbpError::Spawn { name: name.to_string(), source })
}

/// Push/pop counters of every queue; each must have been fully drained.
pub fn queue_balances(topo: &Topology) -> Vec<QueueBalance> {
    topo.all_queues()
        .map(|((file, slot), q)| {
            let (pushes, pops) = q.counters();
            if pushes == pops {
                info!(file, slot, pushes, pops, "queue balanced");
            } else {
                error!(file, slot, pushes, pops, "queue push/pop counters do not balance");
            }
            QueueBalance { file, slot, pushes, pops }
        })
        .collect()
}
