// src/lib.rs
pub mod validator {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use crate::config::Config;
    use crate::report::{Reporter, ValidationReport};

    pub struct Options {
        pub files: Vec<PathBuf>,
        pub config: Config,
    }

    /// Async entry-point; the blocking pipeline runs on the blocking pool and
    /// stops reading input once `shutdown` is set
    pub async fn run(opts: Options, shutdown: Arc<AtomicBool>) -> anyhow::Result<ValidationReport> {
        let report = tokio::task::spawn_blocking(move || {
            crate::pipeline::run(&opts.files, &opts.config, &shutdown)
        })
        .await??;
        Ok(report)
    }

    /// Topology discovery only; returns the printable stream layout
    pub async fn peek(opts: Options, shutdown: Arc<AtomicBool>) -> anyhow::Result<String> {
        let layout = tokio::task::spawn_blocking(move || {
            crate::pipeline::discover(&opts.files, &opts.config, &shutdown)
                .map(|d| Reporter::generate_layout(&d.scans, &d.topology))
        })
        .await??;
        Ok(layout)
    }
}

pub mod analysis;
pub mod config;
pub mod constants;
pub mod demux;
pub mod ebp;
pub mod error;
pub mod fifo;
pub mod identity;
pub mod ingest;
pub mod network;
pub mod parsers;
pub mod pipeline;
pub mod preread;
pub mod psi;
pub mod report;
pub mod stats;
pub mod topology;
pub mod types;
