use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use ebp_validator::config::Config;
use ebp_validator::report::Reporter;
use ebp_validator::validator::{Options, peek, run};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "ebp-validator", about = "Cross-rendition EBP boundary validator for MPEG-TS files")]
struct Opt {
    /// Discover streams and boundary topology only
    #[clap(short, long, default_value_t = false)]
    peek: bool,

    /// Print the final report as JSON
    #[clap(long, default_value_t = false)]
    json: bool,

    /// Allowed deviation from the declared EBP distance, in seconds
    #[clap(long)]
    jitter_secs: Option<f64>,

    /// Media time searched for in-band EBP markers during pre-read
    #[clap(long)]
    preread_ms: Option<u64>,

    /// Boundary events buffered per stream queue
    #[clap(long)]
    fifo_capacity: Option<usize>,

    /// JSON configuration file; flags override its values
    #[clap(long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    /// Transport stream renditions to compare
    #[clap(required = true)]
    files: Vec<PathBuf>,
}

impl Opt {
    fn config(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(v) = self.jitter_secs {
            cfg.jitter_tolerance_secs = v;
        }
        if let Some(v) = self.preread_ms {
            cfg.preread_media_budget_ms = v;
        }
        if let Some(v) = self.fifo_capacity {
            cfg.fifo_capacity = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let default = if opt.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    let opts = Options { config: opt.config()?, files: opt.files.clone() };

    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing current boundaries");
            flag.store(true, Ordering::Relaxed);
        }
    });

    if opt.peek {
        let layout = peek(opts, shutdown).await.context("topology discovery failed")?;
        print!("{layout}");
        return Ok(());
    }

    let report = run(opts, shutdown).await.context("validation aborted")?;
    if opt.json {
        println!("{}", Reporter::generate_json_report(&report));
    } else {
        print!("{}", Reporter::generate_text_report(&report));
    }
    Ok(())
}
