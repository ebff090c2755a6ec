use clap::Parser;
use ebp_validator::network::{StreamTarget, stream_file};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "ebp-stream", about = "Replay transport stream files over UDP")]
struct Opt {
    /// `<file>,<ip>:<port>,<packets_per_sec>`; one sender per entry
    #[clap(required = true)]
    targets: Vec<StreamTarget>,
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
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut tasks = tokio::task::JoinSet::new();
    for target in opt.targets {
        tasks.spawn(async move {
            let r = stream_file(&target).await;
            (target, r)
        });
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted");
                tasks.abort_all();
                return Ok(());
            }
            next = tasks.join_next() => match next {
                Some(Ok((target, Ok(sent)))) => {
                    tracing::info!(file = %target.file.display(), sent, "done");
                }
                Some(Ok((target, Err(e)))) => {
                    tracing::error!(file = %target.file.display(), "{e:#}");
                }
                Some(Err(e)) => tracing::error!("sender task failed: {e}"),
                None => return Ok(()),
            },
        }
    }
}
