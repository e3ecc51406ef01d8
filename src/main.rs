//! Tether daemon - serves a device's command tree over TCP.
//!
//! This is the binary entry point. See the `tether` library for the
//! framework itself.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tether::constants::{DEFAULT_PORT, DEFAULT_ROOT_ID, DEFAULT_TICK_MS};
use tether::{CallOutcome, Robot};

/// mimalloc provides better multi-threaded performance than the system
/// allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "Serve a scriptable command tree over a line-based TCP protocol")]
struct Cli {
    /// TCP port for the command server.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Id of the root module.
    #[arg(long, default_value = DEFAULT_ROOT_ID)]
    id: String,

    /// Scheduler cadence for the script runtime, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TICK_MS)]
    tick_ms: u64,

    /// Script file to load into the runtime at startup.
    #[arg(long)]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let robot = Robot::launch(cli.id, cli.port).await?;

    if let Some(path) = cli.script {
        let script = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        match robot.autonomous().module().dispatch("load", Some(&script)) {
            CallOutcome::Finished(payload) => {
                log::info!("[Main] {payload}: {}", path.display());
            }
            other => anyhow::bail!("Failed to load script {}: {other:?}", path.display()),
        }
    }

    // interval() panics on a zero period.
    let mut ticker = tokio::time::interval(Duration::from_millis(cli.tick_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => robot.autonomous().next(),
            result = &mut shutdown => {
                result.context("Failed to listen for the shutdown signal")?;
                break;
            }
        }
    }

    log::info!("[Main] Shutting down");
    robot.shutdown();
    Ok(())
}
