use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use jobreg::{
    shell::{Command, Shell},
    JobRegistry, JobRunner, RegistryConfig,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobreg", about = "Run and cancel background jobs from a shell")]
struct Args {
    /// Duration of `start-task` when no seconds are given.
    #[arg(long, default_value_t = 5)]
    default_delay_secs: u64,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn setup_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing(&args.log_filter);

    let config = RegistryConfig::from_env();
    tracing::info!(?config, "Starting job registry");

    let registry = Arc::new(JobRegistry::with_config(&config));
    let shell = Shell::new(
        JobRunner::new(registry.clone())?,
        Duration::from_secs(args.default_delay_secs),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"jobs> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => shell.execute(command),
            Err(e) => e.to_string(),
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    let cancelled = registry.cancel_all();
    tracing::info!(cancelled, "Shut down");
    Ok(())
}
