//! `klinesync` binary: backfill, update, flush and inspect kline datasets.

mod args;
mod report;

use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use klinesync::{SyncConfig, SyncError, Syncer};
use klinesync_binance::BinanceSource;
use klinesync_hub::HubStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "klinesync failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every pair and upload succeeded.
async fn run(cli: Cli) -> Result<bool, SyncError> {
    let mut cfg = load_config(cli.config.as_deref())?;
    cli.apply(&mut cfg);
    if let Command::Purge { yes: false } = cli.command {
        return Err(SyncError::InvalidArg(format!(
            "purge deletes every file under {:?} in {}; pass --yes to confirm",
            cfg.store.path_prefix, cfg.store.repo_id
        )));
    }
    if cfg.store.token.is_none() && cli.command.writes() {
        cfg.store.token = prompt_token()?;
    }

    let syncer = Syncer::builder()
        .with_source(Arc::new(BinanceSource::new_raw(&cfg.source)?))
        .with_store(Arc::new(HubStore::new_raw(&cfg.store)?))
        .config(cfg)
        .build()?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; staged artifacts stay pending");
                cancel.cancel();
            }
        }
    });

    let report = match cli.command {
        Command::Backfill => syncer.run_backfill(&cancel).await,
        Command::Update => syncer.run_incremental(&cancel).await,
        Command::Slot { slot } => {
            let slot = slot.unwrap_or_else(|| syncer.current_slot());
            tracing::info!(slot, groups = syncer.scheduler().total_groups(), "slot run");
            syncer.run_slot(slot, &cancel).await
        }
        Command::Flush => syncer.flush_pending(&cancel).await,
        Command::Status => {
            let inventory = match syncer.inventory().await {
                Ok(inv) => Some(inv),
                Err(e) => {
                    tracing::warn!(error = %e, "dataset listing failed");
                    None
                }
            };
            report::print_status(&syncer.batcher().stats(), inventory.as_ref());
            return Ok(inventory.is_some());
        }
        Command::Purge { .. } => {
            let purged = syncer.purge(&cancel).await?;
            report::print_purge(&purged);
            return Ok(purged.failed.is_empty() && !cancel.is_cancelled());
        }
    };

    report::print_run(&report);
    Ok(report.is_success() && !cancel.is_cancelled())
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig, SyncError> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let raw = std::fs::read(path)?;
    serde_json::from_slice(&raw)
        .map_err(|e| SyncError::InvalidArg(format!("config {}: {e}", path.display())))
}

/// Ask for a token on an interactive terminal; `None` when stdin is not one.
fn prompt_token() -> Result<Option<String>, SyncError> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }
    eprint!("Hugging Face token: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let token = line.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}
