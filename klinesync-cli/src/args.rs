use std::path::PathBuf;

use clap::{Parser, Subcommand};
use klinesync_core::{Instrument, Resolution, SyncConfig};

/// Keep kline datasets in a Hugging Face dataset repository up to date.
#[derive(Debug, Parser)]
#[command(name = "klinesync", version, long_about = None)]
pub struct Cli {
    /// JSON configuration file; built-in defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Hugging Face access token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Directory for staged artifacts and the cache index
    #[arg(long, env = "KLINESYNC_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Instruments to process, comma separated (e.g. BTCUSDT,ETHUSDT)
    #[arg(long, value_delimiter = ',', global = true)]
    pub symbols: Vec<Instrument>,

    /// Resolutions to process, comma separated (e.g. 15m,1h,1d)
    #[arg(long, value_delimiter = ',', global = true)]
    pub resolutions: Vec<Resolution>,

    /// Pairs fetched concurrently
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Rebuild the full history of every pair and upload it
    Backfill,
    /// Merge the latest window of every pair into the dataset
    Update,
    /// Update the instrument group due in a scheduling slot
    Slot {
        /// Slot number; defaults to the current hour since the epoch
        #[arg(long)]
        slot: Option<u64>,
    },
    /// Upload artifacts left pending by earlier runs
    Flush,
    /// Show local cache counts and which pairs exist in the dataset
    Status,
    /// Delete every file under the dataset path
    Purge {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

impl Command {
    /// Commands that commit to the dataset repository.
    pub const fn writes(&self) -> bool {
        !matches!(self, Self::Status)
    }
}

impl Cli {
    /// Layer flag and environment overrides over a loaded config.
    pub fn apply(&self, cfg: &mut SyncConfig) {
        if let Some(token) = &self.token {
            cfg.store.token = Some(token.clone());
        }
        if let Some(dir) = &self.cache_dir {
            cfg.cache_dir = dir.clone();
        }
        if !self.symbols.is_empty() {
            cfg.instruments = self.symbols.clone();
        }
        if !self.resolutions.is_empty() {
            cfg.resolutions = self.resolutions.clone();
        }
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
    }
}
