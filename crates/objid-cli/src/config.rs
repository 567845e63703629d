use std::{path::PathBuf, time::Duration};

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use objid::{AppId, ReconcileConfig};

/// Command-line configuration for the `objid` binary.
///
/// Every tunable falls back to an environment variable, and `.env` files are
/// honored, so the same invocation works from a shell, a build script or CI.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "objid",
    version,
    about = "Allocate object IDs from declared ranges and reconcile consumed IDs"
)]
pub struct CliArgs {
    /// Directory holding one canonical record per application.
    ///
    /// Environment variable: `OBJID_STORE_DIR`
    #[arg(long, global = true, env = "OBJID_STORE_DIR", default_value = ".objid")]
    pub store_dir: PathBuf,

    /// Emit logs as JSON lines instead of human-readable text.
    ///
    /// Environment variable: `OBJID_LOG_JSON`
    #[arg(long, global = true, env = "OBJID_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate a JSON array of `{from, to}` ranges and print it normalized.
    Validate {
        /// Path to the ranges file.
        ranges: PathBuf,
    },
    /// Find free IDs for an allocation request.
    Next(NextArgs),
    /// Merge discovered consumption into the canonical record.
    Sync(SyncArgs),
    /// Print the canonical record of an application.
    Show {
        /// Application ID.
        app_id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct NextArgs {
    /// Path to the allocation request (`{appId, ranges, perType}`).
    pub request: PathBuf,

    /// Consumption to allocate against. Defaults to the canonical record of
    /// the consumption owner.
    #[arg(long)]
    pub consumption: Option<PathBuf>,

    /// Pool designations: a JSON array of `{poolId, owner, sharedConsumption}`.
    #[arg(long)]
    pub pools: Option<PathBuf>,

    /// Pool the requesting application belongs to. Defaults to the pool of
    /// its canonical record, if any.
    #[arg(long)]
    pub pool: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Application ID.
    pub app_id: String,

    /// One or more discovered-consumption files, e.g. scraped from several
    /// branches. They are merged before reconciling.
    #[arg(required = true)]
    pub discovered: Vec<PathBuf>,

    /// Replace the stored ranges with the ranges in this file.
    #[arg(long)]
    pub ranges: Option<PathBuf>,

    /// Attempts before giving up on a record that keeps changing underneath.
    ///
    /// Environment variable: `OBJID_MAX_ATTEMPTS`
    #[arg(long, env = "OBJID_MAX_ATTEMPTS", default_value_t = ReconcileConfig::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Wall-clock budget for the whole sync, in milliseconds.
    ///
    /// Environment variable: `OBJID_DEADLINE_MS`
    #[arg(long, env = "OBJID_DEADLINE_MS")]
    pub deadline_ms: Option<u64>,

    /// Pause between conflicting attempts, in milliseconds.
    ///
    /// Environment variable: `OBJID_BACKOFF_MS`
    #[arg(long, env = "OBJID_BACKOFF_MS", default_value_t = 50)]
    pub backoff_ms: u64,

    /// Hold the record's lease file while merging and committing.
    ///
    /// Environment variable: `OBJID_LEASE`
    #[arg(long, env = "OBJID_LEASE", default_value_t = false)]
    pub lease: bool,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub app_id: AppId,
    pub discovered: Vec<PathBuf>,
    pub ranges: Option<PathBuf>,
    pub reconcile: ReconcileConfig,
}

impl TryFrom<SyncArgs> for SyncConfig {
    type Error = anyhow::Error;

    fn try_from(args: SyncArgs) -> Result<Self, Self::Error> {
        if args.app_id.trim().is_empty() {
            bail!("application ID must not be empty");
        }
        if args.max_attempts == 0 {
            bail!("OBJID_MAX_ATTEMPTS must be greater than 0");
        }

        let mut reconcile = ReconcileConfig::new()
            .with_max_attempts(args.max_attempts)
            .with_backoff(Duration::from_millis(args.backoff_ms))
            .with_lease(args.lease);
        match args.deadline_ms {
            Some(0) => bail!("OBJID_DEADLINE_MS must be greater than 0"),
            Some(ms) => reconcile = reconcile.with_deadline(Duration::from_millis(ms)),
            None => {}
        }

        Ok(Self {
            app_id: AppId::from(args.app_id),
            discovered: args.discovered,
            ranges: args.ranges,
            reconcile,
        })
    }
}
