//! `roosync init --shared <path> --machine <id> [--local-root <path>] [--auto-apply]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use roosync_core::{config, paths, MachineId, SyncConfig};

use super::print_json;

/// Write this machine's config to ~/.roosync/config.yaml.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Shared storage location every machine polls.
    #[arg(long)]
    pub shared: PathBuf,

    /// This machine's id ([A-Za-z0-9._-]).
    #[arg(long, short = 'm')]
    pub machine: String,

    /// Machine-local state (rollback points, applied configs). Defaults to ~/.roosync.
    #[arg(long)]
    pub local_root: Option<PathBuf>,

    /// Apply pending entries on every daemon pass.
    #[arg(long)]
    pub auto_apply: bool,

    /// Seconds between daemon passes.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, json: bool) -> Result<()> {
        let home = config::home().context("could not determine home directory")?;
        let target = paths::config_path(&home);
        if target.exists() && !self.force {
            bail!(
                "config already exists at {}; pass --force to overwrite",
                target.display()
            );
        }

        let local_root = self
            .local_root
            .unwrap_or_else(|| paths::roosync_root(&home));
        let mut sync_config =
            SyncConfig::new(self.shared, MachineId::from(self.machine.as_str()), local_root);
        sync_config.auto_apply = self.auto_apply;
        if let Some(interval) = self.interval {
            sync_config.auto_sync_interval_secs = interval;
        }

        let path = config::save_at(&home, &sync_config).context("failed to save config")?;
        if json {
            return print_json(&sync_config);
        }
        println!(
            "✓ Initialized machine '{}' against {}",
            sync_config.machine_id,
            sync_config.shared_path.display()
        );
        println!("  Saved to: {}", path.display());
        Ok(())
    }
}
