//! `roosync daemon`: run the reconciliation daemon in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use roosync_daemon::{init_tracing, start_blocking};

use super::load_config;

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Log JSON lines instead of human-readable text.
    #[arg(long)]
    pub json_logs: bool,

    /// Apply pending entries on every pass, whatever the config says.
    #[arg(long)]
    pub auto_apply: bool,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        init_tracing("info", self.json_logs);
        let mut config = load_config()?;
        if self.auto_apply {
            config.auto_apply = true;
        }
        start_blocking(config).context("daemon exited with error")
    }
}
