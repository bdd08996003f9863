pub mod baseline;
pub mod commit;
pub mod compare;
pub mod daemon;
pub mod init;
pub mod inventory;
pub mod package;
pub mod rollback;

use std::future::Future;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use serde::Serialize;

use roosync_core::{config, CommitStatus, Severity, SyncConfig};

/// Load this machine's config (with environment overrides applied).
pub fn load_config() -> Result<SyncConfig> {
    config::load().context("failed to load roosync config")
}

/// Drive one async command to completion.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Run blocking filesystem work off the async runtime.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    let value = tokio::task::spawn_blocking(work)
        .await
        .context("blocking task failed")??;
    Ok(value)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}

pub fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.to_string().to_uppercase();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::Important => label.yellow().bold(),
        Severity::Warning => label.yellow(),
        Severity::Info => label.bright_black(),
    }
}

pub fn status_label(status: CommitStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        CommitStatus::Pending => label.yellow(),
        CommitStatus::Applied => label.green(),
        CommitStatus::RolledBack => label.bright_black(),
        CommitStatus::Retry => label.red(),
    }
}
