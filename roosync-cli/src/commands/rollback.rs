//! `roosync rollback`: local rollback points.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use roosync_sync::RollbackManager;

use super::{block_on, load_config, print_json};

#[derive(Subcommand, Debug)]
pub enum RollbackCommand {
    /// List rollback points, oldest first.
    List,
    /// Put every file of a rollback point back.
    Restore { decision_id: String },
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "decision")]
    decision_id: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "files")]
    files: usize,
}

pub fn run(command: RollbackCommand, json: bool) -> Result<()> {
    let config = load_config()?;
    let manager = RollbackManager::new(config.rollback_dir(), config.retry_policy());
    block_on(async move {
        match command {
            RollbackCommand::List => {
                let points = manager
                    .list_rollback_points()
                    .await
                    .context("failed to list rollback points")?;
                if json {
                    return print_json(&points);
                }
                if points.is_empty() {
                    println!("No rollback points.");
                    return Ok(());
                }
                let rows: Vec<PointRow> = points
                    .iter()
                    .map(|point| PointRow {
                        decision_id: point.decision_id.clone(),
                        created: point.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        files: point.files.len(),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
                Ok(())
            }
            RollbackCommand::Restore { decision_id } => {
                let report = manager
                    .restore_from_rollback_point(&decision_id)
                    .await
                    .with_context(|| format!("failed to restore '{decision_id}'"))?;
                if json {
                    print_json(&report)?;
                } else {
                    for line in &report.logs {
                        println!("  {line}");
                    }
                }
                if !report.success {
                    bail!("rollback point '{decision_id}' was only partly restored");
                }
                if !json {
                    println!(
                        "{} Restored {} file(s) from '{decision_id}'",
                        "✓".green(),
                        report.restored_files.len()
                    );
                }
                Ok(())
            }
        }
    })?
}
