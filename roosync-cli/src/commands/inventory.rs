//! `roosync inventory`: machine inventories in the shared store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use roosync_baseline::SharedInventorySource;
use roosync_core::{InventoryModel, MachineId, ProfileCategory};

use super::{load_config, print_json};

#[derive(Subcommand, Debug)]
pub enum InventoryCommand {
    /// Publish an inventory file as this machine's current inventory.
    ///
    /// The file is either a full inventory (`machineId`, `timestamp`,
    /// `config`) or a bare `config` object.
    Publish {
        file: PathBuf,
        /// Publish under another machine id.
        #[arg(long)]
        machine: Option<String>,
    },
    /// List published inventories.
    List,
}

#[derive(Tabled)]
struct InventoryRow {
    #[tabled(rename = "machine")]
    machine: String,
    #[tabled(rename = "collected")]
    collected: String,
    #[tabled(rename = "categories")]
    categories: usize,
}

pub fn run(command: InventoryCommand, json: bool) -> Result<()> {
    let config = load_config()?;
    let source = SharedInventorySource::new(config.shared_path.clone());
    match command {
        InventoryCommand::Publish { file, machine } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("cannot read '{}'", file.display()))?;
            let value: Value = serde_json::from_slice(&raw)
                .with_context(|| format!("'{}' is not valid JSON", file.display()))?;
            let mut inventory = if value.get("config").is_some() && value.get("machineId").is_some() {
                serde_json::from_value::<InventoryModel>(value)
                    .with_context(|| format!("'{}' is not a valid inventory", file.display()))?
            } else {
                InventoryModel {
                    machine_id: config.machine_id.clone(),
                    timestamp: Utc::now(),
                    config: value,
                }
            };
            if let Some(machine) = machine {
                inventory.machine_id = MachineId::from(machine.as_str());
            }

            let path = source
                .publish(&inventory)
                .with_context(|| format!("failed to publish inventory for '{}'", inventory.machine_id))?;
            if json {
                return print_json(&inventory);
            }
            println!(
                "✓ Published inventory for '{}' ({} categories)",
                inventory.machine_id,
                reported_categories(&inventory)
            );
            println!("  Saved to: {}", path.display());
            Ok(())
        }
        InventoryCommand::List => {
            let inventories = source.list().context("failed to list inventories")?;
            if json {
                return print_json(&inventories);
            }
            if inventories.is_empty() {
                println!("No inventories published.");
                return Ok(());
            }
            let rows: Vec<InventoryRow> = inventories
                .iter()
                .map(|inventory| InventoryRow {
                    machine: inventory.machine_id.to_string(),
                    collected: inventory.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                    categories: reported_categories(inventory),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            Ok(())
        }
    }
}

fn reported_categories(inventory: &InventoryModel) -> usize {
    ProfileCategory::all()
        .iter()
        .filter(|&&category| inventory.category_value(category).is_some())
        .count()
}
