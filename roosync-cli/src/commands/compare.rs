//! `roosync compare`: deviations of a machine from the active baseline.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use roosync_baseline::{render_deviation, BaselineError, InventorySource};
use roosync_core::{ComparisonReport, Deviation, MachineId};
use roosync_daemon::Components;

use super::{block_on, blocking, load_config, print_json, severity_label};

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Machine to compare; this machine when omitted.
    #[arg(long)]
    pub machine: Option<String>,

    /// Print a unified diff for every deviation.
    #[arg(long)]
    pub diff: bool,

    /// Persist the result as a machine mapping in the shared store.
    #[arg(long)]
    pub save: bool,

    /// Record each deviating category as a PENDING commit entry.
    #[arg(long, conflicts_with_all = ["save", "machine"])]
    pub record: bool,
}

#[derive(Tabled)]
struct DeviationRow {
    #[tabled(rename = "severity")]
    severity: String,
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl CompareArgs {
    pub fn run(self, json: bool) -> Result<()> {
        let config = load_config()?;
        let machine = self
            .machine
            .as_deref()
            .map(MachineId::from)
            .unwrap_or_else(|| config.machine_id.clone());

        block_on(async move {
            let components = Components::build(config);
            if self.save {
                return save_mapping(&components, &machine, json).await;
            }

            let report = components
                .mapper
                .compare_with_non_nominative_baseline(&machine)
                .await
                .with_context(|| format!("failed to compare '{machine}'"))?;
            let recorded = if self.record {
                record(&components, &report).await?
            } else {
                Vec::new()
            };
            if json {
                return print_json(&report);
            }
            print_report(&report, self.diff);
            if self.record {
                println!("Recorded {} new commit entr(ies): {:?}", recorded.len(), recorded);
            }
            Ok(())
        })?
    }
}

async fn save_mapping(components: &Components, machine: &MachineId, json: bool) -> Result<()> {
    let baseline = components
        .store
        .get_active_baseline()
        .await?
        .ok_or(BaselineError::NoActiveBaseline)
        .context("cannot map without a baseline")?;
    let source = Arc::clone(&components.inventories);
    let id = machine.clone();
    let inventory = blocking(move || source.collect_inventory(&id))
        .await
        .context("failed to read inventory")?
        .ok_or_else(|| BaselineError::InventoryNotFound(machine.clone()))?;
    let mapping = components
        .mapper
        .map_machine_to_baseline(machine, &inventory, &baseline.baseline_id)
        .await
        .with_context(|| format!("failed to map '{machine}'"))?;

    if json {
        return print_json(&mapping);
    }
    println!(
        "✓ Mapped '{}' onto '{}': {} deviation(s), {} applied profile(s)",
        machine,
        baseline.name,
        mapping.deviations.len(),
        mapping.applied_profiles.len()
    );
    println!("  mapping id: {}", mapping.mapping_id);
    Ok(())
}

async fn record(components: &Components, report: &ComparisonReport) -> Result<Vec<u64>> {
    let baseline = components
        .store
        .get_active_baseline()
        .await?
        .ok_or(BaselineError::NoActiveBaseline)?;
    let recorded = components
        .policy
        .record_deviations(report, &baseline)
        .await
        .context("failed to record deviations")?;
    Ok(recorded)
}

fn print_report(report: &ComparisonReport, diff: bool) {
    let stats = &report.statistics;
    println!(
        "{} vs baseline {} | {} deviation(s): {} critical, {} important, {} warning, {} info",
        report.machine_id.to_string().bold(),
        report.baseline_id.bright_black(),
        stats.total,
        stats.critical,
        stats.important,
        stats.warning,
        stats.info,
    );
    if report.is_clean() {
        println!("{} in line with the baseline", "✓".green());
        return;
    }

    let rows: Vec<DeviationRow> = report.differences.iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if diff {
        for deviation in &report.differences {
            print!("{}", render_deviation(deviation));
        }
    }
}

fn row(deviation: &Deviation) -> DeviationRow {
    DeviationRow {
        severity: severity_label(deviation.severity).to_string(),
        category: deviation.category.to_string(),
        path: if deviation.path.is_empty() {
            "/".to_string()
        } else {
            deviation.path.clone()
        },
        detail: deviation.description.clone(),
    }
}
