//! `roosync baseline`: show, author, aggregate and migrate the active baseline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use roosync_baseline::{AggregationConfig, ConsensusStrategy, MigrationOptions};
use roosync_core::{Baseline, MachineId, Profile, ProfileCategory};
use roosync_daemon::Components;

use super::{block_on, blocking, load_config, print_json};

#[derive(Subcommand, Debug)]
pub enum BaselineCommand {
    /// Show the active baseline.
    Show,
    /// Make a baseline from a JSON file holding an array of profiles.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// JSON array of profiles.
        #[arg(long)]
        profiles: PathBuf,
    },
    /// Derive the baseline from published inventories by consensus.
    Aggregate(AggregateArgs),
    /// Convert the legacy sync-config.ref.json into the active baseline.
    Migrate {
        #[arg(long)]
        name: Option<String>,
        /// Skip copying the old files to baseline-backups/.
        #[arg(long)]
        no_backup: bool,
    },
}

#[derive(Args, Debug)]
pub struct AggregateArgs {
    #[arg(long)]
    pub name: String,
    /// Machines to aggregate; every published inventory when omitted.
    #[arg(long = "machine", value_name = "ID")]
    pub machines: Vec<String>,
    /// Confidence threshold for categories without their own.
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,
    /// Per-category threshold, e.g. `roo-core=0.8`.
    #[arg(long = "category-threshold", value_name = "CATEGORY=T", value_parser = parse_category_threshold)]
    pub category_thresholds: Vec<(ProfileCategory, f64)>,
    /// Per-machine weight, e.g. `build-server=3`.
    #[arg(long = "weight", value_name = "MACHINE=W", value_parser = parse_weight)]
    pub weights: Vec<(MachineId, f64)>,
    /// Require every machine to agree.
    #[arg(long)]
    pub unanimous: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "profile")]
    id: String,
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "priority")]
    priority: i32,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "tags")]
    tags: String,
}

pub fn run(command: BaselineCommand, json: bool) -> Result<()> {
    let config = load_config()?;
    block_on(async move {
        let components = Components::build(config);
        match command {
            BaselineCommand::Show => {
                let baseline = components
                    .store
                    .get_active_baseline()
                    .await
                    .context("failed to read active baseline")?;
                match (baseline, json) {
                    (baseline, true) => print_json(&baseline),
                    (Some(baseline), false) => {
                        print_baseline(&baseline);
                        Ok(())
                    }
                    (None, false) => {
                        println!("No active baseline. Run 'roosync baseline create|aggregate|migrate'.");
                        Ok(())
                    }
                }
            }
            BaselineCommand::Create {
                name,
                description,
                profiles,
            } => {
                let bytes = std::fs::read(&profiles)
                    .with_context(|| format!("cannot read '{}'", profiles.display()))?;
                let parsed: Vec<Profile> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("'{}' is not a JSON array of profiles", profiles.display()))?;
                let baseline = components
                    .store
                    .create_baseline(&name, &description, parsed)
                    .await
                    .context("failed to create baseline")?;
                report_installed(&baseline, json)
            }
            BaselineCommand::Aggregate(args) => aggregate(&components, args, json).await,
            BaselineCommand::Migrate { name, no_backup } => {
                let outcome = components
                    .store
                    .migrate_to_non_nominative(MigrationOptions {
                        create_backup: !no_backup,
                        name,
                    })
                    .await
                    .context("migration failed")?;
                if json {
                    return print_json(&json!({
                        "success": outcome.success,
                        "profilesCount": outcome.profiles_count,
                        "newBaseline": outcome.new_baseline,
                    }));
                }
                println!(
                    "✓ Migrated {} profile(s) into baseline '{}'",
                    outcome.profiles_count, outcome.new_baseline.name
                );
                Ok(())
            }
        }
    })?
}

async fn aggregate(components: &Components, args: AggregateArgs, json: bool) -> Result<()> {
    let source = Arc::clone(&components.inventories);
    let mut inventories = blocking(move || source.list())
        .await
        .context("failed to list inventories")?;
    if !args.machines.is_empty() {
        let wanted: Vec<MachineId> = args.machines.iter().map(|m| MachineId::from(m.as_str())).collect();
        for machine in &wanted {
            if !inventories.iter().any(|i| &i.machine_id == machine) {
                bail!("no inventory published for machine '{machine}'");
            }
        }
        inventories.retain(|i| wanted.contains(&i.machine_id));
    }
    if inventories.is_empty() {
        bail!("no inventories published; run 'roosync inventory publish' first");
    }

    let config = AggregationConfig {
        strategy: if args.unanimous {
            ConsensusStrategy::Unanimous
        } else {
            ConsensusStrategy::Majority
        },
        default_threshold: args.threshold,
        thresholds: args.category_thresholds.into_iter().collect(),
        weights: args.weights.into_iter().collect(),
    };
    let outcome = components
        .store
        .aggregate_baseline(&args.name, &inventories, &config)
        .await
        .context("aggregation failed")?;

    if json {
        return print_json(&json!({
            "baseline": outcome.baseline,
            "conflicts": outcome.conflicts,
        }));
    }
    print_baseline(&outcome.baseline);
    for conflict in &outcome.conflicts {
        println!(
            "{} {} omitted: support {:.2} below {:.2} across {} value(s)",
            "!".yellow().bold(),
            conflict.category,
            conflict.support,
            conflict.threshold,
            conflict.candidates
        );
    }
    Ok(())
}

fn report_installed(baseline: &Baseline, json: bool) -> Result<()> {
    if json {
        return print_json(baseline);
    }
    println!(
        "✓ Baseline '{}' is now active ({} profile(s))",
        baseline.name,
        baseline.profiles.len()
    );
    Ok(())
}

fn print_baseline(baseline: &Baseline) {
    println!("{} {}", baseline.name.bold(), baseline.baseline_id.bright_black());
    if !baseline.description.is_empty() {
        println!("{}", baseline.description);
    }
    println!("created {}", baseline.timestamp.to_rfc3339());
    let rows: Vec<ProfileRow> = baseline
        .profiles
        .iter()
        .map(|p| ProfileRow {
            id: p.profile_id.clone(),
            category: p.category.to_string(),
            priority: p.priority,
            version: p.metadata.version.clone(),
            tags: p.metadata.tags.join(", "),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn parse_category_threshold(raw: &str) -> Result<(ProfileCategory, f64), String> {
    let (category, value) = split_pair(raw)?;
    Ok((category.parse()?, parse_number(value)?))
}

fn parse_weight(raw: &str) -> Result<(MachineId, f64), String> {
    let (machine, value) = split_pair(raw)?;
    Ok((MachineId::from(machine), parse_number(value)?))
}

fn split_pair(raw: &str) -> Result<(&str, &str), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn parse_number(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("'{raw}' is not a number"))
}
