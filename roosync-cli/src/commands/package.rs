//! `roosync package`: versioned configuration packages.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use roosync_baseline::{ConfigPackages, PackageManifest};
use roosync_core::{MachineId, SyncConfig};

use super::{block_on, load_config, print_json};

#[derive(Subcommand, Debug)]
pub enum PackageCommand {
    /// Copy files into a new package version and make it the latest.
    Collect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show a package manifest (the latest when no version is given).
    Show {
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        machine: Option<String>,
    },
    /// Re-hash a package's artifacts against its manifest.
    Verify {
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        machine: Option<String>,
    },
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "file")]
    path: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "size")]
    size: u64,
    #[tabled(rename = "sha256")]
    hash: String,
}

pub fn run(command: PackageCommand, json: bool) -> Result<()> {
    let config = load_config()?;
    let packages = ConfigPackages::from_config(&config);
    block_on(async move {
        match command {
            PackageCommand::Collect {
                files,
                author,
                description,
            } => {
                let author = author.unwrap_or_else(|| config.machine_id.to_string());
                let manifest = packages
                    .collect_package(&config.machine_id, &files, &author, &description)
                    .await
                    .context("failed to collect package")?;
                if json {
                    return print_json(&manifest);
                }
                println!(
                    "✓ Package {} collected ({} file(s))",
                    manifest.version,
                    manifest.files.len()
                );
                Ok(())
            }
            PackageCommand::Show { version, machine } => {
                let machine = machine_or_self(&config, machine);
                let version = resolve_version(&packages, &machine, version).await?;
                let manifest = packages
                    .load_package(&machine, &version)
                    .await
                    .context("failed to read package")?
                    .with_context(|| format!("package {version} of '{machine}' not found"))?;
                if json {
                    return print_json(&manifest);
                }
                print_manifest(&manifest);
                Ok(())
            }
            PackageCommand::Verify { version, machine } => {
                let machine = machine_or_self(&config, machine);
                let version = resolve_version(&packages, &machine, version).await?;
                let report = packages
                    .verify_package(&machine, &version)
                    .await
                    .context("failed to verify package")?;
                if json {
                    print_json(&report)?;
                } else if report.is_valid {
                    println!("✓ Package {} is intact", report.version);
                } else {
                    for issue in &report.issues {
                        println!("{} {issue}", "✗".red());
                    }
                }
                if !report.is_valid {
                    bail!("package {} failed verification", report.version);
                }
                Ok(())
            }
        }
    })?
}

fn machine_or_self(config: &SyncConfig, machine: Option<String>) -> MachineId {
    machine
        .map(|m| MachineId::from(m.as_str()))
        .unwrap_or_else(|| config.machine_id.clone())
}

async fn resolve_version(
    packages: &ConfigPackages,
    machine: &MachineId,
    version: Option<String>,
) -> Result<String> {
    if let Some(version) = version {
        return Ok(version);
    }
    packages
        .latest_version(machine)
        .await
        .context("failed to read latest package pointer")?
        .with_context(|| format!("no package collected for '{machine}'"))
}

fn print_manifest(manifest: &PackageManifest) {
    println!("{} {}", "package".bold(), manifest.version);
    println!("  author:  {}", manifest.author);
    println!("  created: {}", manifest.timestamp.to_rfc3339());
    if !manifest.description.is_empty() {
        println!("  {}", manifest.description);
    }
    let rows: Vec<ArtifactRow> = manifest
        .files
        .iter()
        .map(|file| ArtifactRow {
            path: file.path.clone(),
            kind: file.kind.clone(),
            size: file.size,
            hash: file.hash.chars().take(12).collect(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
