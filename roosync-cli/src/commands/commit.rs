//! `roosync commit`: inspect and drive this machine's commit log.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use roosync_core::{CommitEntry, CommitPayload};
use roosync_daemon::Components;
use roosync_sync::EntryApplyReport;

use super::{block_on, load_config, print_json, severity_label, status_label};

#[derive(Subcommand, Debug)]
pub enum CommitCommand {
    /// Show the newest entries.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one entry in full.
    Show { sequence: u64 },
    /// Apply one PENDING or RETRY entry.
    Apply { sequence: u64 },
    /// Apply every unresolved entry, in order.
    ApplyPending,
    /// Undo an APPLIED entry, restoring its rollback point.
    Rollback {
        sequence: u64,
        #[arg(long)]
        reason: String,
    },
    /// Re-hash every entry and report inconsistencies.
    Verify,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "seq")]
    sequence: u64,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "summary")]
    summary: String,
    #[tabled(rename = "created")]
    created: String,
}

pub fn run(command: CommitCommand, json: bool) -> Result<()> {
    let config = load_config()?;
    block_on(async move {
        let components = Components::build(config);
        components
            .log
            .ready()
            .await
            .context("commit log is unavailable")?;
        match command {
            CommitCommand::List { limit } => list(&components, limit, json).await,
            CommitCommand::Show { sequence } => show(&components, sequence, json).await,
            CommitCommand::Apply { sequence } => {
                let report = components
                    .policy
                    .apply_entry(sequence)
                    .await
                    .with_context(|| format!("failed to apply entry {sequence}"))?;
                print_apply_reports(&[report], json)
            }
            CommitCommand::ApplyPending => {
                let results = components
                    .policy
                    .apply_pending()
                    .await
                    .context("failed to apply pending entries")?;
                let mut reports = Vec::new();
                for (sequence, result) in results {
                    match result {
                        Ok(report) => reports.push(report),
                        Err(err) => eprintln!("{} entry {sequence}: {err}", "✗".red()),
                    }
                }
                print_apply_reports(&reports, json)
            }
            CommitCommand::Rollback { sequence, reason } => {
                let report = components
                    .policy
                    .rollback_entry(sequence, &reason)
                    .await
                    .with_context(|| format!("failed to roll back entry {sequence}"))?;
                if json {
                    return print_json(&report);
                }
                println!(
                    "✓ Entry {sequence} rolled back ({} file(s) restored)",
                    report.restored_files.len()
                );
                Ok(())
            }
            CommitCommand::Verify => verify(&components, json).await,
        }
    })?
}

async fn list(components: &Components, limit: usize, json: bool) -> Result<()> {
    let latest = components
        .log
        .get_latest_commits(limit)
        .await
        .context("failed to read commit log")?;
    if json {
        return print_json(&json!({
            "totalCount": latest.total_count,
            "entries": latest.entries,
        }));
    }
    if latest.entries.is_empty() {
        println!("No commit entries.");
        return Ok(());
    }
    let rows: Vec<EntryRow> = latest.entries.iter().map(entry_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{} of {} entries",
        latest.entries.len(),
        latest.total_count
    );
    Ok(())
}

async fn show(components: &Components, sequence: u64, json: bool) -> Result<()> {
    let Some(entry) = components
        .log
        .get_commit(sequence)
        .await
        .context("failed to read commit log")?
    else {
        bail!("no commit entry with sequence {sequence}");
    };
    if json {
        return print_json(&entry);
    }
    println!("{} #{}", entry.commit_type().to_string().bold(), entry.sequence_number);
    println!("  status:   {}", status_label(entry.status));
    println!("  machine:  {}", entry.machine_id);
    println!("  created:  {}", entry.created_at.to_rfc3339());
    if let Some(applied) = entry.applied_at {
        println!("  applied:  {}", applied.to_rfc3339());
    }
    if let Some(rolled_back) = entry.rolled_back_at {
        println!("  rolled back: {}", rolled_back.to_rfc3339());
    }
    if let Some(reason) = &entry.rollback_reason {
        println!("  reason:   {reason}");
    }
    if entry.attempts > 0 {
        println!("  attempts: {}", entry.attempts);
    }
    if let Some(error) = &entry.last_error {
        println!("  error:    {}", error.red());
    }
    println!("  hash:     {}", entry.content_hash);
    println!(
        "{}",
        entry
            .payload
            .data()
            .and_then(|data| serde_json::to_string_pretty(&data))
            .context("failed to render payload")?
    );
    Ok(())
}

async fn verify(components: &Components, json: bool) -> Result<()> {
    let report = components
        .log
        .verify_consistency()
        .await
        .context("failed to verify commit log")?;
    if json {
        print_json(&report)?;
    } else if report.is_consistent {
        println!("✓ Commit log is consistent");
    } else {
        for issue in &report.inconsistent_entries {
            println!("{} entry {}: {}", "✗".red(), issue.sequence_number, issue.issue);
        }
    }
    if !report.is_consistent {
        bail!(
            "{} inconsistent commit entr(ies)",
            report.inconsistent_entries.len()
        );
    }
    Ok(())
}

fn print_apply_reports(reports: &[EntryApplyReport], json: bool) -> Result<()> {
    if json {
        let payload: Vec<_> = reports
            .iter()
            .map(|r| {
                json!({
                    "sequenceNumber": r.sequence_number,
                    "status": r.status,
                    "filesApplied": r.files_applied,
                    "errors": r.errors,
                })
            })
            .collect();
        return print_json(&payload);
    }
    if reports.is_empty() {
        println!("Nothing to apply.");
    }
    for report in reports {
        println!(
            "{} entry {} → {} ({} file(s))",
            if report.errors.is_empty() { "✓".green() } else { "✗".red() },
            report.sequence_number,
            status_label(report.status),
            report.files_applied.len(),
        );
        for error in &report.errors {
            println!("    {}", error.red());
        }
    }
    Ok(())
}

fn entry_row(entry: &CommitEntry) -> EntryRow {
    EntryRow {
        sequence: entry.sequence_number,
        kind: entry.commit_type().to_string(),
        status: status_label(entry.status).to_string(),
        summary: summarize(&entry.payload),
        created: entry.created_at.format("%Y-%m-%d %H:%M").to_string(),
    }
}

fn summarize(payload: &CommitPayload) -> String {
    match payload {
        CommitPayload::Baseline(commit) => format!(
            "{:?} baseline {} ({} profiles)",
            commit.action, commit.baseline_id, commit.profiles_count
        ),
        CommitPayload::Config(commit) => format!(
            "{} {} ({} deviation(s))",
            severity_label(commit.severity),
            commit.category,
            commit.deviation_count
        ),
        CommitPayload::Sync(commit) => format!(
            "sync from {} ({} categories)",
            commit.source_machine,
            commit.categories.len()
        ),
        CommitPayload::Decision(commit) => commit.title.clone(),
    }
}
