//! roosync: configuration reconciliation across machines.
//!
//! # Usage
//!
//! ```text
//! roosync init --shared <path> --machine <id> [--local-root <path>] [--auto-apply]
//! roosync commit list|show|apply|apply-pending|rollback|verify
//! roosync baseline show|create|aggregate|migrate
//! roosync compare [--machine <id>] [--diff] [--save | --record]
//! roosync inventory publish <file> | list
//! roosync package collect|show|verify
//! roosync rollback list|restore
//! roosync daemon [--json-logs] [--auto-apply]
//! ```
//!
//! Every command accepts `--json` for machine-readable output.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    baseline::BaselineCommand, commit::CommitCommand, compare::CompareArgs, daemon::DaemonArgs,
    init::InitArgs, inventory::InventoryCommand, package::PackageCommand,
    rollback::RollbackCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "roosync",
    version,
    about = "Reconcile machine configurations against a shared baseline",
    long_about = None,
)]
struct Cli {
    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.roosync/config.yaml for this machine.
    Init(InitArgs),

    /// Inspect and drive this machine's commit log.
    Commit {
        #[command(subcommand)]
        command: CommitCommand,
    },

    /// Manage the active non-nominative baseline.
    Baseline {
        #[command(subcommand)]
        command: BaselineCommand,
    },

    /// Compare a machine's inventory with the active baseline.
    Compare(CompareArgs),

    /// Publish or list machine inventories in the shared store.
    Inventory {
        #[command(subcommand)]
        command: InventoryCommand,
    },

    /// Collect and verify versioned configuration packages.
    Package {
        #[command(subcommand)]
        command: PackageCommand,
    },

    /// Inspect and restore local rollback points.
    Rollback {
        #[command(subcommand)]
        command: RollbackCommand,
    },

    /// Run the reconciliation daemon in the foreground.
    Daemon(DaemonArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !matches!(cli.command, Commands::Daemon(_)) {
        roosync_daemon::init_tracing("warn", false);
    }
    let json = cli.json;
    match cli.command {
        Commands::Init(args) => args.run(json),
        Commands::Commit { command } => commands::commit::run(command, json),
        Commands::Baseline { command } => commands::baseline::run(command, json),
        Commands::Compare(args) => args.run(json),
        Commands::Inventory { command } => commands::inventory::run(command, json),
        Commands::Package { command } => commands::package::run(command, json),
        Commands::Rollback { command } => commands::rollback::run(command, json),
        Commands::Daemon(args) => args.run(),
    }
}
