//! Wiring of every roosync component from one [`SyncConfig`].

use std::sync::Arc;

use serde::Serialize;

use roosync_baseline::{
    BaselineError, BaselineStore, ConfigPackages, DeviationMapper, SharedInventorySource,
};
use roosync_core::{CommitStatus, SyncConfig};
use roosync_sync::{CommitLog, FileApplier, ReconciliationPolicy, RollbackManager};

use crate::error::DaemonError;

/// The component graph of one machine.
pub struct Components {
    pub config: SyncConfig,
    pub log: CommitLog,
    pub store: Arc<BaselineStore>,
    pub inventories: Arc<SharedInventorySource>,
    pub mapper: DeviationMapper,
    pub packages: ConfigPackages,
    pub policy: ReconciliationPolicy,
}

impl Components {
    /// Build the graph. Must be called inside a tokio runtime: the commit
    /// log starts loading immediately.
    pub fn build(config: SyncConfig) -> Self {
        let retry = config.retry_policy();
        let log = CommitLog::open(&config);
        let store = Arc::new(
            BaselineStore::from_config(&config)
                .with_commit_log(log.clone(), config.machine_id.clone()),
        );
        let inventories = Arc::new(SharedInventorySource::new(config.shared_path.clone()));
        let mapper = DeviationMapper::new(
            config.shared_path.clone(),
            retry,
            Arc::clone(&store),
            inventories.clone(),
        );
        let rollback = Arc::new(RollbackManager::new(config.rollback_dir(), retry));
        let applier = Arc::new(FileApplier::new(config.apply_root()));
        let policy = ReconciliationPolicy::new(
            log.clone(),
            rollback,
            applier,
            config.machine_id.clone(),
        )
        .with_max_attempts(config.max_retries);
        let packages = ConfigPackages::from_config(&config);

        Self {
            config,
            log,
            store,
            inventories,
            mapper,
            packages,
            policy,
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    /// Active baseline the machine was compared against.
    pub baseline_id: Option<String>,
    /// Reason the pass stopped early, if it did.
    pub skipped: Option<String>,
    pub deviations: usize,
    pub recorded: Vec<u64>,
    pub applied: Vec<u64>,
    pub failed: Vec<u64>,
}

/// Collect this machine's inventory, compare it with the active baseline,
/// record the deviations and, when `auto_apply` is set, apply what is pending.
///
/// A missing baseline or inventory is not an error; the pass is skipped.
pub async fn reconcile_once(components: &Components) -> Result<TickSummary, DaemonError> {
    let machine = &components.config.machine_id;
    components.log.ready().await?;

    let report = match components.mapper.compare_with_non_nominative_baseline(machine).await {
        Ok(report) => report,
        Err(BaselineError::NoActiveBaseline) => return Ok(skipped("no active baseline")),
        Err(BaselineError::InventoryNotFound(_)) => return Ok(skipped("no inventory published")),
        Err(err) => return Err(err.into()),
    };
    let Some(baseline) = components.store.get_active_baseline().await? else {
        return Ok(skipped("no active baseline"));
    };
    if baseline.baseline_id != report.baseline_id {
        tracing::info!(
            compared = %report.baseline_id,
            active = %baseline.baseline_id,
            "baseline replaced mid-pass, deferring",
        );
        return Ok(skipped("baseline replaced during the pass"));
    }

    let mut summary = TickSummary {
        baseline_id: Some(baseline.baseline_id.clone()),
        deviations: report.differences.len(),
        recorded: components.policy.record_deviations(&report, &baseline).await?,
        ..TickSummary::default()
    };

    if components.config.auto_apply {
        for (sequence, result) in components.policy.apply_pending().await? {
            match result {
                Ok(report) if report.status == CommitStatus::Applied => summary.applied.push(sequence),
                _ => summary.failed.push(sequence),
            }
        }
    }

    tracing::info!(
        machine = %machine,
        baseline_id = %baseline.baseline_id,
        deviations = summary.deviations,
        recorded = summary.recorded.len(),
        applied = summary.applied.len(),
        failed = summary.failed.len(),
        "reconciliation pass complete",
    );
    Ok(summary)
}

fn skipped(reason: &str) -> TickSummary {
    tracing::debug!(reason, "reconciliation pass skipped");
    TickSummary {
        skipped: Some(reason.to_string()),
        ..TickSummary::default()
    }
}
