use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

use roosync_core::paths::BASELINE_FILE;
use roosync_core::SyncConfig;

use crate::components::{reconcile_once, Components};
use crate::error::{io_err, DaemonError};

/// Baseline writes closer together than this trigger a single pass.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Install the global subscriber on stderr. `RUST_LOG` overrides
/// `default_directive`.
pub fn init_tracing(default_directive: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(config: SyncConfig) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run until ctrl-c.
pub async fn run(config: SyncConfig) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    run_with_shutdown(config, shutdown_tx).await
}

/// Run until something is sent on `shutdown_tx` (or ctrl-c arrives).
///
/// Tasks: a reconciliation loop on the auto-sync interval, a watcher on the
/// shared baseline file that requests an early pass, and a signal handler.
/// The first task to finish brings the others down.
pub async fn run_with_shutdown(
    config: SyncConfig,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    config.validate()?;
    ensure_shared_dir(&config.shared_path)?;

    let components = Components::build(config);
    components.log.ready().await?;
    components.log.start_auto_sync();
    tracing::info!(
        machine = %components.config.machine_id,
        shared = %components.config.shared_path.display(),
        interval_secs = components.config.auto_sync_interval_secs,
        auto_apply = components.config.auto_apply,
        "roosync daemon started",
    );

    let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
    let shared = components.config.shared_path.clone();
    let interval = components.config.auto_sync_interval();
    let log = components.log.clone();

    let reconcile_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = reconcile_task(components, interval, trigger_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watcher_task(shared, trigger_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task {
                            task: "signal_handler",
                            message: format!("ctrl-c handler failed: {err}"),
                        }),
                    }
                }
            }
        })
    };

    let (reconcile_result, watcher_result, signal_result) =
        tokio::join!(reconcile_handle, watcher_handle, signal_handle);
    log.stop_auto_sync();
    tracing::info!("roosync daemon stopped");

    handle_join("reconcile", reconcile_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn reconcile_task(
    components: Components,
    interval: Duration,
    mut trigger_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let source = tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => "interval",
            trigger = trigger_rx.recv() => match trigger {
                Some(()) => "baseline-change",
                // The watcher is gone; keep ticking on the interval alone.
                None => {
                    ticker.tick().await;
                    "interval"
                }
            },
        };

        // A failed pass is logged and retried on the next tick.
        match reconcile_once(&components).await {
            Ok(summary) => tracing::debug!(source, ?summary, "reconciliation pass finished"),
            Err(err) => tracing::error!(source, error = %err, "reconciliation pass failed"),
        }
    }
    Ok(())
}

async fn watcher_task(
    shared: PathBuf,
    trigger_tx: mpsc::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // Events arrive with resolved paths (e.g. /private/var/... on macOS).
    let shared = fs::canonicalize(&shared).unwrap_or(shared);
    let baseline = shared.join(BASELINE_FILE);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    // The baseline is replaced by rename, so watch its directory.
    if let Err(err) = watcher.watch(&shared, RecursiveMode::NonRecursive) {
        tracing::warn!(
            path = %shared.display(),
            error = %err,
            "cannot watch shared store, relying on the interval alone",
        );
        let _ = shutdown_rx.recv().await;
        return Ok(());
    }

    let mut debounce = Debounce::new(DEBOUNCE_WINDOW);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !touches_baseline(&event, &baseline) || !debounce.admit(Instant::now()) {
                    continue;
                }
                tracing::info!(path = %baseline.display(), "active baseline changed");
                // A full channel already holds a pending pass.
                let _ = trigger_tx.try_send(());
            }
        }
    }
    Ok(())
}

fn touches_baseline(event: &Event, baseline: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == baseline)
}

/// Leading-edge debounce over a single event source.
#[derive(Debug)]
struct Debounce {
    window: Duration,
    last: Option<Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    fn admit(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

fn ensure_shared_dir(shared: &Path) -> Result<(), DaemonError> {
    if !shared.exists() {
        fs::create_dir_all(shared).map_err(|e| io_err(shared, e))?;
    }
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: format!("join failure: {err}"),
        }),
    }
}
