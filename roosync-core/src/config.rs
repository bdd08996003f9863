//! Local configuration: one [`SyncConfig`] per machine.
//!
//! # Storage layout
//!
//! ```text
//! ~/.roosync/
//!   config.yaml   (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Environment overrides (`ROOSYNC_SHARED_PATH`, `ROOSYNC_MACHINE_ID`) are
//! applied by [`load_at`] after parsing and before validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths;
use crate::persist::RetryPolicy;
use crate::types::MachineId;

pub const ENV_SHARED_PATH: &str = "ROOSYNC_SHARED_PATH";
pub const ENV_MACHINE_ID: &str = "ROOSYNC_MACHINE_ID";

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    200
}
fn default_io_timeout_ms() -> u64 {
    10_000
}
fn default_auto_sync_interval_secs() -> u64 {
    300
}

/// Every tunable of a roosync node, supplied once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root of the shared storage location every machine polls.
    pub shared_path: PathBuf,
    /// This machine's identity inside the shared store.
    pub machine_id: MachineId,
    /// Root for machine-local state (rollback points, applied configs).
    pub local_root: PathBuf,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    #[serde(default = "default_auto_sync_interval_secs")]
    pub auto_sync_interval_secs: u64,
    /// Apply pending entries automatically on every reconciliation tick.
    #[serde(default)]
    pub auto_apply: bool,
}

impl SyncConfig {
    /// A config with default tunables.
    pub fn new(shared_path: PathBuf, machine_id: MachineId, local_root: PathBuf) -> Self {
        Self {
            shared_path,
            machine_id,
            local_root,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            auto_sync_interval_secs: default_auto_sync_interval_secs(),
            auto_apply: false,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
            timeout: Duration::from_millis(self.io_timeout_ms),
        }
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }

    /// `<local_root>/rollback/`
    pub fn rollback_dir(&self) -> PathBuf {
        paths::rollback_dir(&self.local_root)
    }

    /// `<local_root>/applied/`
    pub fn apply_root(&self) -> PathBuf {
        paths::apply_root(&self.local_root)
    }

    /// `<shared>/commit-log/<machine_id>/`
    pub fn commit_log_dir(&self) -> PathBuf {
        paths::commit_log_dir(&self.shared_path, &self.machine_id)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(shared) = lookup(ENV_SHARED_PATH).filter(|v| !v.trim().is_empty()) {
            self.shared_path = PathBuf::from(shared);
        }
        if let Some(machine) = lookup(ENV_MACHINE_ID).filter(|v| !v.trim().is_empty()) {
            self.machine_id = MachineId::from(machine.trim());
        }
    }

    /// Reject values the rest of the system cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.machine_id.is_valid() {
            return Err(ConfigError::Invalid {
                field: "machine_id",
                reason: format!(
                    "'{}' must be non-empty and use only [A-Za-z0-9._-]",
                    self.machine_id
                ),
            });
        }
        if self.shared_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "shared_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_retries",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "io_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.auto_sync_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "auto_sync_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load, apply env overrides and validate `<home>/.roosync/config.yaml`.
pub fn load_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    let mut config = read_at(home)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&home()?)
}

/// Parse the config file exactly as written, without overrides or validation.
pub fn read_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    let path = paths::config_path(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// Atomically save the config to `<home>/.roosync/config.yaml`.
///
/// Write flow: validate → serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SyncConfig) -> Result<PathBuf, ConfigError> {
    config.validate()?;
    let path = paths::config_path(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &SyncConfig) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, config)
}

/// `$HOME`, or [`ConfigError::HomeNotFound`].
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
