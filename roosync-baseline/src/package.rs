//! Versioned configuration packages in the shared store.
//!
//! ```text
//! <shared>/packages/<machine>/
//!   latest.json                 {"path": "<version>"}
//!   <version>/manifest.json     PackageManifest
//!   <version>/<artifact>        byte-exact copies of the collected files
//! ```
//!
//! Versions are UTC timestamps with millisecond precision, so they sort in
//! creation order.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roosync_core::digest::sha256_hex;
use roosync_core::paths::{self, MANIFEST_FILE};
use roosync_core::persist::{load_json, persist_json, read_optional, retry_io, write_bytes_atomic};
use roosync_core::{MachineId, RetryPolicy, SyncConfig};

use crate::error::BaselineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageFile {
    /// Artifact name inside the version directory.
    pub path: String,
    /// Where the file was collected from.
    pub source: PathBuf,
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub files: Vec<PackageFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    path: String,
}

/// Result of re-hashing a package's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVerification {
    pub version: String,
    pub is_valid: bool,
    pub issues: Vec<String>,
}

pub struct ConfigPackages {
    shared: PathBuf,
    policy: RetryPolicy,
}

impl ConfigPackages {
    pub fn new(shared: PathBuf, policy: RetryPolicy) -> Self {
        Self { shared, policy }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.shared_path.clone(), config.retry_policy())
    }

    fn version_dir(&self, machine: &MachineId, version: &str) -> PathBuf {
        paths::packages_dir(&self.shared, machine).join(version)
    }

    /// Copy `files` into a new package version and point `latest.json` at it.
    pub async fn collect_package(
        &self,
        machine: &MachineId,
        files: &[PathBuf],
        author: &str,
        description: &str,
    ) -> Result<PackageManifest, BaselineError> {
        if !machine.is_valid() {
            return Err(BaselineError::Validation(format!("invalid machine id '{machine}'")));
        }
        if files.is_empty() {
            return Err(BaselineError::Validation(
                "a package needs at least one file".to_string(),
            ));
        }

        let timestamp = Utc::now();
        let version = timestamp.format("%Y%m%dT%H%M%S%3fZ").to_string();
        let dir = self.version_dir(machine, &version);
        let target = dir.clone();
        let sources = files.to_vec();
        let collected = retry_io(&self.policy, &dir, move || copy_artifacts(&target, &sources)).await?;

        let manifest = PackageManifest {
            version: version.clone(),
            timestamp,
            author: author.to_string(),
            description: description.to_string(),
            files: collected,
        };
        persist_json(&self.policy, &dir.join(MANIFEST_FILE), &manifest).await?;
        persist_json(
            &self.policy,
            &paths::latest_package_pointer(&self.shared, machine),
            &LatestPointer { path: version },
        )
        .await?;
        tracing::info!(
            machine = %machine,
            version = %manifest.version,
            files = manifest.files.len(),
            "config package collected",
        );
        Ok(manifest)
    }

    pub async fn load_package(
        &self,
        machine: &MachineId,
        version: &str,
    ) -> Result<Option<PackageManifest>, BaselineError> {
        check_version(version)?;
        let manifest = self.version_dir(machine, version).join(MANIFEST_FILE);
        Ok(load_json(&self.policy, &manifest).await?)
    }

    /// Version named by `latest.json`, if any (the machine's config version).
    pub async fn latest_version(&self, machine: &MachineId) -> Result<Option<String>, BaselineError> {
        let pointer: Option<LatestPointer> =
            load_json(&self.policy, &paths::latest_package_pointer(&self.shared, machine)).await?;
        match pointer {
            Some(pointer) => {
                check_version(&pointer.path)?;
                Ok(Some(pointer.path))
            }
            None => Ok(None),
        }
    }

    pub async fn load_latest(&self, machine: &MachineId) -> Result<Option<PackageManifest>, BaselineError> {
        match self.latest_version(machine).await? {
            Some(version) => self.load_package(machine, &version).await,
            None => Ok(None),
        }
    }

    /// Re-hash every artifact of `version` against its manifest.
    pub async fn verify_package(
        &self,
        machine: &MachineId,
        version: &str,
    ) -> Result<PackageVerification, BaselineError> {
        let manifest = self
            .load_package(machine, version)
            .await?
            .ok_or_else(|| BaselineError::PackageNotFound {
                machine: machine.clone(),
                version: version.to_string(),
            })?;
        let dir = self.version_dir(machine, version);
        let target = dir.clone();
        let files = manifest.files.clone();
        let issues = retry_io(&self.policy, &dir, move || check_artifacts(&target, &files)).await?;
        if !issues.is_empty() {
            tracing::warn!(machine = %machine, version, issues = issues.len(), "config package failed verification");
        }
        Ok(PackageVerification {
            version: manifest.version,
            is_valid: issues.is_empty(),
            issues,
        })
    }
}

/// Versions are directory names under the machine's package dir.
fn check_version(version: &str) -> Result<(), BaselineError> {
    let mut components = Path::new(version).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(BaselineError::Validation(format!(
            "invalid package version '{version}'"
        ))),
    }
}

fn artifact_kind(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => "json",
        Some("yaml" | "yml") => "yaml",
        Some("toml") => "toml",
        Some("md") => "markdown",
        Some("ps1" | "psm1") => "powershell",
        _ => "file",
    }
}

fn copy_artifacts(dir: &Path, sources: &[PathBuf]) -> std::io::Result<Vec<PackageFile>> {
    let mut names = HashSet::new();
    let mut collected = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let Some(bytes) = read_optional(source)? else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", source.display()),
            ));
        };
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("artifact-{index}"));
        let name = if names.contains(&base) {
            format!("{index}-{base}")
        } else {
            base
        };
        names.insert(name.clone());

        write_bytes_atomic(&dir.join(&name), &bytes)?;
        collected.push(PackageFile {
            path: name,
            source: source.clone(),
            hash: sha256_hex(&bytes),
            kind: artifact_kind(source).to_string(),
            size: bytes.len() as u64,
        });
    }
    Ok(collected)
}

fn check_artifacts(dir: &Path, files: &[PackageFile]) -> std::io::Result<Vec<String>> {
    let mut issues = Vec::new();
    for file in files {
        match read_optional(&dir.join(&file.path))? {
            None => issues.push(format!("{}: missing", file.path)),
            Some(bytes) => {
                if bytes.len() as u64 != file.size {
                    issues.push(format!(
                        "{}: size {} differs from recorded {}",
                        file.path,
                        bytes.len(),
                        file.size
                    ));
                }
                if sha256_hex(&bytes) != file.hash {
                    issues.push(format!("{}: hash mismatch", file.path));
                }
            }
        }
    }
    Ok(issues)
}
