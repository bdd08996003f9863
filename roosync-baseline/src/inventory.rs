//! Where machine inventories come from.
//!
//! Collecting an inventory is someone else's job; roosync only reads the
//! result. [`InventorySource`] is the seam, [`SharedInventorySource`] the
//! built-in implementation backed by `<shared>/inventories/<machine>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use roosync_core::paths;
use roosync_core::persist::{read_optional, write_bytes_atomic};
use roosync_core::{InventoryModel, MachineId};

/// Supplies machine inventories. Called on the blocking pool, under the
/// shared-store retry policy.
pub trait InventorySource: Send + Sync + 'static {
    /// `Ok(None)` when the machine has no inventory.
    fn collect_inventory(&self, machine_id: &MachineId) -> std::io::Result<Option<InventoryModel>>;
}

#[derive(Debug, Clone)]
pub struct SharedInventorySource {
    shared: PathBuf,
}

impl SharedInventorySource {
    pub fn new(shared: PathBuf) -> Self {
        Self { shared }
    }

    pub fn path_for(&self, machine_id: &MachineId) -> PathBuf {
        paths::inventory_path(&self.shared, machine_id)
    }

    /// Atomically write `inventory` as its machine's current inventory.
    pub fn publish(&self, inventory: &InventoryModel) -> std::io::Result<PathBuf> {
        if !inventory.machine_id.is_valid() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid machine id '{}'", inventory.machine_id),
            ));
        }
        let path = self.path_for(&inventory.machine_id);
        let bytes = serde_json::to_vec_pretty(inventory).map_err(std::io::Error::other)?;
        write_bytes_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Every published inventory, sorted by machine id.
    ///
    /// Unparseable files are skipped with a warning.
    pub fn list(&self) -> std::io::Result<Vec<InventoryModel>> {
        let dir = paths::inventories_dir(&self.shared);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut inventories = Vec::new();
        for item in read_dir {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match parse(&path, &std::fs::read(&path)?) {
                Ok(inventory) => inventories.push(inventory),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unreadable inventory"),
            }
        }
        inventories.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        Ok(inventories)
    }
}

impl InventorySource for SharedInventorySource {
    fn collect_inventory(&self, machine_id: &MachineId) -> std::io::Result<Option<InventoryModel>> {
        let path = self.path_for(machine_id);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        parse(&path, &bytes).map(Some)
    }
}

fn parse(path: &Path, bytes: &[u8]) -> std::io::Result<InventoryModel> {
    serde_json::from_slice(bytes).map_err(|err| {
        std::io::Error::new(
            ErrorKind::InvalidData,
            format!("{}: {err}", path.display()),
        )
    })
}
