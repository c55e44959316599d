//! SnapshotStore: atomic file persistence of the inventory with SHA-256
//! integrity and write locking.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

use super::inventory::Inventory;

/// An inventory wrapped with integrity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// SHA-256 of the serialized inventory: "sha256:<hex>"
    pub checksum: String,
    pub saved_at: DateTime<Utc>,
    pub writer_version: String,
    pub inventory: Inventory,
}

fn checksum(inventory: &Inventory) -> Result<String> {
    let serialized = serde_json::to_string(inventory).context("serializing inventory")?;
    Ok(format!("sha256:{:x}", Sha256::digest(serialized.as_bytes())))
}

impl Snapshot {
    pub fn new(inventory: Inventory) -> Result<Self> {
        Ok(Self {
            checksum: checksum(&inventory)?,
            saved_at: Utc::now(),
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
            inventory,
        })
    }

    pub fn verify(&self) -> bool {
        checksum(&self.inventory).is_ok_and(|c| c == self.checksum)
    }
}

pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Serialize to `<path>.tmp` and rename over the snapshot, so readers
    /// only ever see a complete file.
    pub async fn write(&self, inventory: &Inventory) -> Result<Snapshot> {
        let _guard = self.write_lock.lock().await;

        // Checksum the inventory as it will be written
        let snapshot = Snapshot::new(inventory.clone())?;
        let content =
            serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
        }

        // Write to a temporary file first
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(|| format!("writing temp file {}", tmp_path.display()))?;

        // Atomic rename
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| {
                format!("renaming {} to {}", tmp_path.display(), self.path.display())
            })?;

        Ok(snapshot)
    }

    /// Read the snapshot and verify its checksum.
    pub async fn read(&self) -> Result<Snapshot> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;

        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;

        // Verify integrity
        if !snapshot.verify() {
            warn!(path = %self.path.display(), "snapshot checksum mismatch");
            bail!("checksum verification failed for {}", self.path.display());
        }

        Ok(snapshot)
    }
}
