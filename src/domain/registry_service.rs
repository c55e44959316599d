//! Registry service: the inventory behind a lock plus the optional snapshot store.
//!
//! Reads take a shared lock. Writes run against a draft copy of the
//! inventory; the draft is persisted and swapped in only if the whole
//! operation succeeds, so bulk writes are all-or-nothing.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

use super::error::RegistryError;
use super::host::HostSeed;
use super::inventory::Inventory;
use super::snapshot_store::SnapshotStore;

pub struct RegistryService {
    state: RwLock<Inventory>,
    store: Option<SnapshotStore>,
    changelog_retention: Option<Duration>,
}

impl RegistryService {
    pub fn new(inventory: Inventory, store: Option<SnapshotStore>) -> Arc<Self> {
        Self::with_retention(inventory, store, 0)
    }

    /// Like `new`, pruning change log entries older than `retention_days`
    /// on every write (0 keeps everything).
    pub fn with_retention(inventory: Inventory, store: Option<SnapshotStore>, retention_days: u32) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(inventory),
            store,
            changelog_retention: (retention_days > 0).then(|| Duration::days(i64::from(retention_days))),
        })
    }

    /// Build the service from config: the persisted snapshot if one exists and
    /// verifies, otherwise a fresh inventory from the host seed file.
    pub async fn load(config: &ServerConfig) -> Result<Arc<Self>> {
        let store = config.data_file.clone().map(SnapshotStore::new);

        let restored = match &store {
            Some(store) if store.exists() => match store.read().await {
                Ok(snapshot) => {
                    info!(
                        path = %store.path().display(),
                        checksum = %snapshot.checksum,
                        saved_at = %snapshot.saved_at,
                        "loaded registry snapshot"
                    );
                    Some(snapshot.inventory)
                }
                Err(e) => {
                    warn!(error = %e, "failed to load registry snapshot, reseeding");
                    None
                }
            },
            _ => None,
        };
        if let Some(inventory) = restored {
            return Ok(Self::with_retention(inventory, store, config.changelog_retention_days));
        }

        // No usable snapshot: start from the host seed
        let inventory = match &config.inventory_file {
            Some(path) => {
                let seed = HostSeed::load(path)?;
                let (sites, racks, devices) = seed.resolve()?;
                info!(
                    sites = sites.len(),
                    racks = racks.len(),
                    devices = devices.len(),
                    "seeded host inventory"
                );
                Inventory::from_host(sites, racks, devices)
            }
            None => {
                warn!("no inventory_file configured, host inventory is empty");
                Inventory::default()
            }
        };

        Ok(Self::with_retention(inventory, store, config.changelog_retention_days))
    }

    /// Run `f` against the current inventory.
    pub async fn read<R>(&self, f: impl FnOnce(&Inventory) -> R) -> R {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Run `f` against a draft of the inventory at time `now`; commit the
    /// draft only when `f` succeeds and the snapshot (if any) is written.
    pub async fn write_at<R>(
        &self,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Inventory, DateTime<Utc>) -> Result<R, RegistryError>,
    ) -> Result<R, RegistryError> {
        let mut guard = self.state.write().await;
        let mut draft = guard.clone();
        let out = f(&mut draft, now)?;

        // Expire old change log entries before the draft is persisted
        if let Some(retention) = self.changelog_retention {
            let pruned = draft.prune_changelog(now - retention);
            if pruned > 0 {
                debug!(pruned, "expired change log entries");
            }
        }

        // Persist first; the in-memory state only moves once the file is written
        if let Some(store) = &self.store {
            store.write(&draft).await?;
        }
        *guard = draft;
        Ok(out)
    }

    pub async fn write<R>(
        &self,
        f: impl FnOnce(&mut Inventory, DateTime<Utc>) -> Result<R, RegistryError>,
    ) -> Result<R, RegistryError> {
        self.write_at(Utc::now(), f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ObjectKind;
    use crate::domain::forms::OsdForm;
    use crate::domain::inventory::tests::{seeded, t0};
    use serde_json::json;

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let service = RegistryService::new(seeded(), None);
        let result = service
            .write_at(t0(), |inv, now| {
                let ok = OsdForm::from_value(json!({"device": 1, "name": "osd.0"})).unwrap();
                inv.create_osd(&ok, now)?;
                let dup = OsdForm::from_value(json!({"device": 1, "name": "osd.0"})).unwrap();
                inv.create_osd(&dup, now)
            })
            .await;
        assert!(matches!(result, Err(RegistryError::Validation(_))));
        assert_eq!(service.read(|inv| inv.osds().len()).await, 0);
    }

    #[tokio::test]
    async fn successful_write_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let service = RegistryService::new(seeded(), Some(SnapshotStore::new(path.clone())));
        service
            .write_at(t0(), |inv, now| {
                let form = OsdForm::from_value(json!({"device": 2, "name": "osd.3"})).unwrap();
                inv.create_osd(&form, now)
            })
            .await
            .unwrap();

        let config = ServerConfig {
            data_file: Some(path),
            ..ServerConfig::default()
        };
        let reloaded = RegistryService::load(&config).await.unwrap();
        assert_eq!(reloaded.read(|inv| inv.osds().len()).await, 1);
    }

    #[tokio::test]
    async fn writes_expire_old_changelog_entries() {
        let service = RegistryService::with_retention(seeded(), None, 30);
        let first = service
            .write_at(t0(), |inv, now| {
                let form = OsdForm::from_value(json!({"device": 1, "name": "osd.0"})).unwrap();
                inv.create_osd(&form, now)
            })
            .await
            .unwrap();
        assert_eq!(service.read(|inv| inv.changelog(ObjectKind::Osd, first).len()).await, 1);

        let second = service
            .write_at(t0() + Duration::days(31), |inv, now| {
                let form = OsdForm::from_value(json!({"device": 2, "name": "osd.1"})).unwrap();
                inv.create_osd(&form, now)
            })
            .await
            .unwrap();
        assert!(service.read(|inv| inv.changelog(ObjectKind::Osd, first).is_empty()).await);
        assert_eq!(service.read(|inv| inv.changelog(ObjectKind::Osd, second).len()).await, 1);
        assert_eq!(service.read(|inv| inv.osds().len()).await, 2);
    }

    #[tokio::test]
    async fn zero_retention_keeps_history() {
        let service = RegistryService::new(seeded(), None);
        let id = service
            .write_at(t0(), |inv, now| {
                let form = OsdForm::from_value(json!({"device": 1, "name": "osd.0"})).unwrap();
                inv.create_osd(&form, now)
            })
            .await
            .unwrap();
        service
            .write_at(t0() + Duration::days(3650), |inv, now| {
                let form = OsdForm::from_value(json!({"device": 2, "name": "osd.1"})).unwrap();
                inv.create_osd(&form, now)
            })
            .await
            .unwrap();
        assert_eq!(service.read(|inv| inv.changelog(ObjectKind::Osd, id).len()).await, 1);
    }
}
