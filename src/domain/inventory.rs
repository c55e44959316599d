//! Inventory: the registry's entity graph.
//!
//! Holds the host inventory (sites, racks, devices) alongside clusters, OSDs
//! and status notes. All derived values are computed here from the current
//! relations on every call; nothing derived is stored.
//!
//! Referential rules:
//!   cluster deleted → OSDs keep existing with `cluster = None`
//!   device deleted  → its OSDs (and their notes) are deleted
//!   OSD deleted     → its notes are deleted

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ObjectKind, RegistryError, ValidationErrors};
use super::forms::{ClusterForm, OsdBulkEdit, OsdForm, RelatedRef, StatusNoteForm};
use super::host::{Device, Rack, Site};
use super::models::{ChangeAction, Cluster, ObjectChange, Osd, StatusNote};

/// How an update treats fields missing from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Mandatory fields must be supplied; other absent fields keep their value.
    Full,
    /// Every absent field keeps its stored value.
    Partial,
}

/// A device hosting OSDs of one cluster, with that cluster's OSD count on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode<'a> {
    pub device: &'a Device,
    pub osd_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Sequences {
    cluster: u64,
    osd: u64,
    note: u64,
    change: u64,
}

fn next(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    sites: BTreeMap<u64, Site>,
    racks: BTreeMap<u64, Rack>,
    devices: BTreeMap<u64, Device>,
    clusters: BTreeMap<u64, Cluster>,
    osds: BTreeMap<u64, Osd>,
    notes: BTreeMap<u64, StatusNote>,
    changes: Vec<ObjectChange>,
    sequences: Sequences,
}

impl Inventory {
    pub fn from_host(sites: Vec<Site>, racks: Vec<Rack>, devices: Vec<Device>) -> Self {
        Self {
            sites: sites.into_iter().map(|s| (s.id, s)).collect(),
            racks: racks.into_iter().map(|r| (r.id, r)).collect(),
            devices: devices.into_iter().map(|d| (d.id, d)).collect(),
            ..Self::default()
        }
    }

    // ── Host inventory ─────────────────────────────────────

    pub fn site(&self, id: u64) -> Option<&Site> {
        self.sites.get(&id)
    }

    pub fn rack(&self, id: u64) -> Option<&Rack> {
        self.racks.get(&id)
    }

    pub fn device(&self, id: u64) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    pub fn racks(&self) -> impl Iterator<Item = &Rack> {
        self.racks.values()
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn site_by_slug(&self, slug: &str) -> Option<&Site> {
        self.sites.values().find(|s| s.slug == slug)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.name == name)
    }

    pub fn resolve_site(&self, r: &RelatedRef) -> Option<&Site> {
        match r {
            RelatedRef::Id(id) => self.site(*id),
            RelatedRef::Attrs(_) => match (r.id(), r.attr("slug"), r.attr("name")) {
                (Some(id), _, _) => self.site(id),
                (None, Some(slug), _) => self.site_by_slug(slug),
                (None, None, Some(name)) => self.sites.values().find(|s| s.name == name),
                _ => None,
            },
        }
    }

    pub fn resolve_device(&self, r: &RelatedRef) -> Option<&Device> {
        match (r.id(), r.attr("name")) {
            (Some(id), _) => self.device(id),
            (None, Some(name)) => self.device_by_name(name),
            _ => None,
        }
    }

    // ── Clusters ───────────────────────────────────────────

    pub fn cluster(&self, id: u64) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn cluster_by_name(&self, name: &str) -> Option<&Cluster> {
        self.clusters.values().find(|c| c.name == name)
    }

    pub fn resolve_cluster(&self, r: &RelatedRef) -> Option<&Cluster> {
        match (r.id(), r.attr("name")) {
            (Some(id), _) => self.cluster(id),
            (None, Some(name)) => self.cluster_by_name(name),
            _ => None,
        }
    }

    /// Clusters ordered by name.
    pub fn clusters(&self) -> Vec<&Cluster> {
        let mut clusters: Vec<&Cluster> = self.clusters.values().collect();
        clusters.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        clusters
    }

    fn cluster_osds(&self, cluster: u64) -> impl Iterator<Item = &Osd> {
        self.osds
            .values()
            .filter(move |o| o.cluster == Some(cluster))
    }

    /// Number of OSDs referencing the cluster.
    pub fn osd_count(&self, cluster: u64) -> u64 {
        self.cluster_osds(cluster).count() as u64
    }

    /// Number of distinct devices hosting the cluster's OSDs.
    pub fn node_count(&self, cluster: u64) -> u64 {
        self.cluster_osds(cluster)
            .map(|o| o.device)
            .collect::<BTreeSet<_>>()
            .len() as u64
    }

    /// Devices hosting the cluster's OSDs, ordered by device name.
    pub fn cluster_nodes(&self, cluster: u64) -> Vec<ClusterNode<'_>> {
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for osd in self.cluster_osds(cluster) {
            *counts.entry(osd.device).or_default() += 1;
        }
        let mut nodes: Vec<ClusterNode<'_>> = counts
            .into_iter()
            .filter_map(|(id, osd_count)| {
                self.device(id).map(|device| ClusterNode { device, osd_count })
            })
            .collect();
        nodes.sort_by(|a, b| a.device.name.cmp(&b.device.name));
        nodes
    }

    // ── OSDs ───────────────────────────────────────────────

    pub fn osd(&self, id: u64) -> Option<&Osd> {
        self.osds.get(&id)
    }

    pub fn osd_by_device_and_name(&self, device: u64, name: &str) -> Option<&Osd> {
        self.osds
            .values()
            .find(|o| o.device == device && o.name == name)
    }

    /// Resolve by id, or by `{"device": <name or id>, "name": <osd name>}`.
    pub fn resolve_osd(&self, r: &RelatedRef) -> Option<&Osd> {
        if let Some(id) = r.id() {
            return self.osd(id);
        }
        let RelatedRef::Attrs(attrs) = r else {
            return None;
        };
        let name = r.attr("name")?;
        let device = match attrs.get("device")? {
            serde_json::Value::Number(n) => self.device(n.as_u64()?)?,
            serde_json::Value::String(s) => self.device_by_name(s)?,
            _ => return None,
        };
        self.osd_by_device_and_name(device.id, name)
    }

    fn osd_order_key<'a>(&'a self, osd: &'a Osd) -> (&'a str, u64, &'a str, u64) {
        let device_name = self
            .device(osd.device)
            .map(|d| d.name.as_str())
            .unwrap_or_default();
        (device_name, osd.device, osd.name.as_str(), osd.id)
    }

    /// OSDs ordered by device, then name.
    pub fn osds(&self) -> Vec<&Osd> {
        let mut osds: Vec<&Osd> = self.osds.values().collect();
        osds.sort_by(|a, b| self.osd_order_key(a).cmp(&self.osd_order_key(b)));
        osds
    }

    /// OSDs running on one device, in default order.
    pub fn device_osds(&self, device: u64) -> Vec<&Osd> {
        let mut osds = self.osds();
        osds.retain(|o| o.device == device);
        osds
    }

    /// Rack of the OSD's device.
    pub fn osd_rack(&self, osd: &Osd) -> Option<&Rack> {
        self.device(osd.device)
            .and_then(|d| d.rack)
            .and_then(|id| self.rack(id))
    }

    /// Site of the OSD's device.
    pub fn osd_site(&self, osd: &Osd) -> Option<&Site> {
        self.device(osd.device).and_then(|d| self.site(d.site))
    }

    /// Unresolved notes on the OSD.
    pub fn open_notes(&self, osd: u64) -> u64 {
        self.notes
            .values()
            .filter(|n| n.osd == osd && !n.resolved)
            .count() as u64
    }

    // ── Status notes ───────────────────────────────────────

    pub fn note(&self, id: u64) -> Option<&StatusNote> {
        self.notes.get(&id)
    }

    /// Notes, newest first.
    pub fn notes(&self) -> Vec<&StatusNote> {
        let mut notes: Vec<&StatusNote> = self.notes.values().collect();
        notes.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        notes
    }

    pub fn osd_notes(&self, osd: u64) -> Vec<&StatusNote> {
        let mut notes = self.notes();
        notes.retain(|n| n.osd == osd);
        notes
    }

    // ── Display ────────────────────────────────────────────

    pub fn osd_display(&self, osd: &Osd) -> String {
        match self.device(osd.device) {
            Some(device) => format!("{} @ {}", osd.name, device.name),
            None => osd.name.clone(),
        }
    }

    pub fn note_display(&self, note: &StatusNote) -> String {
        let osd = self
            .osd(note.osd)
            .map(|o| self.osd_display(o))
            .unwrap_or_else(|| format!("OSD {}", note.osd));
        format!(
            "{} - {} ({})",
            osd,
            note.status.label(),
            note.created.format("%Y-%m-%d")
        )
    }

    // ── Change log ─────────────────────────────────────────

    fn record(&mut self, now: DateTime<Utc>, action: ChangeAction, kind: ObjectKind, id: u64, repr: String) {
        let change_id = next(&mut self.sequences.change);
        self.changes.push(ObjectChange {
            id: change_id,
            time: now,
            action,
            object_type: kind,
            object_id: id,
            object_repr: repr,
        });
    }

    /// Drop change log entries recorded before `cutoff`. Returns how many
    /// were removed.
    pub fn prune_changelog(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.changes.len();
        self.changes.retain(|c| c.time >= cutoff);
        before - self.changes.len()
    }

    /// Changes recorded for one object, newest first.
    pub fn changelog(&self, kind: ObjectKind, id: u64) -> Vec<&ObjectChange> {
        self.changes
            .iter()
            .rev()
            .filter(|c| c.object_type == kind && c.object_id == id)
            .collect()
    }

    // ── Writes: clusters ───────────────────────────────────

    pub fn create_cluster(&mut self, form: &ClusterForm, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let data = form.clean(self, None)?;
        let id = next(&mut self.sequences.cluster);
        let repr = data.name.clone();
        self.clusters.insert(
            id,
            Cluster {
                id,
                name: data.name,
                site: data.site,
                description: data.description,
                tags: data.tags,
                custom_fields: data.custom_fields,
                created: now,
                last_updated: now,
            },
        );
        self.record(now, ChangeAction::Create, ObjectKind::Cluster, id, repr);
        Ok(id)
    }

    pub fn update_cluster(
        &mut self,
        id: u64,
        mut form: ClusterForm,
        mode: UpdateMode,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let existing = self.cluster(id).ok_or(RegistryError::NotFound {
            kind: ObjectKind::Cluster,
            id,
        })?;
        if mode == UpdateMode::Full {
            form.missing_required().into_result()?;
        }
        form.fill_from(existing);
        let data = form.clean(self, Some(id))?;
        let repr = data.name.clone();
        if let Some(cluster) = self.clusters.get_mut(&id) {
            cluster.name = data.name;
            cluster.site = data.site;
            cluster.description = data.description;
            cluster.tags = data.tags;
            cluster.custom_fields = data.custom_fields;
            cluster.last_updated = now;
        }
        self.record(now, ChangeAction::Update, ObjectKind::Cluster, id, repr);
        Ok(())
    }

    /// Delete a cluster; its OSDs remain with the cluster reference cleared.
    pub fn delete_cluster(&mut self, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let cluster = self.clusters.remove(&id).ok_or(RegistryError::NotFound {
            kind: ObjectKind::Cluster,
            id,
        })?;
        // Orphan, don't cascade
        for osd in self.osds.values_mut().filter(|o| o.cluster == Some(id)) {
            osd.cluster = None;
        }
        self.record(now, ChangeAction::Delete, ObjectKind::Cluster, id, cluster.name);
        Ok(())
    }

    // ── Writes: OSDs ───────────────────────────────────────

    pub fn create_osd(&mut self, form: &OsdForm, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let data = form.clean(self, None)?;
        // Same invariant as the validator, checked again at the point of insertion.
        if self.osd_by_device_and_name(data.device, &data.name).is_some() {
            return Err(RegistryError::Integrity(format!(
                "duplicate OSD '{}' on device {}",
                data.name, data.device
            )));
        }
        let id = next(&mut self.sequences.osd);
        let osd = Osd {
            id,
            cluster: data.cluster,
            name: data.name,
            device: data.device,
            osd_type: data.osd_type,
            encrypted: data.encrypted,
            status: data.status,
            description: data.description,
            tags: data.tags,
            custom_fields: data.custom_fields,
            created: now,
            last_updated: now,
        };
        let repr = self.osd_display(&osd);
        self.osds.insert(id, osd);
        self.record(now, ChangeAction::Create, ObjectKind::Osd, id, repr);
        Ok(id)
    }

    pub fn update_osd(
        &mut self,
        id: u64,
        mut form: OsdForm,
        mode: UpdateMode,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let existing = self.osd(id).ok_or(RegistryError::NotFound {
            kind: ObjectKind::Osd,
            id,
        })?;
        if mode == UpdateMode::Full {
            form.missing_required().into_result()?;
        }
        form.fill_from(existing);
        let data = form.clean(self, Some(id))?;
        if let Some(osd) = self.osds.get_mut(&id) {
            osd.cluster = data.cluster;
            osd.name = data.name;
            osd.device = data.device;
            osd.osd_type = data.osd_type;
            osd.encrypted = data.encrypted;
            osd.status = data.status;
            osd.description = data.description;
            osd.tags = data.tags;
            osd.custom_fields = data.custom_fields;
            osd.last_updated = now;
        }
        let repr = self.osd(id).map(|o| self.osd_display(o)).unwrap_or_default();
        self.record(now, ChangeAction::Update, ObjectKind::Osd, id, repr);
        Ok(())
    }

    /// Delete an OSD together with its status notes.
    pub fn delete_osd(&mut self, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let repr = self
            .osd(id)
            .map(|o| self.osd_display(o))
            .ok_or(RegistryError::NotFound {
                kind: ObjectKind::Osd,
                id,
            })?;
        let note_ids: Vec<u64> = self
            .notes
            .values()
            .filter(|n| n.osd == id)
            .map(|n| n.id)
            .collect();
        // Notes go first so each one gets its own change log entry
        for note_id in note_ids {
            self.delete_note(note_id, now)?;
        }
        self.osds.remove(&id);
        self.record(now, ChangeAction::Delete, ObjectKind::Osd, id, repr);
        Ok(())
    }

    /// Apply the same field changes to every selected OSD. Stops at the first
    /// failing OSD; callers run this on a draft to keep it all-or-nothing.
    pub fn bulk_edit_osds(&mut self, edit: &OsdBulkEdit, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
        let form = edit.to_form()?;
        // Errors are keyed by OSD id, e.g. "12.status"
        for &id in &edit.pk {
            self.update_osd(id, form.clone(), UpdateMode::Partial, now)
                .map_err(|e| match e {
                    RegistryError::Validation(errors) => {
                        RegistryError::Validation(errors.prefixed(&id.to_string()))
                    }
                    other => other,
                })?;
        }
        Ok(edit.pk.clone())
    }

    // ── Writes: status notes ───────────────────────────────

    pub fn create_note(&mut self, form: &StatusNoteForm, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let data = form.clean(self, now)?;
        let id = next(&mut self.sequences.note);
        let note = StatusNote {
            id,
            osd: data.osd,
            status: data.status,
            reason: data.reason,
            resolved: data.resolved,
            resolved_at: data.resolved_at,
            tags: data.tags,
            custom_fields: data.custom_fields,
            created: now,
            last_updated: now,
        };
        let repr = self.note_display(&note);
        self.notes.insert(id, note);
        self.record(now, ChangeAction::Create, ObjectKind::StatusNote, id, repr);
        Ok(id)
    }

    pub fn update_note(
        &mut self,
        id: u64,
        mut form: StatusNoteForm,
        mode: UpdateMode,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let existing = self.note(id).ok_or(RegistryError::NotFound {
            kind: ObjectKind::StatusNote,
            id,
        })?;
        if mode == UpdateMode::Full {
            form.missing_required().into_result()?;
        }
        form.fill_from(existing);
        let data = form.clean(self, now)?;
        if let Some(note) = self.notes.get_mut(&id) {
            note.osd = data.osd;
            note.status = data.status;
            note.reason = data.reason;
            note.resolved = data.resolved;
            note.resolved_at = data.resolved_at;
            note.tags = data.tags;
            note.custom_fields = data.custom_fields;
            note.last_updated = now;
        }
        let repr = self.note(id).map(|n| self.note_display(n)).unwrap_or_default();
        self.record(now, ChangeAction::Update, ObjectKind::StatusNote, id, repr);
        Ok(())
    }

    pub fn delete_note(&mut self, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let repr = self
            .note(id)
            .map(|n| self.note_display(n))
            .ok_or(RegistryError::NotFound {
                kind: ObjectKind::StatusNote,
                id,
            })?;
        self.notes.remove(&id);
        self.record(now, ChangeAction::Delete, ObjectKind::StatusNote, id, repr);
        Ok(())
    }

    // ── Writes: host inventory ─────────────────────────────

    /// Delete a device and every OSD running on it.
    pub fn delete_device(&mut self, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        if !self.devices.contains_key(&id) {
            return Err(RegistryError::NotFound {
                kind: ObjectKind::Device,
                id,
            });
        }
        let osd_ids: Vec<u64> = self
            .osds
            .values()
            .filter(|o| o.device == id)
            .map(|o| o.id)
            .collect();
        // Cascade: device -> OSDs -> notes
        for osd_id in osd_ids {
            self.delete_osd(osd_id, now)?;
        }
        self.devices.remove(&id);
        Ok(())
    }

    /// Delete several objects of one kind; fails on the first unknown id.
    pub fn bulk_delete(&mut self, kind: ObjectKind, ids: &[u64], now: DateTime<Utc>) -> Result<usize, RegistryError> {
        if ids.is_empty() {
            return Err(ValidationErrors::single("pk", "No objects selected.").into());
        }
        for &id in ids {
            match kind {
                ObjectKind::Cluster => self.delete_cluster(id, now)?,
                ObjectKind::Osd => self.delete_osd(id, now)?,
                ObjectKind::StatusNote => self.delete_note(id, now)?,
                ObjectKind::Device => self.delete_device(id, now)?,
                ObjectKind::Site | ObjectKind::Rack => {
                    return Err(ValidationErrors::single(
                        "pk",
                        format!("{} objects cannot be deleted here.", kind.label()),
                    )
                    .into())
                }
            }
        }
        Ok(ids.len())
    }
}
