//! Table rows for the UI views and the device panel.
//!
//! Rows carry display-ready cells: related objects as `{id, display}`
//! links, choice fields as `{value, label, color}`, and the derived columns
//! (node/OSD counts, rack, site, open notes) computed at render time.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::host::{Device, Rack, Site};
use super::inventory::{ClusterNode, Inventory};
use super::models::{Cluster, Osd, StatusNote};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCell {
    pub id: u64,
    pub display: String,
}

impl LinkCell {
    fn new(id: u64, display: impl Into<String>) -> Self {
        Self {
            id,
            display: display.into(),
        }
    }

    fn site(site: &Site) -> Self {
        Self::new(site.id, &site.name)
    }

    fn rack(rack: &Rack) -> Self {
        Self::new(rack.id, &rack.name)
    }

    fn device(device: &Device) -> Self {
        Self::new(device.id, &device.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceCell {
    pub value: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

macro_rules! choice_cell {
    ($choice:expr) => {{
        let c = $choice;
        ChoiceCell {
            value: c.value(),
            label: c.label(),
            color: c.color(),
        }
    }};
}

/// A rendered table: column keys in display order plus the rows.
#[derive(Debug, Clone, Serialize)]
pub struct Table<R> {
    pub columns: &'static [&'static str],
    pub orderable: bool,
    pub empty_text: &'static str,
    pub rows: Vec<R>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterRow {
    pub id: u64,
    pub name: String,
    pub site: Option<LinkCell>,
    pub description: String,
    pub node_count: u64,
    pub osd_count: u64,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ClusterRow {
    pub fn build(inv: &Inventory, cluster: &Cluster) -> Self {
        Self {
            id: cluster.id,
            name: cluster.name.clone(),
            site: cluster.site.and_then(|id| inv.site(id)).map(LinkCell::site),
            description: cluster.description.clone(),
            node_count: inv.node_count(cluster.id),
            osd_count: inv.osd_count(cluster.id),
            tags: cluster.tags.clone(),
            created: cluster.created,
            last_updated: cluster.last_updated,
        }
    }
}

pub fn cluster_table<'a>(inv: &Inventory, clusters: impl IntoIterator<Item = &'a Cluster>) -> Table<ClusterRow> {
    Table {
        columns: &["name", "site", "node_count", "osd_count", "tags"],
        orderable: true,
        empty_text: "No clusters found.",
        rows: clusters.into_iter().map(|c| ClusterRow::build(inv, c)).collect(),
    }
}

/// One device hosting OSDs of a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterNodeRow {
    pub device: LinkCell,
    pub site: Option<LinkCell>,
    pub rack: Option<LinkCell>,
    pub osd_count: u64,
}

pub fn cluster_node_table(inv: &Inventory, cluster: u64) -> Table<ClusterNodeRow> {
    let rows = inv
        .cluster_nodes(cluster)
        .into_iter()
        .map(|ClusterNode { device, osd_count }| ClusterNodeRow {
            device: LinkCell::device(device),
            site: inv.site(device.site).map(LinkCell::site),
            rack: device.rack.and_then(|id| inv.rack(id)).map(LinkCell::rack),
            osd_count,
        })
        .collect();
    Table {
        columns: &["device", "site", "rack", "osd_count"],
        orderable: false,
        empty_text: "No nodes in this cluster.",
        rows,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OsdRow {
    pub id: u64,
    pub name: String,
    pub display: String,
    pub cluster: Option<LinkCell>,
    pub device: Option<LinkCell>,
    pub rack: Option<LinkCell>,
    pub site: Option<LinkCell>,
    pub osd_type: ChoiceCell,
    pub encrypted: bool,
    pub status: ChoiceCell,
    /// Unresolved status notes; `None` renders as an empty cell.
    pub open_notes: Option<u64>,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl OsdRow {
    pub fn build(inv: &Inventory, osd: &Osd) -> Self {
        let open = inv.open_notes(osd.id);
        Self {
            id: osd.id,
            name: osd.name.clone(),
            display: inv.osd_display(osd),
            cluster: osd
                .cluster
                .and_then(|id| inv.cluster(id))
                .map(|c| LinkCell::new(c.id, &c.name)),
            device: inv.device(osd.device).map(LinkCell::device),
            rack: inv.osd_rack(osd).map(LinkCell::rack),
            site: inv.osd_site(osd).map(LinkCell::site),
            osd_type: choice_cell!(osd.osd_type),
            encrypted: osd.encrypted,
            status: choice_cell!(osd.status),
            open_notes: (open > 0).then_some(open),
            tags: osd.tags.clone(),
            created: osd.created,
            last_updated: osd.last_updated,
        }
    }
}

const OSD_COLUMNS: &[&str] = &[
    "name",
    "cluster",
    "device",
    "rack",
    "site",
    "osd_type",
    "encrypted",
    "status",
    "open_notes",
];

pub fn osd_table<'a>(inv: &Inventory, osds: impl IntoIterator<Item = &'a Osd>, orderable: bool) -> Table<OsdRow> {
    Table {
        columns: OSD_COLUMNS,
        orderable,
        empty_text: "No OSDs found.",
        rows: osds.into_iter().map(|o| OsdRow::build(inv, o)).collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteRow {
    pub id: u64,
    pub display: String,
    pub osd: LinkCell,
    pub status: ChoiceCell,
    pub reason: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl NoteRow {
    pub fn build(inv: &Inventory, note: &StatusNote) -> Self {
        let osd_display = inv.osd(note.osd).map(|o| inv.osd_display(o)).unwrap_or_default();
        Self {
            id: note.id,
            display: inv.note_display(note),
            osd: LinkCell::new(note.osd, osd_display),
            status: choice_cell!(note.status),
            reason: note.reason.clone(),
            resolved: note.resolved,
            resolved_at: note.resolved_at,
            tags: note.tags.clone(),
            created: note.created,
            last_updated: note.last_updated,
        }
    }
}

pub fn note_table<'a>(
    inv: &Inventory,
    notes: impl IntoIterator<Item = &'a StatusNote>,
    orderable: bool,
) -> Table<NoteRow> {
    Table {
        columns: &["osd", "status", "reason", "resolved", "created"],
        orderable,
        empty_text: "No status notes.",
        rows: notes.into_iter().map(|n| NoteRow::build(inv, n)).collect(),
    }
}

/// The Ceph OSD panel embedded in a device page.
#[derive(Debug, Clone, Serialize)]
pub struct DevicePanel {
    pub device: LinkCell,
    pub osds: Table<OsdRow>,
}

impl DevicePanel {
    pub fn build(inv: &Inventory, device: u64) -> Option<Self> {
        let device = inv.device(device)?;
        Some(Self {
            device: LinkCell::device(device),
            osds: osd_table(inv, inv.device_osds(device.id), false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::tests::{cluster, note, osd, seeded, t0};

    #[test]
    fn cluster_rows_count_nodes_and_osds() {
        let mut inv = seeded();
        let c = cluster(&mut inv, "prod-ceph-01");
        osd(&mut inv, Some(c), "storage-01", "osd.0");
        osd(&mut inv, Some(c), "storage-01", "osd.1");
        osd(&mut inv, Some(c), "storage-03", "osd.2");

        let table = cluster_table(&inv, inv.clusters());
        let row = &table.rows[0];
        assert_eq!(row.node_count, 2);
        assert_eq!(row.osd_count, 3);
        assert_eq!(row.site.as_ref().unwrap().display, "DC 1");

        let nodes = cluster_node_table(&inv, c);
        assert_eq!(nodes.rows.len(), 2);
        assert_eq!(nodes.rows[0].device.display, "storage-01");
        assert_eq!(nodes.rows[0].osd_count, 2);
        assert_eq!(nodes.rows[1].rack.as_ref().unwrap().display, "R07");
    }

    #[test]
    fn osd_rows_derive_placement_and_open_notes() {
        let mut inv = seeded();
        let o = osd(&mut inv, None, "storage-03", "osd.9");
        note(&mut inv, o, "down", false, t0());
        note(&mut inv, o, "maintenance", true, t0());

        let row = OsdRow::build(&inv, inv.osd(o).unwrap());
        assert_eq!(row.display, "osd.9 @ storage-03");
        assert_eq!(row.rack.unwrap().display, "R07");
        assert_eq!(row.site.unwrap().display, "DC 2");
        assert_eq!(row.open_notes, Some(1));
        assert_eq!(row.status.label, "Active");
        assert_eq!(row.osd_type.color, "blue");
        assert!(row.cluster.is_none());
    }

    #[test]
    fn device_panel_lists_only_that_device() {
        let mut inv = seeded();
        osd(&mut inv, None, "storage-01", "osd.0");
        osd(&mut inv, None, "storage-01", "osd.1");
        osd(&mut inv, None, "storage-02", "osd.2");

        let panel = DevicePanel::build(&inv, 1).unwrap();
        assert_eq!(panel.device.display, "storage-01");
        assert!(!panel.osds.orderable);
        let names: Vec<_> = panel.osds.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["osd.0", "osd.1"]);

        let empty = DevicePanel::build(&inv, 3).unwrap();
        assert!(empty.osds.rows.is_empty());
        assert!(DevicePanel::build(&inv, 99).is_none());
    }
}
