//! API payloads. Each object renders in a full and a brief form; related
//! objects are nested in their brief form. Derived fields (counts, rack and
//! site through the device) are computed from the inventory at render time.
//!
//! The same structs back the GraphQL object types.

use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::host::{Device, Rack, Site};
use crate::domain::inventory::Inventory;
use crate::domain::models::{Cluster, CustomFields, Osd, StatusNote};

pub const CLUSTERS_PATH: &str = "/api/plugins/osd/clusters";
pub const OSDS_PATH: &str = "/api/plugins/osd/osds";
pub const NOTES_PATH: &str = "/api/plugins/osd/notes";
pub const SITES_PATH: &str = "/api/dcim/sites";
pub const RACKS_PATH: &str = "/api/dcim/racks";
pub const DEVICES_PATH: &str = "/api/dcim/devices";

/// A choice field as `{value, label}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, SimpleObject)]
pub struct ChoiceValue {
    pub value: String,
    pub label: String,
}

macro_rules! choice_value {
    ($choice:expr) => {{
        let c = $choice;
        ChoiceValue {
            value: c.value().to_string(),
            label: c.label().to_string(),
        }
    }};
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct BriefSite {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct BriefRack {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct BriefDevice {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct BriefCluster {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct BriefOsd {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
    pub cluster: Option<BriefCluster>,
    pub device: BriefDevice,
    pub status: ChoiceValue,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct BriefNote {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub osd: u64,
    pub status: ChoiceValue,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct ClusterPayload {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
    pub site: Option<BriefSite>,
    pub description: String,
    pub osd_count: u64,
    pub node_count: u64,
    pub tags: Vec<String>,
    #[graphql(skip)]
    pub custom_fields: CustomFields,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct OsdPayload {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub cluster: Option<BriefCluster>,
    pub name: String,
    pub device: BriefDevice,
    pub rack: Option<BriefRack>,
    pub site: Option<BriefSite>,
    pub osd_type: ChoiceValue,
    pub encrypted: bool,
    pub status: ChoiceValue,
    pub description: String,
    pub open_notes: u64,
    pub tags: Vec<String>,
    #[graphql(skip)]
    pub custom_fields: CustomFields,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, SimpleObject)]
pub struct NotePayload {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub osd: u64,
    pub status: ChoiceValue,
    pub reason: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    #[graphql(skip)]
    pub custom_fields: CustomFields,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RackPayload {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
    pub site: Option<BriefSite>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DevicePayload {
    pub id: u64,
    pub url: String,
    pub display: String,
    pub name: String,
    pub site: Option<BriefSite>,
    pub rack: Option<BriefRack>,
    pub osd_count: usize,
}

/// Renders inventory objects, building absolute URLs from `base`.
pub struct Serializer<'a> {
    inv: &'a Inventory,
    base: &'a str,
}

impl<'a> Serializer<'a> {
    pub fn new(inv: &'a Inventory, base: &'a str) -> Self {
        Self {
            inv,
            base: base.trim_end_matches('/'),
        }
    }

    pub fn url(&self, path: &str, id: u64) -> String {
        format!("{}{}/{}/", self.base, path, id)
    }

    pub fn brief_site(&self, site: &Site) -> BriefSite {
        BriefSite {
            id: site.id,
            url: self.url(SITES_PATH, site.id),
            display: site.name.clone(),
            name: site.name.clone(),
            slug: site.slug.clone(),
        }
    }

    pub fn brief_rack(&self, rack: &Rack) -> BriefRack {
        BriefRack {
            id: rack.id,
            url: self.url(RACKS_PATH, rack.id),
            display: rack.name.clone(),
            name: rack.name.clone(),
        }
    }

    pub fn brief_device(&self, device: &Device) -> BriefDevice {
        BriefDevice {
            id: device.id,
            url: self.url(DEVICES_PATH, device.id),
            display: device.name.clone(),
            name: device.name.clone(),
        }
    }

    fn device_ref(&self, id: u64) -> BriefDevice {
        match self.inv.device(id) {
            Some(device) => self.brief_device(device),
            None => BriefDevice {
                id,
                url: self.url(DEVICES_PATH, id),
                display: format!("Device {id}"),
                name: String::new(),
            },
        }
    }

    pub fn brief_cluster(&self, cluster: &Cluster) -> BriefCluster {
        BriefCluster {
            id: cluster.id,
            url: self.url(CLUSTERS_PATH, cluster.id),
            display: cluster.name.clone(),
            name: cluster.name.clone(),
        }
    }

    fn cluster_ref(&self, id: Option<u64>) -> Option<BriefCluster> {
        id.and_then(|id| self.inv.cluster(id)).map(|c| self.brief_cluster(c))
    }

    pub fn brief_osd(&self, osd: &Osd) -> BriefOsd {
        BriefOsd {
            id: osd.id,
            url: self.url(OSDS_PATH, osd.id),
            display: self.inv.osd_display(osd),
            name: osd.name.clone(),
            cluster: self.cluster_ref(osd.cluster),
            device: self.device_ref(osd.device),
            status: choice_value!(osd.status),
        }
    }

    pub fn brief_note(&self, note: &StatusNote) -> BriefNote {
        BriefNote {
            id: note.id,
            url: self.url(NOTES_PATH, note.id),
            display: self.inv.note_display(note),
            osd: note.osd,
            status: choice_value!(note.status),
            resolved: note.resolved,
        }
    }

    pub fn cluster(&self, cluster: &Cluster) -> ClusterPayload {
        ClusterPayload {
            id: cluster.id,
            url: self.url(CLUSTERS_PATH, cluster.id),
            display: cluster.name.clone(),
            name: cluster.name.clone(),
            site: cluster
                .site
                .and_then(|id| self.inv.site(id))
                .map(|s| self.brief_site(s)),
            description: cluster.description.clone(),
            osd_count: self.inv.osd_count(cluster.id),
            node_count: self.inv.node_count(cluster.id),
            tags: cluster.tags.clone(),
            custom_fields: cluster.custom_fields.clone(),
            created: cluster.created,
            last_updated: cluster.last_updated,
        }
    }

    pub fn osd(&self, osd: &Osd) -> OsdPayload {
        OsdPayload {
            id: osd.id,
            url: self.url(OSDS_PATH, osd.id),
            display: self.inv.osd_display(osd),
            cluster: self.cluster_ref(osd.cluster),
            name: osd.name.clone(),
            device: self.device_ref(osd.device),
            rack: self.inv.osd_rack(osd).map(|r| self.brief_rack(r)),
            site: self.inv.osd_site(osd).map(|s| self.brief_site(s)),
            osd_type: choice_value!(osd.osd_type),
            encrypted: osd.encrypted,
            status: choice_value!(osd.status),
            description: osd.description.clone(),
            open_notes: self.inv.open_notes(osd.id),
            tags: osd.tags.clone(),
            custom_fields: osd.custom_fields.clone(),
            created: osd.created,
            last_updated: osd.last_updated,
        }
    }

    pub fn note(&self, note: &StatusNote) -> NotePayload {
        NotePayload {
            id: note.id,
            url: self.url(NOTES_PATH, note.id),
            display: self.inv.note_display(note),
            osd: note.osd,
            status: choice_value!(note.status),
            reason: note.reason.clone(),
            resolved: note.resolved,
            resolved_at: note.resolved_at,
            tags: note.tags.clone(),
            custom_fields: note.custom_fields.clone(),
            created: note.created,
            last_updated: note.last_updated,
        }
    }

    pub fn rack(&self, rack: &Rack) -> RackPayload {
        RackPayload {
            id: rack.id,
            url: self.url(RACKS_PATH, rack.id),
            display: rack.name.clone(),
            name: rack.name.clone(),
            site: self.inv.site(rack.site).map(|s| self.brief_site(s)),
        }
    }

    pub fn device(&self, device: &Device) -> DevicePayload {
        DevicePayload {
            id: device.id,
            url: self.url(DEVICES_PATH, device.id),
            display: device.name.clone(),
            name: device.name.clone(),
            site: self.inv.site(device.site).map(|s| self.brief_site(s)),
            rack: device
                .rack
                .and_then(|id| self.inv.rack(id))
                .map(|r| self.brief_rack(r)),
            osd_count: self.inv.device_osds(device.id).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::tests::{cluster, note, osd, seeded, t0};

    #[test]
    fn osd_payload_nests_brief_relations_and_derived_placement() {
        let mut inv = seeded();
        let c = cluster(&mut inv, "prod-ceph-01");
        let o = osd(&mut inv, Some(c), "storage-03", "osd.4");
        note(&mut inv, o, "down", false, t0());

        let s = Serializer::new(&inv, "http://netbox.local/");
        let payload = s.osd(inv.osd(o).unwrap());
        assert_eq!(payload.url, "http://netbox.local/api/plugins/osd/osds/1/");
        assert_eq!(payload.display, "osd.4 @ storage-03");
        assert_eq!(payload.cluster.as_ref().unwrap().name, "prod-ceph-01");
        assert_eq!(payload.device.name, "storage-03");
        assert_eq!(payload.rack.as_ref().unwrap().name, "R07");
        assert_eq!(payload.site.as_ref().unwrap().slug, "dc2");
        assert_eq!(payload.osd_type, ChoiceValue { value: "hdd".into(), label: "HDD".into() });
        assert_eq!(payload.open_notes, 1);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"]["value"], "active");
        assert_eq!(json["device"]["url"], "http://netbox.local/api/dcim/devices/3/");
    }

    #[test]
    fn cluster_payload_reports_counts() {
        let mut inv = seeded();
        let c = cluster(&mut inv, "prod-ceph-01");
        osd(&mut inv, Some(c), "storage-01", "osd.0");
        osd(&mut inv, Some(c), "storage-02", "osd.1");

        let s = Serializer::new(&inv, "");
        let payload = s.cluster(inv.cluster(c).unwrap());
        assert_eq!(payload.url, "/api/plugins/osd/clusters/1/");
        assert_eq!(payload.osd_count, 2);
        assert_eq!(payload.node_count, 2);
        assert_eq!(payload.site.unwrap().slug, "dc1");
    }

    #[test]
    fn brief_note_has_only_brief_fields() {
        let mut inv = seeded();
        let o = osd(&mut inv, None, "storage-01", "osd.2");
        let n = note(&mut inv, o, "maintenance", true, t0());

        let s = Serializer::new(&inv, "");
        let json = serde_json::to_value(s.brief_note(inv.note(n).unwrap())).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["display", "id", "osd", "resolved", "status", "url"]);
        assert_eq!(json["display"], "osd.2 @ storage-01 - Maintenance (2026-01-10)");
    }
}
