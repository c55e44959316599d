//! Registry records: Ceph clusters, OSDs and OSD status notes.
//!
//! Only stored fields live here. Derived values (OSD/node counts, rack and
//! site placement, open notes) are computed by `Inventory` on read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::choices::{NoteStatus, OsdStatus, OsdType};
use super::error::ObjectKind;

pub type CustomFields = BTreeMap<String, serde_json::Value>;

/// A named grouping of OSDs, optionally tied to a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u64,
    pub name: String,
    pub site: Option<u64>,
    pub description: String,
    pub tags: Vec<String>,
    pub custom_fields: CustomFields,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// A single Ceph OSD daemon bound to one host device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Osd {
    pub id: u64,
    pub cluster: Option<u64>,
    pub name: String,
    pub device: u64,
    pub osd_type: OsdType,
    pub encrypted: bool,
    pub status: OsdStatus,
    pub description: String,
    pub tags: Vec<String>,
    pub custom_fields: CustomFields,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Timestamped record of why an OSD is in a given state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNote {
    pub id: u64,
    pub osd: u64,
    pub status: NoteStatus,
    pub reason: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub custom_fields: CustomFields,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One entry of the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub id: u64,
    pub time: DateTime<Utc>,
    pub action: ChangeAction,
    pub object_type: ObjectKind,
    pub object_id: u64,
    pub object_repr: String,
}
