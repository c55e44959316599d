//! Write-side validation for registry records.
//!
//! Every write surface (REST, UI views, CSV import, bulk edit) parses its
//! input into one of these forms and calls `clean`, which checks required
//! fields, choice membership, related-object existence and uniqueness, and
//! returns the validated data to persist.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::choices::{NoteStatus, OsdStatus, OsdType};
use super::error::{ValidationErrors, NON_FIELD_ERRORS};
use super::inventory::Inventory;
use super::models::{Cluster, CustomFields, Osd, StatusNote};

const NAME_MAX_LEN: usize = 100;
const REQUIRED: &str = "This field is required.";

/// Reference to a related object: a numeric id, or an object of natural-key
/// attributes such as `{"name": "storage-01"}` or `{"slug": "dc1"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedRef {
    Id(u64),
    Attrs(BTreeMap<String, serde_json::Value>),
}

impl RelatedRef {
    pub fn name(name: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), serde_json::Value::from(name));
        RelatedRef::Attrs(attrs)
    }

    pub fn slug(slug: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("slug".to_string(), serde_json::Value::from(slug));
        RelatedRef::Attrs(attrs)
    }

    /// Id attribute of an `Attrs` reference, or the plain id.
    pub fn id(&self) -> Option<u64> {
        match self {
            RelatedRef::Id(id) => Some(*id),
            RelatedRef::Attrs(attrs) => attrs.get("id").and_then(serde_json::Value::as_u64),
        }
    }

    /// String attribute of an `Attrs` reference.
    pub fn attr(&self, key: &str) -> Option<&str> {
        match self {
            RelatedRef::Id(_) => None,
            RelatedRef::Attrs(attrs) => attrs.get(key).and_then(serde_json::Value::as_str),
        }
    }

    fn not_found(&self) -> String {
        match self {
            RelatedRef::Id(id) => format!("Invalid pk \"{id}\" - object does not exist."),
            RelatedRef::Attrs(attrs) => format!(
                "Related object not found using the provided attributes: {}",
                serde_json::to_string(attrs).unwrap_or_default()
            ),
        }
    }
}

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, ValidationErrors> {
    serde_json::from_value(value)
        .map_err(|e| ValidationErrors::single(NON_FIELD_ERRORS, format!("Invalid data: {e}")))
}

fn clean_name(errors: &mut ValidationErrors, name: Option<&str>) -> String {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        errors.add("name", REQUIRED);
    } else if name.chars().count() > NAME_MAX_LEN {
        errors.add(
            "name",
            format!("Ensure this field has no more than {NAME_MAX_LEN} characters."),
        );
    }
    name.to_string()
}

fn clean_choice<T>(errors: &mut ValidationErrors, field: &str, raw: Option<&str>) -> Option<T>
where
    T: std::str::FromStr<Err = super::choices::InvalidChoice>,
{
    match raw.map(str::parse::<T>) {
        Some(Ok(choice)) => Some(choice),
        Some(Err(e)) => {
            errors.add(field, e.to_string());
            None
        }
        None => None,
    }
}

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM[:SS]` /
/// `YYYY-MM-DD HH:MM[:SS]` value taken as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| naive.and_utc())
}

/// Couple `resolved_at` to `resolved`: a resolved note without a timestamp is
/// stamped with `now`; an unresolved note never carries one.
pub fn clean_resolution(
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !resolved {
        return None;
    }
    resolved_at.or(Some(now))
}

// ── Cluster ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub site: Option<Option<RelatedRef>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub custom_fields: Option<CustomFields>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterData {
    pub name: String,
    pub site: Option<u64>,
    pub description: String,
    pub tags: Vec<String>,
    pub custom_fields: CustomFields,
}

impl ClusterForm {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationErrors> {
        parse_payload(value)
    }

    pub fn missing_required(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.name.is_none() {
            errors.add("name", REQUIRED);
        }
        errors
    }

    /// Take every field absent from the payload from the stored record.
    pub fn fill_from(&mut self, existing: &Cluster) {
        self.name.get_or_insert_with(|| existing.name.clone());
        self.site
            .get_or_insert_with(|| existing.site.map(RelatedRef::Id));
        self.description
            .get_or_insert_with(|| existing.description.clone());
        self.tags.get_or_insert_with(|| existing.tags.clone());
        self.custom_fields
            .get_or_insert_with(|| existing.custom_fields.clone());
    }

    pub fn clean(&self, inv: &Inventory, instance: Option<u64>) -> Result<ClusterData, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = clean_name(&mut errors, self.name.as_deref());

        if !name.is_empty()
            && inv
                .cluster_by_name(&name)
                .is_some_and(|c| Some(c.id) != instance)
        {
            errors.add("name", "Ceph Cluster with this Name already exists.");
        }

        let site = match self.site.as_ref().and_then(Option::as_ref) {
            Some(r) => match inv.resolve_site(r) {
                Some(site) => Some(site.id),
                None => {
                    errors.add("site", r.not_found());
                    None
                }
            },
            None => None,
        };

        errors.into_result()?;
        Ok(ClusterData {
            name,
            site,
            description: self.description.clone().unwrap_or_default(),
            tags: self.tags.clone().unwrap_or_default(),
            custom_fields: self.custom_fields.clone().unwrap_or_default(),
        })
    }
}

// ── OSD ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsdForm {
    #[serde(default, deserialize_with = "nullable")]
    pub cluster: Option<Option<RelatedRef>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device: Option<RelatedRef>,
    #[serde(default)]
    pub osd_type: Option<String>,
    #[serde(default)]
    pub encrypted: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub custom_fields: Option<CustomFields>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsdData {
    pub cluster: Option<u64>,
    pub name: String,
    pub device: u64,
    pub osd_type: OsdType,
    pub encrypted: bool,
    pub status: OsdStatus,
    pub description: String,
    pub tags: Vec<String>,
    pub custom_fields: CustomFields,
}

impl OsdForm {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationErrors> {
        parse_payload(value)
    }

    pub fn missing_required(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.name.is_none() {
            errors.add("name", REQUIRED);
        }
        if self.device.is_none() {
            errors.add("device", REQUIRED);
        }
        errors
    }

    pub fn fill_from(&mut self, existing: &Osd) {
        self.cluster
            .get_or_insert_with(|| existing.cluster.map(RelatedRef::Id));
        self.name.get_or_insert_with(|| existing.name.clone());
        self.device
            .get_or_insert_with(|| RelatedRef::Id(existing.device));
        self.osd_type
            .get_or_insert_with(|| existing.osd_type.value().to_string());
        // Choices go back through validation as their wire values
        self.encrypted.get_or_insert(existing.encrypted);
        self.status
            .get_or_insert_with(|| existing.status.value().to_string());
        self.description
            .get_or_insert_with(|| existing.description.clone());
        self.tags.get_or_insert_with(|| existing.tags.clone());
        self.custom_fields
            .get_or_insert_with(|| existing.custom_fields.clone());
    }

    pub fn clean(&self, inv: &Inventory, instance: Option<u64>) -> Result<OsdData, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = clean_name(&mut errors, self.name.as_deref());

        let device = match &self.device {
            Some(r) => match inv.resolve_device(r) {
                Some(device) => Some(device.id),
                None => {
                    errors.add("device", r.not_found());
                    None
                }
            },
            None => {
                errors.add("device", REQUIRED);
                None
            }
        };

        // Cluster is optional; an explicit null clears it
        let cluster = match self.cluster.as_ref().and_then(Option::as_ref) {
            Some(r) => match inv.resolve_cluster(r) {
                Some(cluster) => Some(cluster.id),
                None => {
                    errors.add("cluster", r.not_found());
                    None
                }
            },
            None => None,
        };

        let osd_type = clean_choice::<OsdType>(&mut errors, "osd_type", self.osd_type.as_deref());
        let status = clean_choice::<OsdStatus>(&mut errors, "status", self.status.as_deref());

        // (device, name) is unique; the instance being edited may keep its own pair
        if let Some(device) = device {
            if !name.is_empty()
                && inv
                    .osd_by_device_and_name(device, &name)
                    .is_some_and(|o| Some(o.id) != instance)
            {
                errors.add(
                    NON_FIELD_ERRORS,
                    "Ceph OSD with this Device and Name already exists.",
                );
            }
        }

        errors.into_result()?;
        Ok(OsdData {
            cluster,
            name,
            device: device.unwrap_or_default(),
            osd_type: osd_type.unwrap_or_default(),
            encrypted: self.encrypted.unwrap_or(false),
            status: status.unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            tags: self.tags.clone().unwrap_or_default(),
            custom_fields: self.custom_fields.clone().unwrap_or_default(),
        })
    }
}

/// Field changes applied to a set of OSDs at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsdBulkEdit {
    pub pk: Vec<u64>,
    #[serde(default)]
    pub cluster: Option<RelatedRef>,
    #[serde(default)]
    pub osd_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub encrypted: Option<bool>,
    /// Nullable fields to clear; only `cluster` is nullable.
    #[serde(default)]
    pub nullify: Vec<String>,
}

impl OsdBulkEdit {
    /// The per-object form this edit applies on top of each stored OSD.
    pub fn to_form(&self) -> Result<OsdForm, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.pk.is_empty() {
            errors.add("pk", "No objects selected.");
        }
        let mut clear_cluster = false;
        for field in &self.nullify {
            match field.as_str() {
                "cluster" => clear_cluster = true,
                other => errors.add("nullify", format!("'{other}' cannot be cleared.")),
            }
        }
        if clear_cluster && self.cluster.is_some() {
            errors.add("cluster", "Cannot set and clear a field at the same time.");
        }
        errors.into_result()?;

        Ok(OsdForm {
            cluster: if clear_cluster {
                Some(None)
            } else {
                self.cluster.clone().map(Some)
            },
            osd_type: self.osd_type.clone(),
            status: self.status.clone(),
            encrypted: self.encrypted,
            ..OsdForm::default()
        })
    }
}

// ── Status note ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusNoteForm {
    #[serde(default)]
    pub osd: Option<RelatedRef>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub resolved_at: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub custom_fields: Option<CustomFields>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusNoteData {
    pub osd: u64,
    pub status: NoteStatus,
    pub reason: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub custom_fields: CustomFields,
}

impl StatusNoteForm {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationErrors> {
        parse_payload(value)
    }

    pub fn missing_required(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.osd.is_none() {
            errors.add("osd", REQUIRED);
        }
        if self.status.is_none() {
            errors.add("status", REQUIRED);
        }
        if self.reason.is_none() {
            errors.add("reason", REQUIRED);
        }
        errors
    }

    pub fn fill_from(&mut self, existing: &StatusNote) {
        self.osd.get_or_insert(RelatedRef::Id(existing.osd));
        self.status
            .get_or_insert_with(|| existing.status.value().to_string());
        self.reason.get_or_insert_with(|| existing.reason.clone());
        self.resolved.get_or_insert(existing.resolved);
        self.resolved_at
            .get_or_insert_with(|| existing.resolved_at.map(|t| t.to_rfc3339()));
        self.tags.get_or_insert_with(|| existing.tags.clone());
        self.custom_fields
            .get_or_insert_with(|| existing.custom_fields.clone());
    }

    pub fn clean(&self, inv: &Inventory, now: DateTime<Utc>) -> Result<StatusNoteData, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let osd = match &self.osd {
            Some(r) => match inv.resolve_osd(r) {
                Some(osd) => Some(osd.id),
                None => {
                    errors.add("osd", r.not_found());
                    None
                }
            },
            None => {
                errors.add("osd", REQUIRED);
                None
            }
        };

        let status = match self.status.as_deref() {
            Some(raw) => clean_choice::<NoteStatus>(&mut errors, "status", Some(raw)),
            None => {
                errors.add("status", REQUIRED);
                None
            }
        };

        let reason = self.reason.as_deref().map(str::trim).unwrap_or_default();
        if reason.is_empty() {
            errors.add("reason", REQUIRED);
        }

        let resolved_at = match self.resolved_at.as_ref().and_then(Option::as_deref) {
            Some(raw) if !raw.trim().is_empty() => match parse_datetime(raw) {
                Some(t) => Some(t),
                None => {
                    errors.add(
                        "resolved_at",
                        "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].",
                    );
                    None
                }
            },
            _ => None,
        };

        errors.into_result()?;
        let resolved = self.resolved.unwrap_or(false);
        Ok(StatusNoteData {
            osd: osd.unwrap_or_default(),
            status: status.unwrap_or(NoteStatus::Other),
            reason: reason.to_string(),
            resolved,
            resolved_at: clean_resolution(resolved, resolved_at, now),
            tags: self.tags.clone().unwrap_or_default(),
            custom_fields: self.custom_fields.clone().unwrap_or_default(),
        })
    }
}
