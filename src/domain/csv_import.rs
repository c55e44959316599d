//! CSV bulk import for clusters, OSDs and status notes.
//!
//! Headers are case-sensitive and checked before any row is read. Related
//! objects are named by natural key (site slug, cluster name, device name).
//! Rows are applied in order; any failing row fails the import, and the
//! caller discards the draft inventory so nothing is persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::error::{RegistryError, ValidationErrors, NON_FIELD_ERRORS};
use super::filters::parse_bool;
use super::forms::{ClusterForm, OsdForm, RelatedRef, StatusNoteForm};
use super::inventory::Inventory;

pub const CLUSTER_HEADERS: &[&str] = &["name", "site", "description"];
pub const OSD_HEADERS: &[&str] = &[
    "name",
    "cluster",
    "device",
    "osd_type",
    "encrypted",
    "status",
    "description",
];
pub const NOTE_HEADERS: &[&str] = &["osd_device", "osd_name", "status", "reason", "resolved"];

const REQUIRED: &str = "This field is required.";

struct Row {
    number: usize,
    values: BTreeMap<String, String>,
}

impl Row {
    /// Non-empty cell value.
    fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn required(&self, column: &str, errors: &mut ValidationErrors) -> Option<String> {
        let value = self.get(column).map(str::to_string);
        if value.is_none() {
            errors.add(column, REQUIRED);
        }
        value
    }

    fn boolean(&self, column: &str, errors: &mut ValidationErrors) -> Option<bool> {
        let raw = self.get(column)?;
        let parsed = parse_bool(raw);
        if parsed.is_none() {
            errors.add(column, format!("'{raw}' value must be either True or False."));
        }
        parsed
    }

    fn label(&self) -> String {
        format!("row {}", self.number)
    }
}

fn read_rows(data: &str, allowed: &[&str], required: &[&str]) -> Result<Vec<Row>, ValidationErrors> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ValidationErrors::single(NON_FIELD_ERRORS, format!("Malformed CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    // Headers are checked before any row is read
    let mut errors = ValidationErrors::new();
    for header in &headers {
        if !allowed.contains(&header.as_str()) {
            errors.add(NON_FIELD_ERRORS, format!("Unrecognized header: {header}"));
        }
    }
    for column in required {
        if !headers.iter().any(|h| h == column) {
            errors.add(NON_FIELD_ERRORS, format!("Missing required header: {column}"));
        }
    }
    errors.into_result()?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        // Data rows are numbered from 1, after the header
        let number = index + 1;
        let record = record.map_err(|e| {
            ValidationErrors::single(NON_FIELD_ERRORS, format!("Row {number}: malformed CSV: {e}"))
        })?;
        let values = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(Row { number, values });
    }
    if rows.is_empty() {
        return Err(ValidationErrors::single(NON_FIELD_ERRORS, "No data rows found."));
    }
    Ok(rows)
}

/// Apply `create` to every row, collecting the errors of all failing rows.
fn import_rows(
    inv: &mut Inventory,
    rows: Vec<Row>,
    mut create: impl FnMut(&mut Inventory, &Row) -> Result<u64, RegistryError>,
) -> Result<Vec<u64>, RegistryError> {
    let mut created = Vec::with_capacity(rows.len());
    let mut errors = ValidationErrors::new();
    for row in &rows {
        match create(inv, row) {
            Ok(id) => created.push(id),
            Err(RegistryError::Validation(row_errors)) => errors.merge(row_errors.prefixed(&row.label())),
            Err(other) => return Err(other),
        }
    }
    errors.into_result()?;
    Ok(created)
}

pub fn import_clusters(inv: &mut Inventory, data: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
    let rows = read_rows(data, CLUSTER_HEADERS, &["name"])?;
    import_rows(inv, rows, |inv, row| {
        let form = ClusterForm {
            name: row.get("name").map(str::to_string),
            site: Some(row.get("site").map(RelatedRef::slug)),
            description: row.get("description").map(str::to_string),
            ..ClusterForm::default()
        };
        inv.create_cluster(&form, now)
    })
}

pub fn import_osds(inv: &mut Inventory, data: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
    let rows = read_rows(data, OSD_HEADERS, &["name", "device", "osd_type", "status"])?;
    import_rows(inv, rows, |inv, row| {
        let mut errors = ValidationErrors::new();
        let osd_type = row.required("osd_type", &mut errors);
        let status = row.required("status", &mut errors);
        let device = row.required("device", &mut errors);
        let encrypted = row.boolean("encrypted", &mut errors);
        errors.into_result()?;

        let form = OsdForm {
            cluster: Some(row.get("cluster").map(RelatedRef::name)),
            name: row.get("name").map(str::to_string),
            device: device.as_deref().map(RelatedRef::name),
            osd_type,
            encrypted: Some(encrypted.unwrap_or(false)),
            status,
            description: row.get("description").map(str::to_string),
            ..OsdForm::default()
        };
        inv.create_osd(&form, now)
    })
}

pub fn import_notes(inv: &mut Inventory, data: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
    let rows = read_rows(data, NOTE_HEADERS, &["osd_device", "osd_name", "status", "reason"])?;
    import_rows(inv, rows, |inv, row| {
        let mut errors = ValidationErrors::new();
        let device_name = row.required("osd_device", &mut errors);
        let osd_name = row.required("osd_name", &mut errors);
        let resolved = row.boolean("resolved", &mut errors);

        let mut osd = None;
        if let (Some(device_name), Some(osd_name)) = (&device_name, &osd_name) {
            let device = inv.device_by_name(device_name);
            if device.is_none() {
                errors.add("osd_device", format!("Object not found: {device_name}"));
            }
            osd = device.and_then(|d| inv.osd_by_device_and_name(d.id, osd_name));
            if osd.is_none() {
                errors.add(
                    NON_FIELD_ERRORS,
                    format!("No OSD named '{osd_name}' found on device '{device_name}'"),
                );
            }
        }
        let osd = osd.map(|o| o.id);
        errors.into_result()?;

        let form = StatusNoteForm {
            osd: osd.map(RelatedRef::Id),
            status: row.get("status").map(str::to_string),
            reason: row.get("reason").map(str::to_string),
            resolved: Some(resolved.unwrap_or(false)),
            ..StatusNoteForm::default()
        };
        inv.create_note(&form, now)
    })
}
