//! Filter sets: turn URL query pairs into a subset of registry records.
//!
//! Repeated values of one key are OR-combined, different keys are
//! AND-combined (tags are the exception: every listed tag must be present).
//! Relation filters accept ids (`cluster_id`, `device_id`, ...) or natural
//! keys (`cluster` by name, `device` by name, `site` by slug); `null` selects
//! records without the relation where the relation is optional.

use std::cmp::Ordering as CmpOrdering;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::choices::{InvalidChoice, NoteStatus, OsdStatus, OsdType};
use super::error::ValidationErrors;
use super::forms::parse_datetime;
use super::host::{Device, Rack, Site};
use super::inventory::Inventory;
use super::models::{Cluster, Osd, StatusNote};

struct Params<'a> {
    pairs: &'a [(String, String)],
    errors: ValidationErrors,
}

fn invalid_choice(value: &str) -> String {
    format!("Select a valid choice. {value} is not one of the available choices.")
}

fn icontains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_any<T: PartialEq>(set: &[T], value: &T) -> bool {
    set.is_empty() || set.contains(value)
}

impl<'a> Params<'a> {
    fn new(pairs: &'a [(String, String)]) -> Self {
        Self {
            pairs,
            errors: ValidationErrors::new(),
        }
    }

    fn all(&self, key: &str) -> Vec<&'a str> {
        self.pairs
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn last(&self, key: &str) -> Option<&'a str> {
        self.all(key).pop()
    }

    fn strings(&self, key: &str) -> Vec<String> {
        self.all(key).into_iter().map(str::to_string).collect()
    }

    fn numbers(&mut self, key: &str) -> Vec<u64> {
        let mut out = Vec::new();
        for raw in self.all(key) {
            match raw.trim().parse::<u64>() {
                Ok(n) => out.push(n),
                Err(_) => self.errors.add(key, "Enter a whole number."),
            }
        }
        out
    }

    fn boolean(&mut self, key: &str) -> Option<bool> {
        let raw = self.last(key)?;
        match parse_bool(raw) {
            Some(b) => Some(b),
            None => {
                self.errors.add(key, "Enter a valid boolean.");
                None
            }
        }
    }

    fn datetime(&mut self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.last(key)?;
        let parsed = parse_datetime(raw).or_else(|| {
            chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        });
        if parsed.is_none() {
            self.errors.add(key, "Enter a valid date/time.");
        }
        parsed
    }

    fn choices<T: FromStr<Err = InvalidChoice>>(&mut self, key: &str) -> Vec<T> {
        let mut out = Vec::new();
        for raw in self.all(key) {
            match raw.parse::<T>() {
                Ok(choice) => out.push(choice),
                Err(_) => self.errors.add(key, invalid_choice(raw)),
            }
        }
        out
    }

    /// Related ids that must exist; `null` becomes `None` when `nullable`.
    fn related_ids(
        &mut self,
        key: &str,
        nullable: bool,
        exists: impl Fn(u64) -> bool,
    ) -> Vec<Option<u64>> {
        let mut out = Vec::new();
        for raw in self.all(key) {
            if nullable && raw == "null" {
                out.push(None);
                continue;
            }
            match raw.trim().parse::<u64>() {
                Ok(id) if exists(id) => out.push(Some(id)),
                _ => self.errors.add(key, invalid_choice(raw)),
            }
        }
        out
    }

    /// Related objects named by natural key, resolved to ids.
    fn related_keys(
        &mut self,
        key: &str,
        nullable: bool,
        lookup: impl Fn(&str) -> Option<u64>,
    ) -> Vec<Option<u64>> {
        let mut out = Vec::new();
        for raw in self.all(key) {
            if nullable && raw == "null" {
                out.push(None);
                continue;
            }
            match lookup(raw) {
                Some(id) => out.push(Some(id)),
                None => self.errors.add(key, invalid_choice(raw)),
            }
        }
        out
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        self.errors.into_result().map(|_| value)
    }
}

/// Boolean literal accepted by filters and CSV import.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub field: String,
    pub descending: bool,
}

impl Ordering {
    fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        let (field, descending) = match raw.strip_prefix('-') {
            Some(f) => (f, true),
            None => (raw, false),
        };
        (!field.is_empty()).then(|| Ordering {
            field: field.to_string(),
            descending,
        })
    }

    fn apply<T>(&self, items: &mut [&T], cmp: impl Fn(&str, &T, &T) -> Option<CmpOrdering>) {
        // Unknown fields leave the default ordering in place.
        if items.len() < 2 || cmp(&self.field, items[0], items[1]).is_none() {
            return;
        }
        items.sort_by(|a, b| {
            let ord = cmp(&self.field, a, b).unwrap_or(CmpOrdering::Equal);
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}

/// Filters shared by every record type.
#[derive(Debug, Clone, Default)]
pub struct CommonFilter {
    pub ids: Vec<u64>,
    pub q: Option<String>,
    pub tags: Vec<String>,
    pub created_gte: Option<DateTime<Utc>>,
    pub created_lte: Option<DateTime<Utc>>,
    pub ordering: Option<Ordering>,
}

impl CommonFilter {
    fn parse(params: &mut Params<'_>) -> Self {
        Self {
            ids: params.numbers("id"),
            q: params.last("q").map(str::to_string),
            tags: params.strings("tag"),
            created_gte: params.datetime("created__gte"),
            created_lte: params.datetime("created__lte"),
            ordering: Ordering::parse(params.last("ordering")),
        }
    }

    fn matches(&self, id: u64, tags: &[String], created: DateTime<Utc>) -> bool {
        matches_any(&self.ids, &id)
            && self.tags.iter().all(|t| tags.contains(t))
            && self.created_gte.is_none_or(|gte| created >= gte)
            && self.created_lte.is_none_or(|lte| created <= lte)
    }
}

type CommonKey<'a> = (u64, &'a DateTime<Utc>, &'a DateTime<Utc>);

fn compare_common(field: &str, a: CommonKey<'_>, b: CommonKey<'_>) -> Option<CmpOrdering> {
    match field {
        "id" => Some(a.0.cmp(&b.0)),
        "created" => Some(a.1.cmp(b.1)),
        "last_updated" => Some(a.2.cmp(b.2)),
        _ => None,
    }
}

// ── Cluster ────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub common: CommonFilter,
    pub names: Vec<String>,
    pub name_ic: Option<String>,
    pub description_ic: Option<String>,
    pub site_ids: Vec<Option<u64>>,
    pub site_slugs: Vec<Option<u64>>,
}

impl ClusterFilter {
    pub fn parse(pairs: &[(String, String)], inv: &Inventory) -> Result<Self, ValidationErrors> {
        let mut p = Params::new(pairs);
        let filter = Self {
            common: CommonFilter::parse(&mut p),
            names: p.strings("name"),
            name_ic: p.last("name__ic").map(str::to_string),
            description_ic: p.last("description__ic").map(str::to_string),
            site_ids: p.related_ids("site_id", true, |id| inv.site(id).is_some()),
            site_slugs: p.related_keys("site", true, |slug| inv.site_by_slug(slug).map(|s| s.id)),
        };
        p.finish(filter)
    }

    pub fn matches(&self, c: &Cluster) -> bool {
        self.common.matches(c.id, &c.tags, c.created)
            && self.common.q.as_deref().is_none_or(|q| icontains(&c.name, q))
            && matches_any(&self.names, &c.name)
            && self.name_ic.as_deref().is_none_or(|n| icontains(&c.name, n))
            && self
                .description_ic
                .as_deref()
                .is_none_or(|d| icontains(&c.description, d))
            && matches_any(&self.site_ids, &c.site)
            && matches_any(&self.site_slugs, &c.site)
    }

    pub fn apply<'a>(&self, inv: &'a Inventory) -> Vec<&'a Cluster> {
        let mut out: Vec<&Cluster> = inv.clusters().into_iter().filter(|c| self.matches(c)).collect();
        if let Some(ordering) = &self.common.ordering {
            ordering.apply(&mut out, |field, a: &Cluster, b: &Cluster| match field {
                "name" => Some(a.name.cmp(&b.name)),
                _ => compare_common(
                    field,
                    (a.id, &a.created, &a.last_updated),
                    (b.id, &b.created, &b.last_updated),
                ),
            });
        }
        out
    }
}

// ── OSD ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct OsdFilter {
    pub common: CommonFilter,
    pub names: Vec<String>,
    pub name_ic: Option<String>,
    pub description_ic: Option<String>,
    pub cluster_ids: Vec<Option<u64>>,
    pub cluster_names: Vec<Option<u64>>,
    pub device_ids: Vec<Option<u64>>,
    pub device_names: Vec<Option<u64>>,
    pub rack_ids: Vec<Option<u64>>,
    pub site_ids: Vec<Option<u64>>,
    pub osd_types: Vec<OsdType>,
    pub statuses: Vec<OsdStatus>,
    pub encrypted: Option<bool>,
}

impl OsdFilter {
    pub fn parse(pairs: &[(String, String)], inv: &Inventory) -> Result<Self, ValidationErrors> {
        let mut p = Params::new(pairs);
        let filter = Self {
            common: CommonFilter::parse(&mut p),
            names: p.strings("name"),
            name_ic: p.last("name__ic").map(str::to_string),
            description_ic: p.last("description__ic").map(str::to_string),
            cluster_ids: p.related_ids("cluster_id", true, |id| inv.cluster(id).is_some()),
            cluster_names: p.related_keys("cluster", true, |name| {
                inv.cluster_by_name(name).map(|c| c.id)
            }),
            device_ids: p.related_ids("device_id", false, |id| inv.device(id).is_some()),
            device_names: p.related_keys("device", false, |name| {
                inv.device_by_name(name).map(|d| d.id)
            }),
            rack_ids: p.related_ids("rack_id", true, |id| inv.rack(id).is_some()),
            site_ids: p.related_ids("site_id", false, |id| inv.site(id).is_some()),
            osd_types: p.choices("osd_type"),
            statuses: p.choices("status"),
            encrypted: p.boolean("encrypted"),
        };
        p.finish(filter)
    }

    pub fn matches(&self, inv: &Inventory, o: &Osd) -> bool {
        let device = inv.device(o.device);
        let rack = device.and_then(|d| d.rack);
        let site = device.map(|d| d.site);

        self.common.matches(o.id, &o.tags, o.created)
            && self.common.q.as_deref().is_none_or(|q| icontains(&o.name, q))
            && matches_any(&self.names, &o.name)
            && self.name_ic.as_deref().is_none_or(|n| icontains(&o.name, n))
            && self
                .description_ic
                .as_deref()
                .is_none_or(|d| icontains(&o.description, d))
            && matches_any(&self.cluster_ids, &o.cluster)
            && matches_any(&self.cluster_names, &o.cluster)
            && matches_any(&self.device_ids, &Some(o.device))
            && matches_any(&self.device_names, &Some(o.device))
            && matches_any(&self.rack_ids, &rack)
            && matches_any(&self.site_ids, &site)
            && matches_any(&self.osd_types, &o.osd_type)
            && matches_any(&self.statuses, &o.status)
            && self.encrypted.is_none_or(|e| o.encrypted == e)
    }

    pub fn apply<'a>(&self, inv: &'a Inventory) -> Vec<&'a Osd> {
        let mut out: Vec<&Osd> = inv.osds().into_iter().filter(|o| self.matches(inv, o)).collect();
        if let Some(ordering) = &self.common.ordering {
            ordering.apply(&mut out, |field, a: &Osd, b: &Osd| match field {
                "name" => Some(a.name.cmp(&b.name)),
                "status" => Some(a.status.cmp(&b.status)),
                "osd_type" => Some(a.osd_type.cmp(&b.osd_type)),
                _ => compare_common(
                    field,
                    (a.id, &a.created, &a.last_updated),
                    (b.id, &b.created, &b.last_updated),
                ),
            });
        }
        out
    }
}

// ── Status note ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct StatusNoteFilter {
    pub common: CommonFilter,
    pub osd_ids: Vec<Option<u64>>,
    pub statuses: Vec<NoteStatus>,
    pub resolved: Option<bool>,
    pub reason_ic: Option<String>,
}

impl StatusNoteFilter {
    pub fn parse(pairs: &[(String, String)], inv: &Inventory) -> Result<Self, ValidationErrors> {
        let mut p = Params::new(pairs);
        let filter = Self {
            common: CommonFilter::parse(&mut p),
            osd_ids: p.related_ids("osd_id", false, |id| inv.osd(id).is_some()),
            statuses: p.choices("status"),
            resolved: p.boolean("resolved"),
            reason_ic: p.last("reason__ic").map(str::to_string),
        };
        p.finish(filter)
    }

    pub fn matches(&self, n: &StatusNote) -> bool {
        self.common.matches(n.id, &n.tags, n.created)
            && self.common.q.as_deref().is_none_or(|q| icontains(&n.reason, q))
            && matches_any(&self.osd_ids, &Some(n.osd))
            && matches_any(&self.statuses, &n.status)
            && self.resolved.is_none_or(|r| n.resolved == r)
            && self.reason_ic.as_deref().is_none_or(|r| icontains(&n.reason, r))
    }

    pub fn apply<'a>(&self, inv: &'a Inventory) -> Vec<&'a StatusNote> {
        let mut out: Vec<&StatusNote> = inv.notes().into_iter().filter(|n| self.matches(n)).collect();
        if let Some(ordering) = &self.common.ordering {
            ordering.apply(&mut out, |field, a: &StatusNote, b: &StatusNote| match field {
                "status" => Some(a.status.cmp(&b.status)),
                "resolved_at" => Some(a.resolved_at.cmp(&b.resolved_at)),
                _ => compare_common(
                    field,
                    (a.id, &a.created, &a.last_updated),
                    (b.id, &b.created, &b.last_updated),
                ),
            });
        }
        out
    }
}

// ── Host inventory ─────────────────────────────────────────

/// Lookups over the read-only host inventory endpoints.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    pub ids: Vec<u64>,
    pub names: Vec<String>,
    pub slugs: Vec<String>,
    pub site_ids: Vec<u64>,
    pub rack_ids: Vec<Option<u64>>,
    pub q: Option<String>,
}

impl HostFilter {
    pub fn parse(pairs: &[(String, String)]) -> Result<Self, ValidationErrors> {
        let mut p = Params::new(pairs);
        let filter = Self {
            ids: p.numbers("id"),
            names: p.strings("name"),
            slugs: p.strings("slug"),
            site_ids: p.numbers("site_id"),
            rack_ids: p.related_ids("rack_id", true, |_| true),
            q: p.last("q").map(str::to_string),
        };
        p.finish(filter)
    }

    fn matches_named(&self, id: u64, name: &str) -> bool {
        matches_any(&self.ids, &id)
            && matches_any(&self.names, &name.to_string())
            && self.q.as_deref().is_none_or(|q| icontains(name, q))
    }

    pub fn sites<'a>(&self, inv: &'a Inventory) -> Vec<&'a Site> {
        inv.sites()
            .filter(|s| self.matches_named(s.id, &s.name) && matches_any(&self.slugs, &s.slug))
            .collect()
    }

    pub fn racks<'a>(&self, inv: &'a Inventory) -> Vec<&'a Rack> {
        inv.racks()
            .filter(|r| self.matches_named(r.id, &r.name) && matches_any(&self.site_ids, &r.site))
            .collect()
    }

    pub fn devices<'a>(&self, inv: &'a Inventory) -> Vec<&'a Device> {
        inv.devices()
            .filter(|d| {
                self.matches_named(d.id, &d.name)
                    && matches_any(&self.site_ids, &d.site)
                    && matches_any(&self.rack_ids, &d.rack)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forms::OsdForm;
    use crate::domain::inventory::tests::{cluster, note, osd, seeded, t0};
    use crate::domain::inventory::UpdateMode;
    use serde_json::json;

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fixture() -> (Inventory, u64, u64) {
        let mut inv = seeded();
        let prod = cluster(&mut inv, "prod-ceph-01");
        let dev = cluster(&mut inv, "dev-ceph-01");
        osd(&mut inv, Some(prod), "storage-01", "osd.0");
        let down = osd(&mut inv, Some(prod), "storage-02", "osd.1");
        osd(&mut inv, Some(dev), "storage-03", "OSD.2");
        osd(&mut inv, None, "storage-03", "osd.3");
        let form = OsdForm::from_value(json!({"status": "down", "osd_type": "nvme", "encrypted": true}))
            .unwrap();
        inv.update_osd(down, form, UpdateMode::Partial, t0()).unwrap();
        (inv, prod, dev)
    }

    fn names(inv: &Inventory, osds: &[&Osd]) -> Vec<String> {
        osds.iter().map(|o| inv.osd_display(o)).collect()
    }

    #[test]
    fn search_is_case_insensitive() {
        let (inv, _, _) = fixture();
        let filter = OsdFilter::parse(&q(&[("q", "osd.2")]), &inv).unwrap();
        assert_eq!(names(&inv, &filter.apply(&inv)), ["OSD.2 @ storage-03"]);

        let filter = ClusterFilter::parse(&q(&[("q", "PROD")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 1);
    }

    #[test]
    fn repeated_values_are_ored_and_keys_are_anded() {
        let (inv, _, _) = fixture();
        let filter = OsdFilter::parse(
            &q(&[("status", "down"), ("status", "active"), ("device", "storage-03")]),
            &inv,
        )
        .unwrap();
        assert_eq!(
            names(&inv, &filter.apply(&inv)),
            ["OSD.2 @ storage-03", "osd.3 @ storage-03"]
        );

        let filter =
            OsdFilter::parse(&q(&[("status", "down"), ("device", "storage-03")]), &inv).unwrap();
        assert!(filter.apply(&inv).is_empty());
    }

    #[test]
    fn rack_and_site_filters_go_through_the_device() {
        let (inv, _, _) = fixture();
        // R01 and dc1 host storage-01 and storage-02.
        let filter = OsdFilter::parse(&q(&[("rack_id", "1")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 2);
        let filter = OsdFilter::parse(&q(&[("site_id", "2")]), &inv).unwrap();
        assert_eq!(
            names(&inv, &filter.apply(&inv)),
            ["OSD.2 @ storage-03", "osd.3 @ storage-03"]
        );
    }

    #[test]
    fn cluster_by_id_name_or_null() {
        let (inv, prod, _) = fixture();
        let by_id = OsdFilter::parse(&q(&[("cluster_id", &prod.to_string())]), &inv).unwrap();
        let by_name = OsdFilter::parse(&q(&[("cluster", "prod-ceph-01")]), &inv).unwrap();
        assert_eq!(by_id.apply(&inv), by_name.apply(&inv));
        assert_eq!(by_id.apply(&inv).len(), 2);

        let orphans = OsdFilter::parse(&q(&[("cluster_id", "null")]), &inv).unwrap();
        assert_eq!(names(&inv, &orphans.apply(&inv)), ["osd.3 @ storage-03"]);
    }

    #[test]
    fn boolean_and_type_filters() {
        let (inv, _, _) = fixture();
        let filter = OsdFilter::parse(&q(&[("encrypted", "true")]), &inv).unwrap();
        assert_eq!(names(&inv, &filter.apply(&inv)), ["osd.1 @ storage-02"]);
        let filter = OsdFilter::parse(&q(&[("osd_type", "hdd")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 3);
    }

    #[test]
    fn unknown_values_are_rejected() {
        let (inv, _, _) = fixture();
        let err = OsdFilter::parse(
            &q(&[("status", "up"), ("cluster", "nope"), ("device_id", "99"), ("encrypted", "maybe")]),
            &inv,
        )
        .unwrap_err();
        assert_eq!(
            err.get("status").unwrap(),
            ["Select a valid choice. up is not one of the available choices.".to_string()]
        );
        assert!(err.get("cluster").is_some());
        assert!(err.get("device_id").is_some());
        assert!(err.get("encrypted").is_some());
    }

    #[test]
    fn unknown_keys_and_empty_values_are_ignored() {
        let (inv, _, _) = fixture();
        let filter =
            OsdFilter::parse(&q(&[("limit", "5"), ("bogus", "x"), ("status", "")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 4);
    }

    #[test]
    fn cluster_site_filters() {
        let (inv, _, _) = fixture();
        let filter = ClusterFilter::parse(&q(&[("site", "dc1")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 2);
        let filter = ClusterFilter::parse(&q(&[("site_id", "2")]), &inv).unwrap();
        assert!(filter.apply(&inv).is_empty());
        assert!(ClusterFilter::parse(&q(&[("site", "mars")]), &inv).is_err());
    }

    #[test]
    fn note_filters() {
        let (mut inv, _, _) = fixture();
        let o = inv.osds()[0].id;
        note(&mut inv, o, "down", false, t0());
        note(&mut inv, o, "recovered", true, t0());
        let filter = StatusNoteFilter::parse(&q(&[("resolved", "false")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 1);
        let filter = StatusNoteFilter::parse(&q(&[("q", "smart")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv).len(), 2);
        let filter =
            StatusNoteFilter::parse(&q(&[("status", "down"), ("osd_id", &o.to_string())]), &inv)
                .unwrap();
        assert_eq!(filter.apply(&inv).len(), 1);
    }

    #[test]
    fn ordering_overrides_default() {
        let (inv, _, _) = fixture();
        let filter = OsdFilter::parse(&q(&[("ordering", "-name")]), &inv).unwrap();
        let first = filter.apply(&inv)[0];
        assert_eq!(first.name, "osd.3");

        let filter = OsdFilter::parse(&q(&[("ordering", "nonsense")]), &inv).unwrap();
        assert_eq!(filter.apply(&inv), inv.osds());
    }

    #[test]
    fn host_filters() {
        let inv = seeded();
        let f = HostFilter::parse(&q(&[("name", "storage-02")])).unwrap();
        let ids: Vec<u64> = f.devices(&inv).iter().map(|d| d.id).collect();
        assert_eq!(ids, [2]);

        let f = HostFilter::parse(&q(&[("site_id", "1")])).unwrap();
        assert_eq!(f.devices(&inv).len(), 2);
        assert_eq!(f.racks(&inv).len(), 1);

        let f = HostFilter::parse(&q(&[("slug", "dc2")])).unwrap();
        assert_eq!(f.sites(&inv)[0].name, "DC 2");

        assert!(HostFilter::parse(&q(&[("site_id", "one")])).is_err());
    }
}
