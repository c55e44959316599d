//! `osd-registry query`: read clusters, OSDs and notes through the REST API.

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;

use crate::client::NetBoxClient;
use crate::config::ApiConfig;

#[derive(Subcommand)]
pub enum QueryCommands {
    /// List Ceph clusters
    Clusters,
    /// List OSDs
    Osds {
        /// Cluster name
        #[arg(long)]
        cluster: Option<String>,
        /// Device name
        #[arg(long)]
        device: Option<String>,
        /// OSD status (active, down, out, destroyed)
        #[arg(long)]
        status: Option<String>,
    },
    /// List status notes, newest first
    Notes {
        /// OSD id
        #[arg(long)]
        osd: Option<u64>,
        /// Only notes that are not resolved yet
        #[arg(long)]
        unresolved: bool,
    },
    /// OSDs hosted on one device
    DeviceOsds {
        /// Device name
        device: String,
    },
}

/// A table column: header and a dotted path into each result object.
type Column = (&'static str, &'static str);

const CLUSTER_COLUMNS: &[Column] = &[
    ("ID", "id"),
    ("NAME", "name"),
    ("SITE", "site.display"),
    ("OSDS", "osd_count"),
    ("NODES", "node_count"),
];

const OSD_COLUMNS: &[Column] = &[
    ("ID", "id"),
    ("NAME", "name"),
    ("CLUSTER", "cluster.display"),
    ("DEVICE", "device.display"),
    ("TYPE", "osd_type.label"),
    ("STATUS", "status.label"),
    ("ENCRYPTED", "encrypted"),
    ("OPEN NOTES", "open_notes"),
];

const NOTE_COLUMNS: &[Column] = &[
    ("ID", "id"),
    // Notes carry the OSD as a bare id.
    ("OSD", "osd"),
    ("STATUS", "status.label"),
    ("REASON", "reason"),
    ("RESOLVED", "resolved"),
    ("CREATED", "created"),
];

pub fn run(url: Option<&str>, format: &str, command: &QueryCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(url, format, command))
}

async fn run_async(url: Option<&str>, format: &str, command: &QueryCommands) -> Result<()> {
    // --url overrides NETBOX_URL
    let mut api_config = ApiConfig::from_env()?;
    if let Some(url) = url {
        api_config.url = url.trim_end_matches('/').to_string();
    }
    let client = NetBoxClient::new(&api_config)?;

    let (path, query, columns) = match command {
        QueryCommands::Clusters => ("/api/plugins/osd/clusters/", Vec::new(), CLUSTER_COLUMNS),
        QueryCommands::Osds {
            cluster,
            device,
            status,
        } => {
            let mut query = Vec::new();
            if let Some(c) = cluster {
                query.push(("cluster", c.clone()));
            }
            if let Some(d) = device {
                query.push(("device", d.clone()));
            }
            if let Some(s) = status {
                query.push(("status", s.clone()));
            }
            ("/api/plugins/osd/osds/", query, OSD_COLUMNS)
        }
        QueryCommands::Notes { osd, unresolved } => {
            let mut query = Vec::new();
            if let Some(id) = osd {
                query.push(("osd_id", id.to_string()));
            }
            if *unresolved {
                query.push(("resolved", "false".to_string()));
            }
            ("/api/plugins/osd/notes/", query, NOTE_COLUMNS)
        }
        QueryCommands::DeviceOsds { device } => {
            let Some(id) = client.device_id(device).await? else {
                bail!("Device '{}' not found", device);
            };
            ("/api/plugins/osd/osds/", vec![("device_id", id.to_string())], OSD_COLUMNS)
        }
    };

    // limit=0 asks for the server's maximum page size
    let mut query = query;
    query.push(("limit", "0".to_string()));
    let page = client.list::<Value>(path, &query).await?;
    if page.next.is_some() {
        eprintln!(
            "{}",
            format!("showing {} of {} results", page.results.len(), page.count).yellow()
        );
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&page.results)?),
        _ => print_table(columns, &page.results),
    }
    Ok(())
}

fn print_table(columns: &[Column], rows: &[Value]) {
    if rows.is_empty() {
        println!("{}", "No results.".dimmed());
        return;
    }
    for line in render_table(columns, rows) {
        println!("{}", line);
    }
}

fn render_table(columns: &[Column], rows: &[Value]) -> Vec<String> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|(_, path)| cell(row, path)).collect())
        .collect();

    // Column width is the widest cell or header
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, (header, _))| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header = columns
        .iter()
        .zip(&widths)
        .map(|((h, _), w)| format!("{:<w$}", h, w = *w))
        .collect::<Vec<_>>()
        .join("  ");

    let mut lines = vec![header.trim_end().bold().to_string()];
    for row in cells {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join("  ");
        lines.push(line.trim_end().to_string());
    }
    lines
}

fn cell(row: &Value, path: &str) -> String {
    let value = path.split('.').try_fold(row, |v, key| v.get(key));
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::api::serializers::Serializer;
    use crate::domain::inventory::tests::{cluster, note, osd, seeded, t0};

    #[test]
    fn cells_follow_nested_paths() {
        let row = json!({"id": 3, "cluster": null, "status": {"value": "down", "label": "Down"}});
        assert_eq!(cell(&row, "id"), "3");
        assert_eq!(cell(&row, "status.label"), "Down");
        assert_eq!(cell(&row, "cluster.display"), "-");
        assert_eq!(cell(&row, "missing"), "-");
    }

    #[test]
    fn table_columns_are_aligned() {
        colored::control::set_override(false);
        let rows = vec![
            json!({"id": 1, "name": "prod-ceph-01", "site": {"display": "DC 1"}, "osd_count": 12, "node_count": 3}),
            json!({"id": 2, "name": "lab", "site": {"display": "DC 2"}, "osd_count": 0, "node_count": 0}),
        ];
        let lines = render_table(CLUSTER_COLUMNS, &rows);
        assert_eq!(lines[0], "ID  NAME          SITE  OSDS  NODES");
        assert_eq!(lines[1], "1   prod-ceph-01  DC 1  12    3");
        assert_eq!(lines[2], "2   lab           DC 2  0     0");
    }

    #[test]
    fn columns_resolve_against_api_payloads() {
        let mut inv = seeded();
        let c = cluster(&mut inv, "prod-ceph-01");
        let o = osd(&mut inv, Some(c), "storage-01", "osd.0");
        let n = note(&mut inv, o, "down", false, t0());
        let s = Serializer::new(&inv, "");

        let cluster_row = serde_json::to_value(s.cluster(inv.cluster(c).unwrap())).unwrap();
        let osd_row = serde_json::to_value(s.osd(inv.osd(o).unwrap())).unwrap();
        let note_row = serde_json::to_value(s.note(inv.note(n).unwrap())).unwrap();

        for (columns, row) in [
            (CLUSTER_COLUMNS, &cluster_row),
            (OSD_COLUMNS, &osd_row),
            (NOTE_COLUMNS, &note_row),
        ] {
            for (header, path) in columns {
                assert_ne!(cell(row, path), "-", "column {header} ({path}) is empty");
            }
        }
        assert_eq!(cell(&note_row, "osd"), o.to_string());
        assert_eq!(cell(&note_row, "status.label"), "Down");
    }

    #[test]
    fn note_table_shows_the_osd() {
        colored::control::set_override(false);
        let mut inv = seeded();
        let o = osd(&mut inv, None, "storage-03", "osd.7");
        let n = note(&mut inv, o, "out", true, t0());
        let row = serde_json::to_value(Serializer::new(&inv, "").note(inv.note(n).unwrap())).unwrap();

        let lines = render_table(NOTE_COLUMNS, &[row]);
        let cells: Vec<&str> = lines[1].split("  ").map(str::trim).filter(|c| !c.is_empty()).collect();
        assert_eq!(cells[0], n.to_string());
        assert_eq!(cells[1], o.to_string());
        assert_eq!(cells[2], "Out");
        assert_eq!(cells[4], "true");
    }
}
