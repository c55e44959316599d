//! `osd-registry import`: bulk-create OSDs from a YAML document through the REST API.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::client::{NetBoxClient, Rejected};
use crate::config::ApiConfig;
use crate::domain::choices::{OsdStatus, OsdType};

/// The YAML import document.
///
/// ```yaml
/// cluster: prod-ceph-01
/// osds:
///   - name: osd.0
///     device: storage-01
///     osd_type: ssd
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub cluster: Option<String>,
    pub osds: Vec<OsdSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OsdSpec {
    pub name: String,
    pub device: String,
    #[serde(default)]
    pub osd_type: OsdType,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub status: OsdStatus,
    #[serde(default)]
    pub description: String,
}

/// One element of the bulk create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOsd {
    pub name: String,
    pub cluster: Option<u64>,
    pub device: u64,
    pub osd_type: OsdType,
    pub encrypted: bool,
    pub status: OsdStatus,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Cluster '{0}' not found in NetBox")]
    ClusterNotFound(String),
    #[error("Device '{0}' not found in NetBox")]
    DeviceNotFound(String),
    #[error("ERROR {}: {}", .0.status.as_u16(), .0.body)]
    Rejected(Rejected),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// The registry operations an import needs.
#[allow(async_fn_in_trait)]
pub trait InventoryApi {
    async fn cluster_id(&self, name: &str) -> Result<Option<u64>>;
    async fn device_id(&self, name: &str) -> Result<Option<u64>>;
    async fn create_osds(&self, osds: &[NewOsd]) -> Result<Result<usize, Rejected>>;
}

impl InventoryApi for NetBoxClient {
    async fn cluster_id(&self, name: &str) -> Result<Option<u64>> {
        NetBoxClient::cluster_id(self, name).await
    }

    async fn device_id(&self, name: &str) -> Result<Option<u64>> {
        NetBoxClient::device_id(self, name).await
    }

    async fn create_osds(&self, osds: &[NewOsd]) -> Result<Result<usize, Rejected>> {
        Ok(NetBoxClient::create_osds(self, osds).await?.map(|created| created.len()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub cluster: Option<(String, u64)>,
    pub created: usize,
}

pub fn load_document(path: &Path) -> Result<ImportDocument> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Resolve names to ids and submit every OSD in a single bulk request.
///
/// Each distinct device name is looked up once. Nothing is submitted if any
/// name fails to resolve. A missing or blank `cluster` leaves every OSD
/// without a cluster.
pub async fn run_import<A: InventoryApi>(api: &A, doc: &ImportDocument) -> Result<ImportSummary, ImportError> {
    // A blank cluster name means "no cluster", never an unfiltered lookup.
    let cluster = match doc.cluster.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => {
            let id = api
                .cluster_id(name)
                .await?
                .ok_or_else(|| ImportError::ClusterNotFound(name.to_string()))?;
            Some((name.to_string(), id))
        }
        None => None,
    };
    let cluster_id = cluster.as_ref().map(|(_, id)| *id);

    // Device ids by name; one lookup per distinct device
    let mut devices: HashMap<&str, u64> = HashMap::new();
    let mut payload = Vec::with_capacity(doc.osds.len());
    for entry in &doc.osds {
        let device = match devices.get(entry.device.as_str()) {
            Some(id) => *id,
            None => {
                let id = api
                    .device_id(&entry.device)
                    .await?
                    .ok_or_else(|| ImportError::DeviceNotFound(entry.device.clone()))?;
                devices.insert(&entry.device, id);
                id
            }
        };
        payload.push(NewOsd {
            name: entry.name.clone(),
            cluster: cluster_id,
            device,
            osd_type: entry.osd_type,
            encrypted: entry.encrypted,
            status: entry.status,
            description: entry.description.clone(),
        });
    }

    tracing::debug!(count = payload.len(), devices = devices.len(), "submitting bulk OSD create");
    let created = api.create_osds(&payload).await?.map_err(ImportError::Rejected)?;
    Ok(ImportSummary { cluster, created })
}

pub fn run(file: &Path) -> Result<()> {
    // Token is checked before the file is even read
    let api_config = ApiConfig::from_env()?;
    api_config.require_token()?;
    let doc = load_document(file)?;
    let client = NetBoxClient::new(&api_config)?;

    println!(
        "Importing {} OSDs from {} into {}...",
        doc.osds.len(),
        file.display(),
        client.base_url()
    );

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(run_import(&client, &doc)) {
        Ok(summary) => {
            if let Some((name, id)) = summary.cluster {
                println!("  Cluster: {} -> id={}", name.bold(), id);
            }
            println!("  {} Created {} OSDs.", "✓".green(), summary.created);
            Ok(())
        }
        // Transport failures keep their anyhow context chain
        Err(ImportError::Transport(err)) => Err(err),
        Err(err) => {
            eprintln!("  {} {}", "✗".red(), err);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use reqwest::StatusCode;

    use crate::config::ServerConfig;
    use crate::domain::inventory::tests::{cluster, seeded};
    use crate::domain::registry_service::RegistryService;

    const DOC: &str = "\
cluster: prod-ceph-01
osds:
  - name: osd.0
    device: storage-01
    osd_type: ssd
    encrypted: true
  - name: osd.1
    device: storage-01
  - name: osd.2
    device: storage-03
    status: down
    description: replaced disk
";

    #[derive(Default)]
    struct FakeApi {
        device_lookups: Mutex<Vec<String>>,
        submitted: Mutex<Vec<NewOsd>>,
        reject: bool,
    }

    impl InventoryApi for FakeApi {
        async fn cluster_id(&self, name: &str) -> Result<Option<u64>> {
            Ok((name == "prod-ceph-01").then_some(4))
        }

        async fn device_id(&self, name: &str) -> Result<Option<u64>> {
            self.device_lookups.lock().unwrap().push(name.to_string());
            Ok(match name {
                "storage-01" => Some(1),
                "storage-03" => Some(3),
                _ => None,
            })
        }

        async fn create_osds(&self, osds: &[NewOsd]) -> Result<Result<usize, Rejected>> {
            if self.reject {
                return Ok(Err(Rejected {
                    status: StatusCode::BAD_REQUEST,
                    body: r#"{"0.name":["exists"]}"#.into(),
                }));
            }
            self.submitted.lock().unwrap().extend_from_slice(osds);
            Ok(Ok(osds.len()))
        }
    }

    fn doc() -> ImportDocument {
        serde_yaml::from_str(DOC).unwrap()
    }

    #[test]
    fn document_defaults() {
        let doc = doc();
        assert_eq!(doc.cluster.as_deref(), Some("prod-ceph-01"));
        assert_eq!(doc.osds[1].osd_type, OsdType::Hdd);
        assert_eq!(doc.osds[1].status, OsdStatus::Active);
        assert!(!doc.osds[1].encrypted);
        assert_eq!(doc.osds[1].description, "");
        assert_eq!(doc.osds[2].status, OsdStatus::Down);
    }

    #[test]
    fn unknown_choice_is_a_parse_error() {
        let result: Result<ImportDocument, _> =
            serde_yaml::from_str("osds:\n  - name: osd.0\n    device: d\n    osd_type: tape\n");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn caches_device_lookups() {
        let api = FakeApi::default();
        let summary = run_import(&api, &doc()).await.unwrap();
        assert_eq!(summary.created, 3);
        assert_eq!(summary.cluster, Some(("prod-ceph-01".to_string(), 4)));
        assert_eq!(*api.device_lookups.lock().unwrap(), vec!["storage-01", "storage-03"]);

        let submitted = api.submitted.lock().unwrap();
        assert_eq!(submitted[0].cluster, Some(4));
        assert_eq!(submitted[0].osd_type, OsdType::Ssd);
        assert!(submitted[0].encrypted);
        assert_eq!(submitted[2].device, 3);
    }

    #[tokio::test]
    async fn missing_cluster_submits_nothing() {
        let api = FakeApi::default();
        let mut doc = doc();
        doc.cluster = Some("staging".into());
        let err = run_import(&api, &doc).await.unwrap_err();
        assert_eq!(err.to_string(), "Cluster 'staging' not found in NetBox");
        assert!(api.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_device_submits_nothing() {
        let api = FakeApi::default();
        let mut doc = doc();
        doc.osds[2].device = "storage-99".into();
        let err = run_import(&api, &doc).await.unwrap_err();
        assert_eq!(err.to_string(), "Device 'storage-99' not found in NetBox");
        assert!(api.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_cluster_means_null_cluster() {
        let api = FakeApi::default();
        let mut doc = doc();
        doc.cluster = None;
        let summary = run_import(&api, &doc).await.unwrap();
        assert_eq!(summary.cluster, None);
        assert!(api.submitted.lock().unwrap().iter().all(|o| o.cluster.is_none()));
    }

    #[tokio::test]
    async fn blank_cluster_means_no_cluster() {
        for blank in ["\"\"", "\"  \""] {
            let api = FakeApi::default();
            let doc: ImportDocument = serde_yaml::from_str(&format!(
                "cluster: {blank}\nosds:\n  - name: osd.0\n    device: storage-01\n"
            ))
            .unwrap();
            let summary = run_import(&api, &doc).await.unwrap();
            assert_eq!(summary.cluster, None);
            let submitted = api.submitted.lock().unwrap();
            assert_eq!(submitted.len(), 1);
            assert_eq!(submitted[0].cluster, None);
        }
    }

    #[tokio::test]
    async fn rejection_reports_status_and_body() {
        let api = FakeApi {
            reject: true,
            ..FakeApi::default()
        };
        let err = run_import(&api, &doc()).await.unwrap_err();
        assert_eq!(err.to_string(), r#"ERROR 400: {"0.name":["exists"]}"#);
    }

    /// Delegates to the real client and counts device lookups.
    struct Counting<'a> {
        inner: &'a NetBoxClient,
        device_lookups: Mutex<usize>,
    }

    impl InventoryApi for Counting<'_> {
        async fn cluster_id(&self, name: &str) -> Result<Option<u64>> {
            InventoryApi::cluster_id(self.inner, name).await
        }

        async fn device_id(&self, name: &str) -> Result<Option<u64>> {
            *self.device_lookups.lock().unwrap() += 1;
            InventoryApi::device_id(self.inner, name).await
        }

        async fn create_osds(&self, osds: &[NewOsd]) -> Result<Result<usize, Rejected>> {
            InventoryApi::create_osds(self.inner, osds).await
        }
    }

    #[tokio::test]
    async fn imports_against_running_server() {
        let mut inv = seeded();
        let cluster_id = cluster(&mut inv, "prod-ceph-01");
        let service = RegistryService::new(inv, None);
        let app = crate::server::app(service.clone(), Arc::new(ServerConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });

        let client = NetBoxClient::new(&ApiConfig {
            url: format!("http://{addr}"),
            token: Some("0123456789abcdef".into()),
        })
        .unwrap();
        let api = Counting {
            inner: &client,
            device_lookups: Mutex::new(0),
        };
        let doc: ImportDocument = serde_yaml::from_str(
            "cluster: prod-ceph-01\nosds:\n  - name: osd.0\n    device: storage-01\n  - name: osd.1\n    device: storage-01\n",
        )
        .unwrap();

        let summary = run_import(&api, &doc).await.unwrap();
        assert_eq!(summary.created, 2);
        assert_eq!(*api.device_lookups.lock().unwrap(), 1);

        let osds = service
            .read(|inv| {
                inv.osds()
                    .into_iter()
                    .map(|o| (o.cluster, o.device, o.osd_type, o.encrypted, o.status))
                    .collect::<Vec<_>>()
            })
            .await;
        assert_eq!(osds.len(), 2);
        for osd in osds {
            assert_eq!(osd, (Some(cluster_id), 1, OsdType::Hdd, false, OsdStatus::Active));
        }

        // Names are unique per device, so a second run is refused as a whole.
        let err = run_import(&api, &doc).await.unwrap_err();
        match err {
            ImportError::Rejected(rejected) => assert_eq!(rejected.status, StatusCode::BAD_REQUEST),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.read(|inv| inv.osds().len()).await, 2);

        // A blank cluster name must not resolve to the first listed cluster.
        let blank: ImportDocument =
            serde_yaml::from_str("cluster: \"\"\nosds:\n  - name: osd.9\n    device: storage-02\n").unwrap();
        let summary = run_import(&api, &blank).await.unwrap();
        assert_eq!(summary.cluster, None);
        let cluster_of_new = service
            .read(|inv| inv.osds().into_iter().find(|o| o.name == "osd.9").map(|o| o.cluster))
            .await;
        assert_eq!(cluster_of_new, Some(None));
    }
}
