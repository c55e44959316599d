use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::serializers::{self, Serializer};
use crate::config::ServerConfig;
use crate::domain::error::{ObjectKind, RegistryError, ValidationErrors};
use crate::domain::filters::{parse_bool, ClusterFilter, HostFilter, OsdFilter, StatusNoteFilter};
use crate::domain::forms::{ClusterForm, OsdForm, StatusNoteForm};
use crate::domain::inventory::{Inventory, UpdateMode};
use crate::domain::registry_service::RegistryService;

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegistryService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn base_url(&self) -> &str {
        &self.config.public_url
    }
}

pub(crate) type Pairs = Query<Vec<(String, String)>>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status/", get(status))
        .route(
            "/api/plugins/osd/clusters/",
            get(list::<Clusters>).post(create::<Clusters>).delete(bulk_destroy::<Clusters>),
        )
        .route(
            "/api/plugins/osd/clusters/{id}/",
            get(retrieve::<Clusters>)
                .put(update::<Clusters>)
                .patch(partial_update::<Clusters>)
                .delete(destroy::<Clusters>),
        )
        .route(
            "/api/plugins/osd/osds/",
            get(list::<Osds>).post(create::<Osds>).delete(bulk_destroy::<Osds>),
        )
        .route(
            "/api/plugins/osd/osds/{id}/",
            get(retrieve::<Osds>)
                .put(update::<Osds>)
                .patch(partial_update::<Osds>)
                .delete(destroy::<Osds>),
        )
        .route(
            "/api/plugins/osd/notes/",
            get(list::<Notes>).post(create::<Notes>).delete(bulk_destroy::<Notes>),
        )
        .route(
            "/api/plugins/osd/notes/{id}/",
            get(retrieve::<Notes>)
                .put(update::<Notes>)
                .patch(partial_update::<Notes>)
                .delete(destroy::<Notes>),
        )
        .route("/api/dcim/sites/", get(list_sites))
        .route("/api/dcim/sites/{id}/", get(retrieve_site))
        .route("/api/dcim/racks/", get(list_racks))
        .route("/api/dcim/racks/{id}/", get(retrieve_rack))
        .route("/api/dcim/devices/", get(list_devices))
        .route("/api/dcim/devices/{id}/", get(retrieve_device).delete(destroy_device))
        .with_state(state)
}

// ── Resources ──────────────────────────────────────────────

/// One registry object type exposed over the API: how to select, render,
/// validate and remove it.
pub trait Resource: Send + Sync + 'static {
    const KIND: ObjectKind;
    const PATH: &'static str;
    type Full: Serialize + Send;
    type Brief: Serialize + Send;

    /// Ids matching the query, in list order.
    fn select(inv: &Inventory, pairs: &[(String, String)]) -> Result<Vec<u64>, ValidationErrors>;
    fn full(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Full>;
    fn brief(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Brief>;
    fn create(inv: &mut Inventory, body: Value, now: DateTime<Utc>) -> Result<u64, RegistryError>;
    fn update(
        inv: &mut Inventory,
        id: u64,
        body: Value,
        mode: UpdateMode,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError>;
    fn delete(inv: &mut Inventory, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError>;
}

pub struct Clusters;
pub struct Osds;
pub struct Notes;

impl Resource for Clusters {
    const KIND: ObjectKind = ObjectKind::Cluster;
    const PATH: &'static str = serializers::CLUSTERS_PATH;
    type Full = serializers::ClusterPayload;
    type Brief = serializers::BriefCluster;

    fn select(inv: &Inventory, pairs: &[(String, String)]) -> Result<Vec<u64>, ValidationErrors> {
        let filter = ClusterFilter::parse(pairs, inv)?;
        Ok(filter.apply(inv).iter().map(|c| c.id).collect())
    }

    fn full(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Full> {
        inv.cluster(id).map(|c| s.cluster(c))
    }

    fn brief(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Brief> {
        inv.cluster(id).map(|c| s.brief_cluster(c))
    }

    fn create(inv: &mut Inventory, body: Value, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        inv.create_cluster(&ClusterForm::from_value(body)?, now)
    }

    fn update(inv: &mut Inventory, id: u64, body: Value, mode: UpdateMode, now: DateTime<Utc>) -> Result<(), RegistryError> {
        inv.update_cluster(id, ClusterForm::from_value(body)?, mode, now)
    }

    fn delete(inv: &mut Inventory, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        inv.delete_cluster(id, now)
    }
}

impl Resource for Osds {
    const KIND: ObjectKind = ObjectKind::Osd;
    const PATH: &'static str = serializers::OSDS_PATH;
    type Full = serializers::OsdPayload;
    type Brief = serializers::BriefOsd;

    fn select(inv: &Inventory, pairs: &[(String, String)]) -> Result<Vec<u64>, ValidationErrors> {
        let filter = OsdFilter::parse(pairs, inv)?;
        Ok(filter.apply(inv).iter().map(|o| o.id).collect())
    }

    fn full(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Full> {
        inv.osd(id).map(|o| s.osd(o))
    }

    fn brief(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Brief> {
        inv.osd(id).map(|o| s.brief_osd(o))
    }

    fn create(inv: &mut Inventory, body: Value, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        inv.create_osd(&OsdForm::from_value(body)?, now)
    }

    fn update(inv: &mut Inventory, id: u64, body: Value, mode: UpdateMode, now: DateTime<Utc>) -> Result<(), RegistryError> {
        inv.update_osd(id, OsdForm::from_value(body)?, mode, now)
    }

    fn delete(inv: &mut Inventory, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        inv.delete_osd(id, now)
    }
}

impl Resource for Notes {
    const KIND: ObjectKind = ObjectKind::StatusNote;
    const PATH: &'static str = serializers::NOTES_PATH;
    type Full = serializers::NotePayload;
    type Brief = serializers::BriefNote;

    fn select(inv: &Inventory, pairs: &[(String, String)]) -> Result<Vec<u64>, ValidationErrors> {
        let filter = StatusNoteFilter::parse(pairs, inv)?;
        Ok(filter.apply(inv).iter().map(|n| n.id).collect())
    }

    fn full(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Full> {
        inv.note(id).map(|n| s.note(n))
    }

    fn brief(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Brief> {
        inv.note(id).map(|n| s.brief_note(n))
    }

    fn create(inv: &mut Inventory, body: Value, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        inv.create_note(&StatusNoteForm::from_value(body)?, now)
    }

    fn update(inv: &mut Inventory, id: u64, body: Value, mode: UpdateMode, now: DateTime<Utc>) -> Result<(), RegistryError> {
        inv.update_note(id, StatusNoteForm::from_value(body)?, mode, now)
    }

    fn delete(inv: &mut Inventory, id: u64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        inv.delete_note(id, now)
    }
}

pub(crate) fn not_found(kind: ObjectKind, id: u64) -> RegistryError {
    RegistryError::NotFound { kind, id }
}

// ── Pagination ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Paging {
    pub(crate) limit: usize,
    pub(crate) offset: usize,
}

impl Paging {
    /// `limit=0` asks for the largest page the server allows.
    pub(crate) fn parse(pairs: &[(String, String)], config: &ServerConfig) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut number = |key: &str| -> Option<usize> {
            let raw = pairs.iter().rev().find(|(k, v)| k == key && !v.is_empty())?;
            match raw.1.trim().parse::<usize>() {
                Ok(n) => Some(n),
                Err(_) => {
                    errors.add(key, "Enter a whole number.");
                    None
                }
            }
        };
        let limit = match number("limit") {
            Some(0) => config.max_page_size,
            Some(n) => n.min(config.max_page_size),
            None => config.page_size,
        };
        let offset = number("offset").unwrap_or(0);
        errors.into_result()?;
        Ok(Self { limit, offset })
    }

    pub(crate) fn window<'a>(&self, ids: &'a [u64]) -> &'a [u64] {
        let start = self.offset.min(ids.len());
        let end = self.offset.saturating_add(self.limit).min(ids.len());
        &ids[start..end]
    }

    fn link(&self, base: &str, path: &str, pairs: &[(String, String)], offset: usize) -> Option<String> {
        let mut url = Url::parse("http://localhost/").ok()?;
        url.set_path(&format!("{path}/"));
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in pairs.iter().filter(|(k, _)| k != "limit" && k != "offset") {
                query.append_pair(k, v);
            }
            query.append_pair("limit", &self.limit.to_string());
            if offset > 0 {
                query.append_pair("offset", &offset.to_string());
            }
        }
        Some(format!(
            "{}{}?{}",
            base.trim_end_matches('/'),
            url.path(),
            url.query().unwrap_or_default()
        ))
    }

    pub(crate) fn page<T>(&self, base: &str, path: &str, pairs: &[(String, String)], count: usize, results: Vec<T>) -> Page<T> {
        let next = (self.offset.saturating_add(self.limit) < count)
            .then(|| self.link(base, path, pairs, self.offset + self.limit))
            .flatten();
        let previous = (self.offset > 0 && self.limit > 0)
            .then(|| self.link(base, path, pairs, self.offset.saturating_sub(self.limit)))
            .flatten();
        Page {
            count,
            next,
            previous,
            results,
        }
    }
}

fn wants_brief(pairs: &[(String, String)]) -> bool {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == "brief")
        .and_then(|(_, v)| parse_bool(v))
        .unwrap_or(false)
}

// ── Registry handlers ──────────────────────────────────────

async fn list<R: Resource>(State(state): State<AppState>, Query(pairs): Pairs) -> ApiResult<Response> {
    let paging = Paging::parse(&pairs, &state.config)?;
    let brief = wants_brief(&pairs);
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let ids = R::select(inv, &pairs)?;
            let s = Serializer::new(inv, base);
            let window = paging.window(&ids);
            let response = if brief {
                let results = window.iter().filter_map(|&id| R::brief(inv, &s, id)).collect();
                Json(paging.page(base, R::PATH, &pairs, ids.len(), results)).into_response()
            } else {
                let results = window.iter().filter_map(|&id| R::full(inv, &s, id)).collect();
                Json(paging.page(base, R::PATH, &pairs, ids.len(), results)).into_response()
            };
            Ok(response)
        })
        .await
}

async fn retrieve<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(pairs): Pairs,
) -> ApiResult<Response> {
    let brief = wants_brief(&pairs);
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let s = Serializer::new(inv, base);
            let response = if brief {
                Json(R::brief(inv, &s, id).ok_or(not_found(R::KIND, id))?).into_response()
            } else {
                Json(R::full(inv, &s, id).ok_or(not_found(R::KIND, id))?).into_response()
            };
            Ok(response)
        })
        .await
}

/// Create one object, or every object of a JSON array in one atomic write.
async fn create<R: Resource>(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Response> {
    let base = state.base_url();
    match body {
        // Array body: bulk create, all or nothing
        Value::Array(items) => {
            let created = state
                .service
                .write(|inv, now| {
                    let mut ids = Vec::with_capacity(items.len());
                    let mut errors = ValidationErrors::new();
                    for (index, item) in items.into_iter().enumerate() {
                        match R::create(inv, item, now) {
                            Ok(id) => ids.push(id),
                            Err(RegistryError::Validation(e)) => errors.merge(e.prefixed(&index.to_string())),
                            Err(other) => return Err(other),
                        }
                    }
                    // Report every failing item, not just the first
                    errors.into_result()?;
                    let s = Serializer::new(inv, base);
                    Ok(ids.iter().filter_map(|&id| R::full(inv, &s, id)).collect::<Vec<_>>())
                })
                .await?;
            info!(kind = R::KIND.label(), count = created.len(), "bulk created");
            Ok((StatusCode::CREATED, Json(created)).into_response())
        }
        item => {
            let (id, payload) = state
                .service
                .write(|inv, now| {
                    let id = R::create(inv, item, now)?;
                    let s = Serializer::new(inv, base);
                    Ok((id, R::full(inv, &s, id)))
                })
                .await?;
            info!(kind = R::KIND.label(), id, "created");
            Ok((StatusCode::CREATED, Json(payload)).into_response())
        }
    }
}

async fn write_update<R: Resource>(state: &AppState, id: u64, body: Value, mode: UpdateMode) -> ApiResult<Response> {
    let base = state.base_url();
    let payload = state
        .service
        .write(|inv, now| {
            R::update(inv, id, body, mode, now)?;
            let s = Serializer::new(inv, base);
            R::full(inv, &s, id).ok_or(not_found(R::KIND, id))
        })
        .await?;
    info!(kind = R::KIND.label(), id, ?mode, "updated");
    Ok(Json(payload).into_response())
}

async fn update<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    write_update::<R>(&state, id, body, UpdateMode::Full).await
}

async fn partial_update<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    write_update::<R>(&state, id, body, UpdateMode::Partial).await
}

async fn destroy<R: Resource>(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    state.service.write(|inv, now| R::delete(inv, id, now)).await?;
    info!(kind = R::KIND.label(), id, "deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: u64,
}

async fn bulk_destroy<R: Resource>(
    State(state): State<AppState>,
    Json(body): Json<Vec<IdRef>>,
) -> ApiResult<StatusCode> {
    let ids: Vec<u64> = body.into_iter().map(|r| r.id).collect();
    let count = state
        .service
        .write(|inv, now| inv.bulk_delete(R::KIND, &ids, now))
        .await?;
    info!(kind = R::KIND.label(), count, "bulk deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Host inventory handlers ────────────────────────────────

async fn list_sites(State(state): State<AppState>, Query(pairs): Pairs) -> ApiResult<Response> {
    let paging = Paging::parse(&pairs, &state.config)?;
    let filter = HostFilter::parse(&pairs)?;
    let base = state.base_url();
    let response = state
        .service
        .read(|inv| {
            let s = Serializer::new(inv, base);
            let sites = filter.sites(inv);
            let results = sites
                .iter()
                .skip(paging.offset)
                .take(paging.limit)
                .map(|site| s.brief_site(site))
                .collect();
            Json(paging.page(base, serializers::SITES_PATH, &pairs, sites.len(), results)).into_response()
        })
        .await;
    Ok(response)
}

async fn retrieve_site(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Response> {
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let site = inv.site(id).ok_or(not_found(ObjectKind::Site, id))?;
            Ok(Json(Serializer::new(inv, base).brief_site(site)).into_response())
        })
        .await
}

async fn list_racks(State(state): State<AppState>, Query(pairs): Pairs) -> ApiResult<Response> {
    let paging = Paging::parse(&pairs, &state.config)?;
    let filter = HostFilter::parse(&pairs)?;
    let base = state.base_url();
    let response = state
        .service
        .read(|inv| {
            let s = Serializer::new(inv, base);
            let racks = filter.racks(inv);
            let results = racks
                .iter()
                .skip(paging.offset)
                .take(paging.limit)
                .map(|rack| s.rack(rack))
                .collect();
            Json(paging.page(base, serializers::RACKS_PATH, &pairs, racks.len(), results)).into_response()
        })
        .await;
    Ok(response)
}

async fn retrieve_rack(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Response> {
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let rack = inv.rack(id).ok_or(not_found(ObjectKind::Rack, id))?;
            Ok(Json(Serializer::new(inv, base).rack(rack)).into_response())
        })
        .await
}

async fn list_devices(State(state): State<AppState>, Query(pairs): Pairs) -> ApiResult<Response> {
    let paging = Paging::parse(&pairs, &state.config)?;
    let filter = HostFilter::parse(&pairs)?;
    let base = state.base_url();
    let response = state
        .service
        .read(|inv| {
            let s = Serializer::new(inv, base);
            let devices = filter.devices(inv);
            let results = devices
                .iter()
                .skip(paging.offset)
                .take(paging.limit)
                .map(|device| s.device(device))
                .collect();
            Json(paging.page(base, serializers::DEVICES_PATH, &pairs, devices.len(), results)).into_response()
        })
        .await;
    Ok(response)
}

async fn retrieve_device(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Response> {
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let device = inv.device(id).ok_or(not_found(ObjectKind::Device, id))?;
            Ok(Json(Serializer::new(inv, base).device(device)).into_response())
        })
        .await
}

/// Remove a device; its OSDs and their notes go with it.
async fn destroy_device(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    state.service.write(|inv, now| inv.delete_device(id, now)).await?;
    info!(id, "device deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Service status ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub persistent: bool,
    pub sites: usize,
    pub devices: usize,
    pub clusters: usize,
    pub osds: usize,
    pub notes: usize,
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let persistent = state.config.data_file.is_some();
    let report = state
        .service
        .read(|inv| StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            persistent,
            sites: inv.sites().count(),
            devices: inv.devices().count(),
            clusters: inv.clusters().len(),
            osds: inv.osds().len(),
            notes: inv.notes().len(),
        })
        .await;
    Json(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::inventory::tests::seeded;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    pub(crate) fn state() -> AppState {
        AppState {
            service: RegistryService::new(seeded(), None),
            config: Arc::new(ServerConfig {
                page_size: 2,
                ..ServerConfig::default()
            }),
        }
    }

    pub(crate) async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                request = request.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn create_and_retrieve_osd() {
        let app = router(state());
        let (status, cluster) = call(
            &app,
            Method::POST,
            "/api/plugins/osd/clusters/",
            Some(json!({"name": "prod-ceph-01", "site": {"slug": "dc1"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(cluster["display"], "prod-ceph-01");

        let (status, osd) = call(
            &app,
            Method::POST,
            "/api/plugins/osd/osds/",
            Some(json!({"cluster": cluster["id"], "device": {"name": "storage-01"}, "name": "osd.0", "osd_type": "nvme"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(osd["display"], "osd.0 @ storage-01");
        assert_eq!(osd["osd_type"]["value"], "nvme");
        assert_eq!(osd["status"]["value"], "active");
        assert_eq!(osd["rack"]["name"], "R01");

        let (status, cluster) = call(&app, Method::GET, "/api/plugins/osd/clusters/1/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cluster["osd_count"], 1);
        assert_eq!(cluster["node_count"], 1);
    }

    #[tokio::test]
    async fn duplicate_osd_is_a_field_error() {
        let app = router(state());
        let body = json!({"device": 1, "name": "osd.0"});
        call(&app, Method::POST, "/api/plugins/osd/osds/", Some(body.clone())).await;
        let (status, errors) = call(&app, Method::POST, "/api/plugins/osd/osds/", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            errors["non_field_errors"][0],
            "Ceph OSD with this Device and Name already exists."
        );
    }

    #[tokio::test]
    async fn bulk_create_is_all_or_nothing() {
        let app = router(state());
        let (status, errors) = call(
            &app,
            Method::POST,
            "/api/plugins/osd/osds/",
            Some(json!([
                {"device": 1, "name": "osd.0"},
                {"device": 1, "name": "osd.1", "status": "exploded"},
            ])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(errors["1.status"].is_array());

        let (_, page) = call(&app, Method::GET, "/api/plugins/osd/osds/", None).await;
        assert_eq!(page["count"], 0);

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/plugins/osd/osds/",
            Some(json!([{"device": 1, "name": "osd.0"}, {"device": 2, "name": "osd.0"}])),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_paginates_and_filters() {
        let app = router(state());
        for (device, name) in [(1, "osd.0"), (1, "osd.1"), (2, "osd.2"), (3, "osd.3")] {
            call(&app, Method::POST, "/api/plugins/osd/osds/", Some(json!({"device": device, "name": name}))).await;
        }

        let (_, page) = call(&app, Method::GET, "/api/plugins/osd/osds/", None).await;
        assert_eq!(page["count"], 4);
        assert_eq!(page["results"].as_array().unwrap().len(), 2);
        assert_eq!(page["next"], "/api/plugins/osd/osds/?limit=2&offset=2");
        assert!(page["previous"].is_null());

        let (_, page) = call(&app, Method::GET, "/api/plugins/osd/osds/?limit=2&offset=2", None).await;
        assert!(page["next"].is_null());
        assert_eq!(page["previous"], "/api/plugins/osd/osds/?limit=2");

        let (_, page) = call(&app, Method::GET, "/api/plugins/osd/osds/?site_id=1&brief=true", None).await;
        assert_eq!(page["count"], 3);
        assert!(page["results"][0].get("osd_type").is_none());

        let (status, errors) = call(&app, Method::GET, "/api/plugins/osd/osds/?status=exploded", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            errors["status"][0],
            "Select a valid choice. exploded is not one of the available choices."
        );
    }

    #[tokio::test]
    async fn put_requires_mandatory_fields_patch_does_not() {
        let app = router(state());
        call(&app, Method::POST, "/api/plugins/osd/osds/", Some(json!({"device": 1, "name": "osd.0"}))).await;

        let (status, errors) = call(&app, Method::PUT, "/api/plugins/osd/osds/1/", Some(json!({"status": "down"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(errors["name"].is_array());

        let (status, osd) = call(&app, Method::PATCH, "/api/plugins/osd/osds/1/", Some(json!({"status": "down"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(osd["status"]["value"], "down");
        assert_eq!(osd["name"], "osd.0");
    }

    #[tokio::test]
    async fn notes_couple_resolved_and_resolved_at() {
        let app = router(state());
        call(&app, Method::POST, "/api/plugins/osd/osds/", Some(json!({"device": 1, "name": "osd.0"}))).await;
        let (status, note) = call(
            &app,
            Method::POST,
            "/api/plugins/osd/notes/",
            Some(json!({"osd": 1, "status": "down", "reason": "SMART errors", "resolved": true})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(note["resolved_at"].is_string());

        let (_, note) = call(&app, Method::PATCH, "/api/plugins/osd/notes/1/", Some(json!({"resolved": false}))).await;
        assert!(note["resolved_at"].is_null());

        let (_, osd) = call(&app, Method::GET, "/api/plugins/osd/osds/1/", None).await;
        assert_eq!(osd["open_notes"], 1);
    }

    #[tokio::test]
    async fn deleting_a_device_cascades() {
        let app = router(state());
        call(&app, Method::POST, "/api/plugins/osd/osds/", Some(json!({"device": 1, "name": "osd.0"}))).await;
        call(
            &app,
            Method::POST,
            "/api/plugins/osd/notes/",
            Some(json!({"osd": 1, "status": "out", "reason": "failed"})),
        )
        .await;

        let (status, _) = call(&app, Method::DELETE, "/api/dcim/devices/1/", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, osds) = call(&app, Method::GET, "/api/plugins/osd/osds/", None).await;
        let (_, notes) = call(&app, Method::GET, "/api/plugins/osd/notes/", None).await;
        assert_eq!(osds["count"], 0);
        assert_eq!(notes["count"], 0);
        let (status, _) = call(&app, Method::GET, "/api/dcim/devices/1/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bulk_delete_and_missing_objects() {
        let app = router(state());
        for name in ["a", "b", "c"] {
            call(&app, Method::POST, "/api/plugins/osd/clusters/", Some(json!({"name": name}))).await;
        }
        let (status, _) = call(
            &app,
            Method::DELETE,
            "/api/plugins/osd/clusters/",
            Some(json!([{"id": 1}, {"id": 3}])),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, page) = call(&app, Method::GET, "/api/plugins/osd/clusters/", None).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["name"], "b");

        let (status, body) = call(&app, Method::GET, "/api/plugins/osd/clusters/9/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Ceph Cluster 9 not found");
    }

    #[tokio::test]
    async fn device_lookup_by_name() {
        let app = router(state());
        let (_, page) = call(&app, Method::GET, "/api/dcim/devices/?name=storage-03", None).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["id"], 3);
        assert_eq!(page["results"][0]["site"]["slug"], "dc2");

        let (_, page) = call(&app, Method::GET, "/api/dcim/devices/?name=nowhere", None).await;
        assert_eq!(page["count"], 0);
    }
}
