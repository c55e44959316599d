//! JSON renditions of the registry's UI pages: object tables, detail pages
//! with their related tables, add/edit/delete, CSV import, bulk edit and
//! bulk delete, the change log, and the OSD panel of a device page.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::rest::{not_found, AppState, Clusters, Notes, Osds, Page, Pairs, Paging, Resource};
use crate::api::serializers::{ClusterPayload, NotePayload, OsdPayload, Serializer};
use crate::domain::csv_import;
use crate::domain::error::{ObjectKind, RegistryError, ValidationErrors, NON_FIELD_ERRORS};
use crate::domain::forms::OsdBulkEdit;
use crate::domain::inventory::{Inventory, UpdateMode};
use crate::domain::models::ObjectChange;
use crate::domain::tables::{self, ClusterNodeRow, ClusterRow, DevicePanel, NoteRow, OsdRow, Table};

/// A registry type with UI pages on top of its API resource.
pub trait View: Resource {
    const UI_PATH: &'static str;
    type Row: Serialize + Send;
    type Detail: Serialize + Send;

    fn display(inv: &Inventory, id: u64) -> Option<String>;
    fn table(inv: &Inventory, ids: &[u64]) -> Table<Self::Row>;
    fn detail(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<Self::Detail>;
    fn import(inv: &mut Inventory, csv: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError>;
}

#[derive(Debug, Serialize)]
pub struct ClusterDetail {
    pub object: ClusterPayload,
    pub nodes: Table<ClusterNodeRow>,
    pub osds: Table<OsdRow>,
}

#[derive(Debug, Serialize)]
pub struct OsdDetail {
    pub object: OsdPayload,
    pub notes: Table<NoteRow>,
}

#[derive(Debug, Serialize)]
pub struct NoteDetail {
    pub object: NotePayload,
}

impl View for Clusters {
    const UI_PATH: &'static str = "/plugins/osd/clusters";
    type Row = ClusterRow;
    type Detail = ClusterDetail;

    fn display(inv: &Inventory, id: u64) -> Option<String> {
        inv.cluster(id).map(|c| c.name.clone())
    }

    fn table(inv: &Inventory, ids: &[u64]) -> Table<ClusterRow> {
        tables::cluster_table(inv, ids.iter().filter_map(|&id| inv.cluster(id)))
    }

    fn detail(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<ClusterDetail> {
        let cluster = inv.cluster(id)?;
        let osds = inv.osds().into_iter().filter(|o| o.cluster == Some(id));
        Some(ClusterDetail {
            object: s.cluster(cluster),
            nodes: tables::cluster_node_table(inv, id),
            osds: tables::osd_table(inv, osds, true),
        })
    }

    fn import(inv: &mut Inventory, csv: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
        csv_import::import_clusters(inv, csv, now)
    }
}

impl View for Osds {
    const UI_PATH: &'static str = "/plugins/osd/osds";
    type Row = OsdRow;
    type Detail = OsdDetail;

    fn display(inv: &Inventory, id: u64) -> Option<String> {
        inv.osd(id).map(|o| inv.osd_display(o))
    }

    fn table(inv: &Inventory, ids: &[u64]) -> Table<OsdRow> {
        tables::osd_table(inv, ids.iter().filter_map(|&id| inv.osd(id)), true)
    }

    fn detail(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<OsdDetail> {
        let osd = inv.osd(id)?;
        Some(OsdDetail {
            object: s.osd(osd),
            notes: tables::note_table(inv, inv.osd_notes(id), false),
        })
    }

    fn import(inv: &mut Inventory, csv: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
        csv_import::import_osds(inv, csv, now)
    }
}

impl View for Notes {
    const UI_PATH: &'static str = "/plugins/osd/notes";
    type Row = NoteRow;
    type Detail = NoteDetail;

    fn display(inv: &Inventory, id: u64) -> Option<String> {
        inv.note(id).map(|n| inv.note_display(n))
    }

    fn table(inv: &Inventory, ids: &[u64]) -> Table<NoteRow> {
        tables::note_table(inv, ids.iter().filter_map(|&id| inv.note(id)), true)
    }

    fn detail(inv: &Inventory, s: &Serializer<'_>, id: u64) -> Option<NoteDetail> {
        inv.note(id).map(|n| NoteDetail { object: s.note(n) })
    }

    fn import(inv: &mut Inventory, csv: &str, now: DateTime<Utc>) -> Result<Vec<u64>, RegistryError> {
        csv_import::import_notes(inv, csv, now)
    }
}

pub fn router(state: AppState) -> Router {
    let router = Router::new()
        .route("/plugins/osd/osds/edit/", post(bulk_edit_osds))
        .route("/dcim/devices/{id}/ceph-osds/", get(device_panel));
    let router = entity_routes::<Clusters>(router);
    let router = entity_routes::<Osds>(router);
    let router = entity_routes::<Notes>(router);
    router.with_state(state)
}

fn entity_routes<V: View>(router: Router<AppState>) -> Router<AppState> {
    let base = V::UI_PATH;
    router
        .route(&format!("{base}/"), get(list::<V>))
        .route(&format!("{base}/add/"), post(add::<V>))
        .route(&format!("{base}/import/"), post(import::<V>))
        .route(&format!("{base}/delete/"), post(bulk_delete::<V>))
        .route(&format!("{base}/{{id}}/"), get(detail::<V>))
        .route(&format!("{base}/{{id}}/edit/"), post(edit::<V>))
        .route(&format!("{base}/{{id}}/delete/"), post(delete::<V>))
        .route(&format!("{base}/{{id}}/changelog/"), get(changelog::<V>))
}

fn ui_url(base: &str, path: &str, id: u64) -> String {
    format!("{}{}/{}/", base.trim_end_matches('/'), path, id)
}

#[derive(Debug, Serialize)]
pub struct ListView<R> {
    pub columns: &'static [&'static str],
    pub orderable: bool,
    #[serde(flatten)]
    pub page: Page<R>,
}

#[derive(Debug, Serialize)]
pub struct Saved {
    pub id: u64,
    pub display: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Imported {
    pub created: usize,
    pub ids: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct Selection {
    #[serde(default)]
    pk: Vec<u64>,
}

async fn list<V: View>(State(state): State<AppState>, Query(pairs): Pairs) -> ApiResult<Response> {
    let paging = Paging::parse(&pairs, &state.config)?;
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let ids = V::select(inv, &pairs)?;
            let table = V::table(inv, paging.window(&ids));
            let view = ListView {
                columns: table.columns,
                orderable: table.orderable,
                page: paging.page(base, V::UI_PATH, &pairs, ids.len(), table.rows),
            };
            Ok(Json(view).into_response())
        })
        .await
}

async fn detail<V: View>(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Response> {
    let base = state.base_url();
    state
        .service
        .read(|inv| -> ApiResult<Response> {
            let s = Serializer::new(inv, base);
            let detail = V::detail(inv, &s, id).ok_or(not_found(V::KIND, id))?;
            Ok(Json(detail).into_response())
        })
        .await
}

fn saved<V: View>(inv: &Inventory, base: &str, id: u64) -> Saved {
    Saved {
        id,
        display: V::display(inv, id).unwrap_or_default(),
        url: ui_url(base, V::UI_PATH, id),
    }
}

async fn add<V: View>(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Response> {
    let base = state.base_url();
    let saved = state
        .service
        .write(|inv, now| {
            let id = V::create(inv, body, now)?;
            Ok(saved::<V>(inv, base, id))
        })
        .await?;
    info!(kind = V::KIND.label(), id = saved.id, "added");
    Ok((StatusCode::CREATED, Json(saved)).into_response())
}

async fn edit<V: View>(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Saved>> {
    let base = state.base_url();
    let saved = state
        .service
        .write(|inv, now| {
            V::update(inv, id, body, UpdateMode::Full, now)?;
            Ok(saved::<V>(inv, base, id))
        })
        .await?;
    info!(kind = V::KIND.label(), id, "edited");
    Ok(Json(saved))
}

async fn delete<V: View>(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<Deleted>> {
    let display = state
        .service
        .write(|inv, now| {
            let display = V::display(inv, id).ok_or(not_found(V::KIND, id))?;
            V::delete(inv, id, now)?;
            Ok(display)
        })
        .await?;
    info!(kind = V::KIND.label(), id, "deleted");
    Ok(Json(Deleted { deleted: vec![display] }))
}

async fn bulk_delete<V: View>(State(state): State<AppState>, Json(selection): Json<Selection>) -> ApiResult<Json<Deleted>> {
    let deleted = state
        .service
        .write(|inv, now| {
            let names: Vec<String> = selection
                .pk
                .iter()
                .filter_map(|&id| V::display(inv, id))
                .collect();
            inv.bulk_delete(V::KIND, &selection.pk, now)?;
            Ok(names)
        })
        .await?;
    info!(kind = V::KIND.label(), count = deleted.len(), "bulk deleted");
    Ok(Json(Deleted { deleted }))
}

/// CSV body; every row is created or none is.
async fn import<V: View>(State(state): State<AppState>, body: String) -> ApiResult<Response> {
    // One write: any bad row rolls back the whole file
    let ids = state.service.write(|inv, now| V::import(inv, &body, now)).await?;
    info!(kind = V::KIND.label(), count = ids.len(), "imported");
    let imported = Imported {
        created: ids.len(),
        ids,
    };
    Ok((StatusCode::CREATED, Json(imported)).into_response())
}

async fn changelog<V: View>(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<Vec<ObjectChange>>> {
    state
        .service
        .read(|inv| -> ApiResult<Json<Vec<ObjectChange>>> {
            // Deleted objects have no changelog page
            V::display(inv, id).ok_or(not_found(V::KIND, id))?;
            Ok(Json(inv.changelog(V::KIND, id).into_iter().cloned().collect()))
        })
        .await
}

async fn bulk_edit_osds(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Table<OsdRow>>> {
    let edit: OsdBulkEdit = serde_json::from_value(body)
        .map_err(|e| ValidationErrors::single(NON_FIELD_ERRORS, format!("Invalid data: {e}")))?;
    let table = state
        .service
        .write(|inv, now| {
            let ids = inv.bulk_edit_osds(&edit, now)?;
            Ok(Osds::table(inv, &ids))
        })
        .await?;
    info!(count = table.rows.len(), "bulk edited OSDs");
    Ok(Json(table))
}

async fn device_panel(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<DevicePanel>> {
    state
        .service
        .read(|inv| -> ApiResult<Json<DevicePanel>> {
            let panel = DevicePanel::build(inv, id).ok_or(not_found(ObjectKind::Device, id))?;
            Ok(Json(panel))
        })
        .await
}
