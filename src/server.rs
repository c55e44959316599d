use anyhow::{Context, Result};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::graphql::{self, RegistrySchema};
use crate::api::rest::{self, AppState};
use crate::api::views;
use crate::config::ServerConfig;
use crate::domain::registry_service::RegistryService;

/// REST API, UI views and GraphQL behind one router.
pub fn app(service: Arc<RegistryService>, config: Arc<ServerConfig>) -> Router {
    let state = AppState {
        service: service.clone(),
        config: config.clone(),
    };

    // GraphQL sub-router with its own state
    let schema = graphql::build_schema(service, config);
    let graphql_router = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .with_state(schema);

    // REST + UI views (AppState) + GraphQL (schema state)
    rest::router(state.clone())
        .merge(views::router(state))
        .merge(graphql_router)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: ServerConfig) -> Result<()> {
    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "osd-registry starting");

    // Snapshot if present, otherwise the host seed
    let service = RegistryService::load(&config).await?;
    if config.data_file.is_none() {
        warn!("no data_file configured, changes will be lost on shutdown");
    }

    let http_addr = config.http_addr.clone();
    let app = app(service, Arc::new(config));

    // Bind HTTP listener
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("osd-registry stopped");
    Ok(())
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(State(schema): State<RegistrySchema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        // Without a handler, wait on SIGTERM alone
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::rest::tests::call;
    use crate::domain::inventory::tests::seeded;

    fn test_app() -> Router {
        app(RegistryService::new(seeded(), None), Arc::new(ServerConfig::default()))
    }

    #[tokio::test]
    async fn serves_rest_views_and_graphql() {
        let app = test_app();

        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/plugins/osd/clusters/",
            Some(json!({"name": "prod-ceph-01", "site": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, Method::GET, "/plugins/osd/clusters/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, body) = call(
            &app,
            Method::POST,
            "/graphql",
            Some(json!({"query": "{ clusters { name } }"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["clusters"][0]["name"], "prod-ceph-01");
    }

    #[tokio::test]
    async fn graphql_playground_is_served() {
        let app = test_app();
        let response = tower::ServiceExt::oneshot(
            app,
            axum::http::Request::builder()
                .uri("/graphql")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
