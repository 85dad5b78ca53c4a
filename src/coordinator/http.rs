//! Coordinator HTTP API

use crate::catalog::FileRecord;
use crate::common::{validate_id, Error, NodeEndpoint, Result};
use crate::coordinator::node_client::HttpStorageNode;
use crate::coordinator::registry::NodeView;
use crate::coordinator::workflow::{Coordinator, HealthReport};
use crate::ops;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared coordinator state for HTTP handlers.
#[derive(Clone)]
pub struct CoordState {
    pub coordinator: Arc<Coordinator>,
    /// Grace period for `/admin/gc`
    pub gc_grace: Duration,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub file_name: Option<String>,
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct GcParams {
    #[serde(default)]
    pub dry_run: bool,
    /// Overrides the configured grace period
    pub grace_secs: Option<u64>,
}

/// Creates the HTTP router with all public endpoints.
pub fn create_router(state: CoordState, max_upload_bytes: usize) -> Router {
    Router::new()
        // File workflows
        .route("/upload", post(upload))
        .route("/download/:file_name", get(download))
        .route("/delete/:file_name", delete(delete_file))
        .route("/health_check", get(health_check))
        // Catalog views
        .route("/files", get(list_files))
        .route("/files/:file_name", get(get_file))
        .route("/nodes", get(list_nodes).post(register_node))
        // Maintenance
        .route("/admin/gc", post(admin_gc))
        .route("/admin/verify", post(admin_verify))
        // Observability
        .route("/metrics", get(metrics))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload(
    State(state): State<CoordState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let file_name = params
        .file_name
        .ok_or_else(|| Error::InvalidArgument("Missing file_name".into()))?;

    let receipt = state
        .coordinator
        .upload(&file_name, body, params.chunk_size)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("File {} uploaded successfully.", file_name),
        "file_name": receipt.file_name,
        "size": receipt.size,
        "chunks": receipt.chunk_ids.len(),
    })))
}

async fn download(
    State(state): State<CoordState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse> {
    let data = state.coordinator.download(&file_name).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    ))
}

async fn delete_file(
    State(state): State<CoordState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse> {
    let report = state.coordinator.delete(&file_name).await?;
    Ok(Json(json!({
        "status": report.status,
        "message": report.message(),
        "failed_chunks": report.failed_chunks,
    })))
}

async fn health_check(State(state): State<CoordState>) -> Json<BTreeMap<String, HealthReport>> {
    Json(state.coordinator.health_check().await)
}

async fn list_files(State(state): State<CoordState>) -> Result<Json<Vec<FileRecord>>> {
    Ok(Json(state.coordinator.catalog().list_files().await?))
}

async fn get_file(
    State(state): State<CoordState>,
    Path(file_name): Path<String>,
) -> Result<Json<FileRecord>> {
    Ok(Json(state.coordinator.catalog().get_file(&file_name).await?))
}

async fn list_nodes(State(state): State<CoordState>) -> Result<Json<Vec<NodeView>>> {
    Ok(Json(state.coordinator.registry().snapshot()?))
}

async fn register_node(
    State(state): State<CoordState>,
    Json(endpoint): Json<NodeEndpoint>,
) -> Result<impl IntoResponse> {
    validate_id(&endpoint.id)?;
    let node = HttpStorageNode::new(
        &endpoint.id,
        &endpoint.url,
        state.coordinator.settings().node_timeout,
    )?;
    state.coordinator.register_node(Arc::new(node)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": format!("Node {} registered.", endpoint.id),
        })),
    ))
}

async fn admin_gc(
    State(state): State<CoordState>,
    Query(params): Query<GcParams>,
) -> Result<impl IntoResponse> {
    let grace = params
        .grace_secs
        .map(Duration::from_secs)
        .unwrap_or(state.gc_grace);
    let report = ops::collect_garbage(&state.coordinator, grace, params.dry_run).await?;
    Ok(Json(json!({ "status": "ok", "report": report })))
}

async fn admin_verify(State(state): State<CoordState>) -> Result<impl IntoResponse> {
    let report = ops::verify_catalog(state.coordinator.catalog().as_ref()).await?;
    Ok(Json(json!({
        "status": if report.is_clean() { "ok" } else { "inconsistent" },
        "report": report,
    })))
}

async fn metrics(State(state): State<CoordState>) -> impl IntoResponse {
    let mut out = state.coordinator.metrics().to_prometheus();
    if let Ok(nodes) = state.coordinator.registry().snapshot() {
        out.push_str("# HELP chunkvault_node_load Chunk count reported at last health check\n");
        out.push_str("# TYPE chunkvault_node_load gauge\n");
        for node in &nodes {
            out += &format!("chunkvault_node_load{{node=\"{}\"}} {}\n", node.id, node.load);
        }
        out.push_str("# HELP chunkvault_node_healthy Node considered healthy for placement\n");
        out.push_str("# TYPE chunkvault_node_healthy gauge\n");
        for node in &nodes {
            out += &format!(
                "chunkvault_node_healthy{{node=\"{}\"}} {}\n",
                node.id,
                u8::from(node.healthy)
            );
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        out,
    )
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

/// Ready once at least one storage node can take chunks
async fn health_ready(State(state): State<CoordState>) -> impl IntoResponse {
    let healthy = state
        .coordinator
        .registry()
        .healthy()
        .map(|n| n.len())
        .unwrap_or(0);
    let status = if healthy > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": healthy > 0,
            "healthy_nodes": healthy,
            "placement": state.coordinator.placement_name(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::coordinator::node_client::StorageNode;
    use crate::coordinator::placement::RoundRobin;
    use crate::coordinator::{NodeRegistry, WorkflowSettings};
    use crate::node::MemoryNode;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let node: Arc<dyn StorageNode> = Arc::new(MemoryNode::new("n1", 1 << 20));
        let coordinator = Coordinator::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(NodeRegistry::with_nodes([node]).unwrap()),
            Box::new(RoundRobin),
            WorkflowSettings {
                chunk_size: 8,
                ..Default::default()
            },
        );
        create_router(
            CoordState {
                coordinator: Arc::new(coordinator),
                gc_grace: Duration::from_secs(3600),
            },
            1 << 20,
        )
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_upload_download_delete() {
        let app = app();

        let req = Request::post("/upload?file_name=report.pdf&chunk_size=4")
            .body(Body::from("0123456789"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["chunks"], 3);

        let req = Request::get("/download/report.pdf").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"0123456789");

        let req = Request::delete("/delete/report.pdf").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "success");

        let req = Request::get("/download/report.pdf").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_upload_is_conflict() {
        let app = app();
        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let req = Request::post("/upload?file_name=a.bin")
                .body(Body::from("abc"))
                .unwrap();
            assert_eq!(app.clone().oneshot(req).await.unwrap().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_upload_requires_name() {
        let req = Request::post("/upload").body(Body::from("abc")).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["kind"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_health_check_and_metrics() {
        let app = app();

        let req = Request::get("/health_check").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
        assert_eq!(json["n1"]["status"], "healthy");

        let req = Request::get("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("chunkvault_health_checks_total 1"));
        assert!(text.contains("chunkvault_node_healthy{node=\"n1\"} 1"));
    }

    #[tokio::test]
    async fn test_admin_verify() {
        let req = Request::post("/admin/verify").body(Body::empty()).unwrap();
        let json = body_json(app().oneshot(req).await.unwrap()).await;
        assert_eq!(json["status"], "ok");
    }
}
