//! HTTP service exposing a catalog binding remotely
//!
//! Route names follow the metadata service API (`/add_file_metadata`,
//! `/get_chunk_metadata/:id`, ...). `RemoteCatalog` is the matching client.

use super::{Catalog, ChunkRecord, FileRecord, ServerRecord};
use crate::common::Result;
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFileRequest {
    pub file_name: String,
    pub chunk_ids: Vec<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddChunkRequest {
    pub chunk_id: String,
    pub replicas: Vec<String>,
    pub size: u64,
    #[serde(default)]
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddServerRequest {
    pub server_id: String,
    #[serde(default)]
    pub address: String,
    pub status: String,
    pub load: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateServerRequest {
    pub status: String,
    pub load: u64,
}

/// Shared state for catalog handlers
#[derive(Clone)]
pub struct CatalogState {
    pub catalog: Arc<dyn Catalog>,
}

/// Creates the catalog service router. `max_body_bytes` replaces axum's
/// default JSON limit.
pub fn create_router(catalog: Arc<dyn Catalog>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/add_file_metadata", post(add_file))
        .route("/add_chunk_metadata", post(add_chunk))
        .route("/add_server_metadata", post(add_server))
        .route("/update_server_metadata/:server_id", put(update_server))
        .route("/get_file_metadata/:file_name", get(get_file))
        .route("/get_chunk_metadata/:chunk_id", get(get_chunk))
        .route("/get_server_metadata/:server_id", get(get_server))
        .route("/delete_file_metadata/:file_name", delete(delete_file))
        .route("/delete_chunk_metadata/:chunk_id", delete(delete_chunk))
        .route("/delete_server_metadata/:server_id", delete(delete_server))
        .route("/files", get(list_files))
        .route("/chunks", get(list_chunks))
        .route("/servers", get(list_servers))
        .route("/perform_health_check", get(perform_health_check))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(CatalogState { catalog })
}

fn created(message: String) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({ "status": "success", "message": message })),
    )
}

fn ok(message: String) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "message": message })),
    )
}

async fn add_file(
    State(state): State<CatalogState>,
    Json(req): Json<AddFileRequest>,
) -> Result<impl IntoResponse> {
    state
        .catalog
        .put_file(&req.file_name, &req.chunk_ids, req.size)
        .await?;
    Ok(created(format!("File {} metadata added.", req.file_name)))
}

async fn add_chunk(
    State(state): State<CatalogState>,
    Json(req): Json<AddChunkRequest>,
) -> Result<impl IntoResponse> {
    state
        .catalog
        .put_chunk(&req.chunk_id, &req.replicas, req.size, &req.checksum)
        .await?;
    Ok(created(format!("Chunk {} metadata added.", req.chunk_id)))
}

async fn add_server(
    State(state): State<CatalogState>,
    Json(req): Json<AddServerRequest>,
) -> Result<impl IntoResponse> {
    state
        .catalog
        .put_server(&req.server_id, &req.address, &req.status, req.load)
        .await?;
    Ok(created(format!("Server {} metadata added.", req.server_id)))
}

async fn update_server(
    State(state): State<CatalogState>,
    Path(server_id): Path<String>,
    Json(req): Json<UpdateServerRequest>,
) -> Result<impl IntoResponse> {
    state
        .catalog
        .update_server(&server_id, &req.status, req.load)
        .await?;
    Ok(ok(format!("Server {} metadata updated.", server_id)))
}

async fn get_file(
    State(state): State<CatalogState>,
    Path(file_name): Path<String>,
) -> Result<Json<FileRecord>> {
    Ok(Json(state.catalog.get_file(&file_name).await?))
}

async fn get_chunk(
    State(state): State<CatalogState>,
    Path(chunk_id): Path<String>,
) -> Result<Json<ChunkRecord>> {
    Ok(Json(state.catalog.get_chunk(&chunk_id).await?))
}

async fn get_server(
    State(state): State<CatalogState>,
    Path(server_id): Path<String>,
) -> Result<Json<ServerRecord>> {
    Ok(Json(state.catalog.get_server(&server_id).await?))
}

async fn delete_file(
    State(state): State<CatalogState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse> {
    state.catalog.delete_file(&file_name).await?;
    Ok(ok(format!("File {} deleted.", file_name)))
}

async fn delete_chunk(
    State(state): State<CatalogState>,
    Path(chunk_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.catalog.delete_chunk(&chunk_id).await?;
    Ok(ok(format!("Chunk {} deleted.", chunk_id)))
}

async fn delete_server(
    State(state): State<CatalogState>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.catalog.delete_server(&server_id).await?;
    Ok(ok(format!("Server {} deleted.", server_id)))
}

async fn list_files(State(state): State<CatalogState>) -> Result<Json<Vec<FileRecord>>> {
    Ok(Json(state.catalog.list_files().await?))
}

async fn list_chunks(State(state): State<CatalogState>) -> Result<Json<Vec<ChunkRecord>>> {
    Ok(Json(state.catalog.list_chunks().await?))
}

async fn list_servers(State(state): State<CatalogState>) -> Result<Json<Vec<ServerRecord>>> {
    Ok(Json(state.catalog.list_servers().await?))
}

/// Reports the recorded status of every server. Probing nodes is the
/// coordinator's job; the catalog only knows what was last written.
async fn perform_health_check(
    State(state): State<CatalogState>,
) -> Result<Json<Vec<ServerRecord>>> {
    let servers = state.catalog.list_servers().await?;
    for server in &servers {
        tracing::info!(server = %server.server_id, status = %server.status, "recorded server status");
    }
    Ok(Json(servers))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
