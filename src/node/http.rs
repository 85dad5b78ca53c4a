//! Storage node HTTP API

use super::store::ChunkStore;
use crate::common::{Error, Result};
use crate::coordinator::node_client::{NodeHealth, StoredChunk};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared state for node handlers
#[derive(Clone)]
pub struct NodeState {
    pub node_id: String,
    pub store: Arc<ChunkStore>,
    pub started: Instant,
}

#[derive(Debug, Deserialize)]
pub struct StoreParams {
    pub chunk_id: Option<String>,
}

/// Creates the storage node router. Bodies above `max_chunk_bytes` get 413.
pub fn create_router(state: NodeState, max_chunk_bytes: usize) -> Router {
    Router::new()
        .route("/store_chunk", post(store_chunk))
        .route("/get_chunk/:chunk_id", get(get_chunk))
        .route("/delete_chunk/:chunk_id", delete(delete_chunk))
        .route("/chunks", get(list_chunks))
        .route("/health_check", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_chunk_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn store_chunk(
    State(state): State<NodeState>,
    Query(params): Query<StoreParams>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let chunk_id = params
        .chunk_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::InvalidArgument("Missing chunk_id".into()))?;

    state.store.put(&chunk_id, &body).await?;
    tracing::info!(node = %state.node_id, chunk_id = %chunk_id, size = body.len(), "chunk stored");

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": format!("Chunk {} stored.", chunk_id),
        })),
    ))
}

async fn get_chunk(
    State(state): State<NodeState>,
    Path(chunk_id): Path<String>,
) -> Result<impl IntoResponse> {
    let data = state.store.get(&chunk_id).await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        data,
    ))
}

async fn delete_chunk(
    State(state): State<NodeState>,
    Path(chunk_id): Path<String>,
) -> Result<impl IntoResponse> {
    state.store.delete(&chunk_id).await?;
    tracing::info!(node = %state.node_id, chunk_id = %chunk_id, "chunk deleted");
    Ok(Json(json!({
        "status": "success",
        "message": format!("Chunk {} deleted.", chunk_id),
    })))
}

async fn list_chunks(State(state): State<NodeState>) -> Result<Json<Vec<StoredChunk>>> {
    Ok(Json(state.store.list().await?))
}

async fn health_check(State(state): State<NodeState>) -> Json<NodeHealth> {
    Json(NodeHealth {
        status: "healthy".to_string(),
        uptime_seconds: state.started.elapsed().as_secs_f64(),
        free_space: state.store.free_space(),
        chunk_count: state.store.chunk_count(),
    })
}
