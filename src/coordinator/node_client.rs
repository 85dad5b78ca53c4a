//! Storage node interface and its HTTP binding

use crate::common::{encode_name, Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Liveness and capacity reported by a storage node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub status: String,
    pub uptime_seconds: f64,
    /// Free bytes
    pub free_space: u64,
    #[serde(default)]
    pub chunk_count: u64,
}

/// A chunk resident on a node, as listed for reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// Operations the coordinator needs from a storage node.
///
/// `fetch_chunk`/`delete_chunk` return `Error::NotFound` for unknown ids.
/// Transport failures and timeouts are `Error::NodeUnreachable`.
#[async_trait::async_trait]
pub trait StorageNode: Send + Sync {
    fn id(&self) -> &str;

    /// Address recorded in the catalog
    fn address(&self) -> &str;

    async fn store_chunk(&self, chunk_id: &str, data: Bytes) -> Result<()>;

    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Bytes>;

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()>;

    async fn node_health(&self) -> Result<NodeHealth>;

    async fn list_chunks(&self) -> Result<Vec<StoredChunk>>;
}

/// Storage node reached over HTTP
pub struct HttpStorageNode {
    id: String,
    base_url: String,
    client: Client,
}

impl HttpStorageNode {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(&self, e: reqwest::Error) -> Error {
        Error::NodeUnreachable {
            node: self.id.clone(),
            reason: e.to_string(),
        }
    }

    async fn failure(&self, response: reqwest::Response, chunk_id: &str) -> Error {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Error::NotFound(format!("Chunk {} on {}", chunk_id, self.id));
        }
        let body = response.text().await.unwrap_or_default();
        Error::NodeError {
            node: self.id.clone(),
            reason: format!("{}: {}", status, body),
        }
    }
}

#[async_trait::async_trait]
impl StorageNode for HttpStorageNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> &str {
        &self.base_url
    }

    async fn store_chunk(&self, chunk_id: &str, data: Bytes) -> Result<()> {
        let response = self
            .client
            .post(self.url("/store_chunk"))
            .query(&[("chunk_id", chunk_id)])
            .body(data)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.failure(response, chunk_id).await)
        }
    }

    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.url(&format!("/get_chunk/{}", encode_name(chunk_id))))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if !response.status().is_success() {
            return Err(self.failure(response, chunk_id).await);
        }
        response.bytes().await.map_err(|e| self.unreachable(e))
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/delete_chunk/{}", encode_name(chunk_id))))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.failure(response, chunk_id).await)
        }
    }

    async fn node_health(&self) -> Result<NodeHealth> {
        let response = self
            .client
            .get(self.url("/health_check"))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if !response.status().is_success() {
            return Err(Error::NodeError {
                node: self.id.clone(),
                reason: format!("health check returned {}", response.status()),
            });
        }
        response.json().await.map_err(|e| Error::NodeError {
            node: self.id.clone(),
            reason: format!("invalid health report: {}", e),
        })
    }

    async fn list_chunks(&self) -> Result<Vec<StoredChunk>> {
        let response = self
            .client
            .get(self.url("/chunks"))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if !response.status().is_success() {
            return Err(Error::NodeError {
                node: self.id.clone(),
                reason: format!("chunk listing returned {}", response.status()),
            });
        }
        response.json().await.map_err(|e| Error::NodeError {
            node: self.id.clone(),
            reason: format!("invalid chunk listing: {}", e),
        })
    }
}
