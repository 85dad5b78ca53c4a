//! HTTP client binding for the standalone catalog service

use super::service::{AddChunkRequest, AddFileRequest, AddServerRequest, UpdateServerRequest};
use super::{Catalog, ChunkRecord, FileRecord, ServerRecord};
use crate::common::{encode_name, validate_file_name, Error, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Catalog reached over HTTP
#[derive(Clone)]
pub struct RemoteCatalog {
    client: Client,
    base_url: String,
}

impl RemoteCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response onto the catalog error taxonomy.
    async fn check(response: Response, what: String) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(what)),
            StatusCode::CONFLICT => Err(Error::AlreadyExists(what)),
            StatusCode::PAYLOAD_TOO_LARGE => Err(Error::PayloadTooLarge(format!(
                "catalog rejected {}: {}",
                what, message
            ))),
            _ => Err(Error::Http(format!(
                "catalog returned {} for {}: {}",
                status, what, message
            ))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: String) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response, what).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Http(format!("invalid catalog response: {}", e)))
    }

    async fn delete(&self, path: &str, what: String) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        match Self::check(response, what).await {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn post<B: serde::Serialize>(&self, path: &str, body: &B, what: String) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response, what).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("catalog request: {}", e))
    } else {
        Error::Http(format!("catalog request failed: {}", e))
    }
}

#[async_trait::async_trait]
impl Catalog for RemoteCatalog {
    async fn put_file(&self, name: &str, chunk_ids: &[String], size: u64) -> Result<()> {
        validate_file_name(name)?;
        let body = AddFileRequest {
            file_name: name.to_string(),
            chunk_ids: chunk_ids.to_vec(),
            size,
        };
        self.post("/add_file_metadata", &body, format!("File {}", name))
            .await
    }

    async fn put_chunk(
        &self,
        chunk_id: &str,
        replicas: &[String],
        size: u64,
        checksum: &str,
    ) -> Result<()> {
        let body = AddChunkRequest {
            chunk_id: chunk_id.to_string(),
            replicas: replicas.to_vec(),
            size,
            checksum: checksum.to_string(),
        };
        self.post("/add_chunk_metadata", &body, format!("Chunk {}", chunk_id))
            .await
    }

    async fn put_server(
        &self,
        server_id: &str,
        address: &str,
        status: &str,
        load: u64,
    ) -> Result<()> {
        let body = AddServerRequest {
            server_id: server_id.to_string(),
            address: address.to_string(),
            status: status.to_string(),
            load,
        };
        self.post("/add_server_metadata", &body, format!("Server {}", server_id))
            .await
    }

    async fn update_server(&self, server_id: &str, status: &str, load: u64) -> Result<()> {
        let body = UpdateServerRequest {
            status: status.to_string(),
            load,
        };
        let response = self
            .client
            .put(self.url(&format!(
                "/update_server_metadata/{}",
                encode_name(server_id)
            )))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response, format!("Server {}", server_id)).await?;
        Ok(())
    }

    async fn get_file(&self, name: &str) -> Result<FileRecord> {
        validate_file_name(name)?;
        self.get_json(
            &format!("/get_file_metadata/{}", encode_name(name)),
            format!("File {}", name),
        )
        .await
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<ChunkRecord> {
        self.get_json(
            &format!("/get_chunk_metadata/{}", encode_name(chunk_id)),
            format!("Chunk {}", chunk_id),
        )
        .await
    }

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord> {
        self.get_json(
            &format!("/get_server_metadata/{}", encode_name(server_id)),
            format!("Server {}", server_id),
        )
        .await
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        self.delete(
            &format!("/delete_file_metadata/{}", encode_name(name)),
            format!("File {}", name),
        )
        .await
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        self.delete(
            &format!("/delete_chunk_metadata/{}", encode_name(chunk_id)),
            format!("Chunk {}", chunk_id),
        )
        .await
    }

    async fn delete_server(&self, server_id: &str) -> Result<()> {
        self.delete(
            &format!("/delete_server_metadata/{}", encode_name(server_id)),
            format!("Server {}", server_id),
        )
        .await
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.get_json("/servers", "servers".to_string()).await
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        self.get_json("/files", "files".to_string()).await
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>> {
        self.get_json("/chunks", "chunks".to_string()).await
    }
}
