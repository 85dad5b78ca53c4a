//! Cluster tests over real sockets: storage nodes, a standalone catalog
//! service and a coordinator, all speaking HTTP.

use axum::Router;
use chunkvault::catalog::{self, Catalog, RemoteCatalog, RocksCatalog};
use chunkvault::coordinator::http::{create_router, CoordState};
use chunkvault::coordinator::node_client::{HttpStorageNode, StorageNode};
use chunkvault::coordinator::placement::RoundRobin;
use chunkvault::coordinator::{Coordinator, NodeRegistry, WorkflowSettings};
use chunkvault::node::http::NodeState;
use chunkvault::node::ChunkStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn spawn_node(id: &str, dir: &TempDir) -> SocketAddr {
    let store = ChunkStore::open(&dir.path().join(id), 64 << 20, 8 << 20)
        .await
        .unwrap();
    let state = NodeState {
        node_id: id.to_string(),
        store: Arc::new(store),
        started: Instant::now(),
    };
    spawn(chunkvault::node::http::create_router(state, 8 << 20)).await
}

fn settings() -> WorkflowSettings {
    WorkflowSettings {
        chunk_size: 1024,
        concurrency: 4,
        node_timeout: Duration::from_secs(5),
        health_timeout: Duration::from_secs(1),
    }
}

/// Coordinator over `nodes` HTTP storage nodes and the given catalog.
async fn spawn_coordinator(
    catalog: Arc<dyn Catalog>,
    nodes: usize,
    dir: &TempDir,
) -> (String, Arc<Coordinator>) {
    let coordinator = Arc::new(Coordinator::new(
        catalog,
        Arc::new(NodeRegistry::new()),
        Box::new(RoundRobin),
        settings(),
    ));
    for i in 1..=nodes {
        let id = format!("node-{}", i);
        let addr = spawn_node(&id, dir).await;
        let client =
            HttpStorageNode::new(&id, format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        coordinator.register_node(Arc::new(client)).await.unwrap();
    }

    let state = CoordState {
        coordinator: coordinator.clone(),
        gc_grace: Duration::from_secs(3600),
    };
    let addr = spawn(create_router(state, 16 << 20)).await;
    (format!("http://{}", addr), coordinator)
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[tokio::test]
async fn test_http_round_trip() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(RocksCatalog::open(dir.path().join("catalog")).unwrap());
    let (base, _) = spawn_coordinator(catalog, 3, &dir).await;
    let client = reqwest::Client::new();
    let data = payload(5000);

    let response = client
        .post(format!("{}/upload", base))
        .query(&[("file_name", "report.pdf")])
        .body(data.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["chunks"], 5);

    // Every node holds part of the file
    let nodes: Vec<Value> = client
        .get(format!("{}/nodes", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes.len(), 3);

    let downloaded = client
        .get(format!("{}/download/report.pdf", base))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());

    let duplicate = client
        .post(format!("{}/upload", base))
        .query(&[("file_name", "report.pdf")])
        .body(vec![1u8; 10])
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let response = client
        .delete(format!("{}/delete/report.pdf", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");

    let missing = client
        .get(format!("{}/download/report.pdf", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_http_health_check_reports_every_node() {
    let dir = TempDir::new().unwrap();
    let (base, coordinator) =
        spawn_coordinator(Arc::new(catalog::MemoryCatalog::new()), 2, &dir).await;

    // A node nobody is listening on
    let dead = HttpStorageNode::new("node-dead", "http://127.0.0.1:1", Duration::from_millis(500))
        .unwrap();
    coordinator.register_node(Arc::new(dead)).await.unwrap();

    let reports: BTreeMap<String, Value> = reqwest::get(format!("{}/health_check", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports["node-1"]["status"], "healthy");
    assert_eq!(reports["node-2"]["status"], "healthy");
    assert!(reports["node-1"]["free_space"].as_u64().is_some());
    assert_eq!(reports["node-dead"]["status"], "unreachable");
    assert!(reports["node-dead"]["message"].is_string());
}

#[tokio::test]
async fn test_coordinator_with_remote_catalog() {
    let dir = TempDir::new().unwrap();
    let backing: Arc<dyn Catalog> =
        Arc::new(RocksCatalog::open(dir.path().join("catalog")).unwrap());
    let catalog_addr = spawn(catalog::service::create_router(backing.clone(), 64 << 20)).await;
    let remote = RemoteCatalog::new(format!("http://{}", catalog_addr), Duration::from_secs(5))
        .unwrap();

    let (_, coordinator) = spawn_coordinator(Arc::new(remote), 2, &dir).await;
    let data = bytes::Bytes::from(payload(3000));
    coordinator
        .upload("remote.bin", data.clone(), None)
        .await
        .unwrap();

    // Records landed in the catalog service's store
    let file = backing.get_file("remote.bin").await.unwrap();
    assert_eq!(file.size, 3000);
    assert_eq!(file.chunk_ids.len(), 3);
    assert_eq!(backing.list_servers().await.unwrap().len(), 2);

    assert_eq!(coordinator.download("remote.bin").await.unwrap(), data);
}

#[tokio::test]
async fn test_node_restart_keeps_chunks() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_node("node-1", &dir).await;
    let client =
        HttpStorageNode::new("node-1", format!("http://{}", addr), Duration::from_secs(5)).unwrap();
    client
        .store_chunk("c1", bytes::Bytes::from_static(b"persisted"))
        .await
        .unwrap();

    // A second node process over the same directory sees the chunk
    let reopened = spawn_node("node-1", &dir).await;
    let client = HttpStorageNode::new("node-1", format!("http://{}", reopened), Duration::from_secs(5))
        .unwrap();
    assert_eq!(
        client.fetch_chunk("c1").await.unwrap(),
        bytes::Bytes::from_static(b"persisted")
    );
    assert_eq!(client.node_health().await.unwrap().chunk_count, 1);
}
