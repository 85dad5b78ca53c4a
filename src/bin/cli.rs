//! CLI client for the coordinator HTTP API

use anyhow::{bail, Context};
use chunkvault::catalog::FileRecord;
use chunkvault::common::{encode_name, format_bytes};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chunkvault")]
#[command(about = "chunkvault chunked file storage CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5002")]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Upload {
        /// Local file to upload
        path: PathBuf,

        /// Name to store it under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Download a file
    Download {
        name: String,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },

    /// Delete a file
    Delete { name: String },

    /// Health of every storage node
    Health,

    /// List stored files
    Ls,

    /// Collect orphaned chunks
    Gc {
        /// Report only
        #[arg(long)]
        dry_run: bool,

        /// Grace period in seconds
        #[arg(long)]
        grace_secs: Option<u64>,
    },

    /// Check catalog consistency
    Verify,
}

/// Turn an error response into a readable failure.
async fn check(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    bail!("{}: {}", status, message)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = Client::new();
    let base = cli.coordinator.trim_end_matches('/');

    match cli.command {
        Commands::Upload {
            path,
            name,
            chunk_size,
        } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("cannot derive a file name, pass --name")?,
            };
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;

            let mut query = vec![("file_name", name.clone())];
            if let Some(chunk_size) = chunk_size {
                query.push(("chunk_size", chunk_size.to_string()));
            }
            let response = client
                .post(format!("{}/upload", base))
                .query(&query)
                .body(data)
                .send()
                .await?;
            let body: Value = check(response).await?.json().await?;
            println!(
                "Uploaded {} ({}, {} chunks)",
                name,
                format_bytes(body["size"].as_u64().unwrap_or(0)),
                body["chunks"]
            );
        }

        Commands::Download { name, output } => {
            let response = client
                .get(format!("{}/download/{}", base, encode_name(&name)))
                .send()
                .await?;
            let data = check(response).await?.bytes().await?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Downloaded {} to {} ({})",
                name,
                output.display(),
                format_bytes(data.len() as u64)
            );
        }

        Commands::Delete { name } => {
            let response = client
                .delete(format!("{}/delete/{}", base, encode_name(&name)))
                .send()
                .await?;
            let body: Value = check(response).await?.json().await?;
            println!("{}", body["message"].as_str().unwrap_or("deleted"));
            if let Some(failed) = body["failed_chunks"].as_array() {
                for chunk in failed {
                    println!("  failed chunk: {}", chunk.as_str().unwrap_or_default());
                }
            }
        }

        Commands::Health => {
            let response = client.get(format!("{}/health_check", base)).send().await?;
            let reports: BTreeMap<String, Value> = check(response).await?.json().await?;
            for (node, report) in reports {
                match report["status"].as_str() {
                    Some("healthy") => println!(
                        "{}: healthy, up {:.0}s, {} free",
                        node,
                        report["uptime_seconds"].as_f64().unwrap_or(0.0),
                        format_bytes(report["free_space"].as_u64().unwrap_or(0))
                    ),
                    status => println!(
                        "{}: {} ({})",
                        node,
                        status.unwrap_or("unknown"),
                        report["message"].as_str().unwrap_or_default()
                    ),
                }
            }
        }

        Commands::Ls => {
            let response = client.get(format!("{}/files", base)).send().await?;
            let files: Vec<FileRecord> = check(response).await?.json().await?;
            for file in files {
                println!(
                    "{:>12}  {:>4} chunks  {}  {}",
                    format_bytes(file.size),
                    file.chunk_ids.len(),
                    file.upload_time.format("%Y-%m-%d %H:%M:%S"),
                    file.name
                );
            }
        }

        Commands::Gc {
            dry_run,
            grace_secs,
        } => {
            let mut query = vec![("dry_run", dry_run.to_string())];
            if let Some(grace) = grace_secs {
                query.push(("grace_secs", grace.to_string()));
            }
            let response = client
                .post(format!("{}/admin/gc", base))
                .query(&query)
                .send()
                .await?;
            let body: Value = check(response).await?.json().await?;
            let report = &body["report"];
            println!("Garbage collection report{}:", if dry_run { " (dry run)" } else { "" });
            println!(
                "  Unreferenced records: {}",
                report["unreferenced_records"].as_array().map_or(0, |a| a.len())
            );
            println!(
                "  Node orphans: {}",
                report["node_orphans"].as_array().map_or(0, |a| a.len())
            );
            println!("  Chunks removed: {}", report["chunks_removed"]);
            println!(
                "  Bytes reclaimed: {}",
                format_bytes(report["bytes_reclaimed"].as_u64().unwrap_or(0))
            );
            println!("  Failures: {}", report["failures"]);
        }

        Commands::Verify => {
            let response = client
                .post(format!("{}/admin/verify", base))
                .send()
                .await?;
            let body: Value = check(response).await?.json().await?;
            let report = &body["report"];
            println!("Verification report: {}", body["status"].as_str().unwrap_or("?"));
            println!("  Files: {}", report["files_checked"]);
            println!("  Chunks: {}", report["chunks_checked"]);
            println!(
                "  Missing chunks: {}",
                report["missing_chunks"].as_array().map_or(0, |a| a.len())
            );
            println!(
                "  Unreferenced chunks: {}",
                report["unreferenced_chunks"].as_array().map_or(0, |a| a.len())
            );
            println!(
                "  Unknown replicas: {}",
                report["unknown_replicas"].as_array().map_or(0, |a| a.len())
            );
        }
    }

    Ok(())
}
