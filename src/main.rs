use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use locsync::{Config, QueueEvent, Store, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("locsync=info".parse()?),
        )
        .init();

    info!("Starting localization sync worker");

    let config = Config::from_env()?;
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = Store::new(&config.database_path)?;

    let (tx, rx) = mpsc::channel::<QueueEvent>(64);
    let worker = Worker::new(&config, store);
    let worker_handle = tokio::spawn(worker.run(rx));

    // Queue shim: one JSON event per stdin line. A real deployment points
    // this at the message broker instead.
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<QueueEvent>(&line) {
            Ok(event) => {
                tx.send(event).await.context("Worker queue closed")?;
            }
            Err(e) => warn!("Skipping malformed event: {e}"),
        }
    }

    drop(tx);
    worker_handle.await.context("Worker task panicked")?;

    info!("All events processed, shutting down");
    Ok(())
}
