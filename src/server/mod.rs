//! HTTP API server for an LSH index.

pub mod routes;

use crate::lsh::LshIndex;
use crate::metrics::MetricsCollector;
use crate::persistence::SnapshotManager;
use crate::store::MemoryStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Shared application state for the HTTP server.
pub struct AppState {
    pub index: RwLock<LshIndex<MemoryStore>>,
    pub metrics: RwLock<MetricsCollector>,
    /// Where to persist the index after it changes, if anywhere.
    pub snapshots: Option<SnapshotManager>,
}

impl AppState {
    pub fn new(index: LshIndex<MemoryStore>, snapshots: Option<SnapshotManager>) -> Self {
        Self {
            index: RwLock::new(index),
            metrics: RwLock::new(MetricsCollector::new()),
            snapshots,
        }
    }
}

/// Serve `index` over HTTP until the process is stopped.
pub async fn start(
    addr: &str,
    index: LshIndex<MemoryStore>,
    snapshots: Option<SnapshotManager>,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(index, snapshots));

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
