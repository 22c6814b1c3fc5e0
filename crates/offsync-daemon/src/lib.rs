//! Library entry point for embedding the offline-sync replication
//! engine into a host process. The `offsyncd` binary only exposes
//! config validation — starting the engine for real requires a
//! CMS-provided [`ContentRepository`], which only the embedder can
//! supply.

mod bootstrap;
mod cleanup;
mod shutdown;

pub use bootstrap::{bootstrap, RunningDaemon};
pub use cleanup::CleanupRegistry;
pub use shutdown::Shutdown;

use std::net::SocketAddr;

use offsync_config::OffsyncConfig;
use offsync_http::{build_router, AppState};
use offsync_resolver::ContentRepository;
use offsync_store::Store;
use tracing::info;

/// Opens the store, wires every background worker for `config.mode`,
/// optionally serves the HTTP management surface, and blocks until
/// shutdown.
pub async fn run<C: ContentRepository + 'static>(
    config: OffsyncConfig,
    db_path: &std::path::Path,
    content: C,
) -> anyhow::Result<()> {
    let store = Store::open(db_path).await?;
    let daemon = bootstrap::bootstrap(config.clone(), store.clone(), content).await?;

    let http_task = if config.http.enabled {
        let addr: SocketAddr = config.http.bind_address.parse()?;
        let state = AppState {
            mode: config.mode,
            store: store.clone(),
            resolver: daemon.resolver.clone(),
            producer: Some(daemon.producer.clone()),
            connectivity: daemon.connectivity.clone(),
            peers: daemon.peers.clone(),
        };
        let router = build_router(state);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "http management surface listening");
        Some(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(error = %err, "http server exited");
            }
        }))
    } else {
        None
    };

    daemon.wait_for_shutdown().await;
    if let Some(task) = http_task {
        task.abort();
    }
    Ok(())
}
