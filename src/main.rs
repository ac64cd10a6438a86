//! 실시간 채팅방 소켓 서버

mod config;
mod error;
mod handlers;
mod protocol;
mod room;
mod routes;
mod session;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Context;
use config::Config;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use store::{ChatStore, HttpStore, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn ChatStore> = match &config.persistence.url {
        Some(url) => {
            let timeout = Duration::from_secs(config.persistence.request_timeout_secs);
            Arc::new(HttpStore::new(url, timeout).context("failed to build persistence client")?)
        }
        None => {
            tracing::warn!("PERSISTENCE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(AppState::new(&config, store));
    state
        .rooms
        .load_all()
        .await
        .context("failed to load rooms from persistence")?;

    let app = routes::router(state.clone(), &config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Chatroom socket server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws-api/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.rooms.shutdown_all().await;
    let disconnected = state.connections.disconnect_all();
    tracing::info!(connections = disconnected, "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
