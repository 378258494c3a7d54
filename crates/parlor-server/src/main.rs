use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parlor_core::Hub;
use parlor_core::hub::HubConfig;
use parlor_gateway::connection;

/// Sessions quiet for this long are disconnected by the maintenance sweep.
const IDLE_TIMEOUT_MINUTES: i64 = 30;
/// Typing indicator sweep cadence.
const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(2);
/// Idle sessions, expired bans and stale invites sweep cadence.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let admin_secret =
        std::env::var("PARLOR_ADMIN_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLOR_DB_PATH").unwrap_or_else(|_| "parlor.db".into());
    let host = std::env::var("PARLOR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLOR_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database and reload the retained state
    let db = Arc::new(parlor_store::Database::open(&PathBuf::from(&db_path))?);
    let snapshot = db.load_snapshot()?;
    info!(
        messages = snapshot.messages.len(),
        dm_threads = snapshot.dms.len(),
        "loaded snapshot from {db_path}"
    );

    let hub = Hub::new(
        HubConfig {
            admin_secret,
            default_channel: "general".into(),
        },
        Some(db),
        snapshot,
    );

    // Periodic sweeps
    let typing_hub = hub.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TYPING_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            typing_hub.sweep_typing().await;
        }
    });
    let maintenance_hub = hub.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            maintenance_hub
                .sweep_idle(chrono::Duration::minutes(IDLE_TIMEOUT_MINUTES))
                .await;
        }
    });

    // Routes
    let app = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(hub.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parlor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush retained state before exit
    hub.flush().await?;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn ws_upgrade(State(hub): State<Hub>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub))
}
