//! HTTP/WebSocket transport layer
//!
//! Exposes the raw binary packet protocol and the per-codec compressed
//! streams over axum:
//!
//! | Path             | Transport | Payload                           |
//! |------------------|-----------|-----------------------------------|
//! | `/audio`         | WebSocket | raw binary packets (receive-only) |
//! | `/stream/{codec}`| WebSocket | compressed codec bytes            |
//! | `/sse/{codec}`   | SSE       | base64 chunks, one per encoder write |
//! | `/status`        | JSON      | server state snapshot             |

pub mod handlers;
pub mod sse;
pub mod ws;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::broadcast::{CodecRegistry, RawBroadcaster};
use crate::capture::supervisor::SharedSupervisorState;
use crate::config::{AudioConfig, ServerConfig};

/// Shared state passed to all request handlers
pub struct AppState {
    pub raw: Arc<RawBroadcaster>,
    pub registry: Arc<CodecRegistry>,
    pub supervisor_state: SharedSupervisorState,
    pub audio: AudioConfig,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/audio", get(ws::raw_stream))
        .route("/stream/:codec", get(ws::codec_stream))
        .route("/sse/:codec", get(sse::codec_events))
        .route("/status", get(handlers::get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
