//! WebSocket transports
//!
//! Both WebSocket endpoints are one-way from the client's point of
//! view: the server pushes binary frames and only listens for close.
//! An unknown or disabled codec in the path is rejected before the
//! upgrade completes, so such clients never receive a byte.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::client::ClientHandle;
use crate::codec::Codec;
use crate::server::AppState;

/// `GET /audio`: the raw binary packet protocol
pub async fn raw_stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_raw_socket(socket, state))
}

async fn handle_raw_socket(socket: WebSocket, state: Arc<AppState>) {
    let (client, rx) = ClientHandle::new();
    let id = client.id();
    state.raw.add_client(client);

    drain_to_socket(socket, rx).await;

    // Reaching here means close, error, or a failed send; removal is
    // idempotent either way.
    state.raw.remove_client(id);
}

/// `GET /stream/{codec}`: compressed codec bytes
pub async fn codec_stream(
    ws: Option<WebSocketUpgrade>,
    Path(codec): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    // Terminate before the upgrade so rejected clients get no stream at
    // all, matching the disabled-codec contract.
    let codec = match codec.parse::<Codec>() {
        Ok(codec) if state.registry.is_enabled(codec) => codec,
        _ => {
            tracing::info!("Rejecting stream request for codec {:?}", codec);
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };
    ws.on_upgrade(move |socket| handle_codec_socket(socket, state, codec))
}

async fn handle_codec_socket(socket: WebSocket, state: Arc<AppState>, codec: Codec) {
    let (client, rx) = ClientHandle::new();
    let id = client.id();

    // A provider disappearing between the route check and here still
    // closes the connection cleanly: set_codec drops the handle.
    if !state.registry.set_codec(client, codec) {
        return;
    }

    drain_to_socket(socket, rx).await;
    state.registry.destroy_client(id);
}

/// Forward queued chunks to the socket until either side goes away.
async fn drain_to_socket(mut socket: WebSocket, mut rx: mpsc::UnboundedReceiver<bytes::Bytes>) {
    loop {
        tokio::select! {
            chunk = rx.recv() => {
                match chunk {
                    Some(chunk) => {
                        if socket.send(Message::Binary(chunk.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    // Sender side dropped: the registry destroyed us.
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Inbound data on this channel carries no meaning.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
