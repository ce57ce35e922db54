//! Server-Sent Events transport
//!
//! A one-way text transport for clients that cannot speak WebSocket:
//! each event carries one encoder output chunk, base64-encoded. The
//! same registry path as the WebSocket transport applies, so Opus
//! clients are primed with the cached container header first.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::broadcast::client::ClientHandle;
use crate::codec::Codec;
use crate::server::AppState;

/// `GET /sse/{codec}`: base64 codec chunks as server-sent events
pub async fn codec_events(
    Path(codec): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let codec = match codec.parse::<Codec>() {
        Ok(codec) if state.registry.is_enabled(codec) => codec,
        _ => {
            tracing::info!("Rejecting SSE request for codec {:?}", codec);
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let (client, rx) = ClientHandle::new();
    if !state.registry.set_codec(client, codec) {
        return StatusCode::NOT_FOUND.into_response();
    }

    // When the client goes away axum drops the stream, the receiver
    // closes, and the next broadcast reaps the registry entry.
    Sse::new(event_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn event_stream(
    rx: tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    UnboundedReceiverStream::new(rx).map(|chunk| Ok(Event::default().data(BASE64.encode(&chunk))))
}
