//! HTTP API handlers

use axum::{extract::State, Json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::capture::supervisor::SupervisorState;
use crate::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Server state snapshot
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub capture: SupervisorState,
    pub sample_rate: u32,
    pub channels: u8,
    pub raw_clients: usize,
    pub codec_clients: HashMap<String, usize>,
}

/// `GET /status`
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let codec_clients = state
        .registry
        .enabled_codecs()
        .into_iter()
        .map(|codec| (codec.to_string(), state.registry.client_count(codec)))
        .collect();

    let status = SystemStatus {
        capture: *state.supervisor_state.read(),
        sample_rate: state.audio.sample_rate,
        channels: state.audio.channels,
        raw_clients: state.raw.client_count(),
        codec_clients,
    };

    Json(ApiResponse::ok(status))
}
