// HTTP 接口：直播控制、查询与流媒体回调

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flux_gb28181_live::{LiveError, LiveSessionOrchestrator, OnPublishNotification};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LiveSessionOrchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct StartLiveRequest {
    pub device_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub rtp_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct StopLiveRequest {
    pub device_id: String,
    pub channel_id: String,
}

/// 业务错误响应
pub struct ApiError(LiveError);

impl From<LiveError> for ApiError {
    fn from(err: LiveError) -> Self {
        Self(err)
    }
}

fn status_of(err: &LiveError) -> StatusCode {
    match err {
        LiveError::InvalidParams(_) => StatusCode::BAD_REQUEST,
        LiveError::DeviceNotFound(_)
        | LiveError::ChannelNotFound(_)
        | LiveError::ChannelConfigNotFound(_)
        | LiveError::StreamNotActive(_) => StatusCode::NOT_FOUND,
        LiveError::ChannelNotActivated(_) => StatusCode::CONFLICT,
        LiveError::MediaServerInstanceMissing(_)
        | LiveError::SupervisorNotRunning(_)
        | LiveError::MediaServerNotRunning(_) => StatusCode::SERVICE_UNAVAILABLE,
        LiveError::RtpPortAllocationFailed(_) | LiveError::SipSignalingFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        LiveError::ConfirmationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        LiveError::ProtocolInconsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": self.0.code(),
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status_of(&self.0), Json(body)).into_response()
    }
}

type ApiResult = std::result::Result<Json<serde_json::Value>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/index/hook/on_publish", post(on_publish))
        .route("/api/v1/gb28181/live/start", post(start_live))
        .route("/api/v1/gb28181/live/stop", post(stop_live))
        .route(
            "/api/v1/gb28181/live/:device_id/:channel_id",
            get(get_stream_info),
        )
        .route(
            "/api/v1/gb28181/live/:device_id/:channel_id/is-live",
            get(is_live),
        )
        .route("/api/v1/gb28181/sessions", get(list_sessions))
        .route("/api/v1/gb28181/devices", get(list_devices))
        .route("/api/v1/gb28181/devices/:device_id", get(get_device))
        .route(
            "/api/v1/gb28181/devices/:device_id/channels/:channel_id",
            get(get_channel),
        )
        .with_state(state)
}

/// 流媒体 on_publish 回调，始终允许推流
async fn on_publish(
    State(state): State<AppState>,
    Json(payload): Json<OnPublishNotification>,
) -> Json<serde_json::Value> {
    let stream = payload.stream.clone();
    let matched = state.orchestrator.bridge().on_publish(payload);

    tracing::debug!(
        target: "gb28181::hook",
        stream = %stream,
        matched,
        "on_publish received"
    );

    Json(serde_json::json!({ "code": 0, "msg": "success" }))
}

async fn start_live(State(state): State<AppState>, Json(req): Json<StartLiveRequest>) -> ApiResult {
    let info = state
        .orchestrator
        .start(&req.device_id, &req.channel_id, req.rtp_port)
        .await?;

    Ok(Json(serde_json::json!({ "stream_info": info })))
}

async fn stop_live(State(state): State<AppState>, Json(req): Json<StopLiveRequest>) -> ApiResult {
    state
        .orchestrator
        .stop(&req.device_id, &req.channel_id)
        .await?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn get_stream_info(
    State(state): State<AppState>,
    Path((device_id, channel_id)): Path<(String, String)>,
) -> ApiResult {
    let info = state
        .orchestrator
        .get_stream_info(&device_id, &channel_id)
        .await?;

    Ok(Json(serde_json::json!({ "stream_info": info })))
}

async fn is_live(
    State(state): State<AppState>,
    Path((device_id, channel_id)): Path<(String, String)>,
) -> ApiResult {
    let live = state.orchestrator.is_live(&device_id, &channel_id).await?;

    Ok(Json(serde_json::json!({
        "device_id": device_id,
        "channel_id": channel_id,
        "live": live,
    })))
}

async fn list_sessions(State(state): State<AppState>) -> ApiResult {
    let sessions = state.orchestrator.list_active_sessions().await;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

async fn list_devices(State(state): State<AppState>) -> ApiResult {
    let devices = state.orchestrator.list_devices().await;

    let mut items = Vec::with_capacity(devices.len());
    for d in devices {
        items.push(d.snapshot().await);
    }

    Ok(Json(serde_json::json!({ "devices": items })))
}

async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult {
    let device = state.orchestrator.get_device(&device_id).await?;
    Ok(Json(serde_json::json!({ "device": device.snapshot().await })))
}

async fn get_channel(
    State(state): State<AppState>,
    Path((device_id, channel_id)): Path<(String, String)>,
) -> ApiResult {
    let channel = state
        .orchestrator
        .get_channel(&device_id, &channel_id)
        .await?;

    Ok(Json(serde_json::json!({ "channel": channel.snapshot().await })))
}
