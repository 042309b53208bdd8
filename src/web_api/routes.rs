//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};

use crate::error::{Error, Result};
use crate::identity::IdentityProvider;
use crate::models::{
    ApiResponse, IdentityResponse, ScannerStatusResponse, SetDirectionRequest, SetIdentityRequest,
    StartScanRequest, StartScanResponse,
};
use crate::realtime_hub::{DeviceListMessage, HubMessage};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(scanner_status))
        // Devices
        .route("/api/devices", get(list_devices))
        // Scanner control
        .route("/api/scanner/start", post(start_scanner))
        .route("/api/scanner/stop", post(stop_scanner))
        .route("/api/direction", put(set_direction))
        // Kiosk identity
        .route("/api/identity", get(get_identity))
        .route("/api/identity", put(set_identity))
        // Backend reads
        .route("/api/checkins/last", get(last_checkin))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

/// Scanner status snapshot
/// GET /api/status
async fn scanner_status(State(state): State<AppState>) -> impl IntoResponse {
    let session_state = state.session.state().await;
    let response = ScannerStatusResponse {
        state: session_state.as_str().to_string(),
        reason: session_state.failure_reason().map(|r| r.to_string()),
        tipo: state.flow.direction().await,
        identity_set: state.identity.current().is_some(),
        last_outcome: state.flow.last_outcome().await,
    };
    Json(ApiResponse::success(response))
}

/// Enumerate capture devices with facing classification
/// GET /api/devices
async fn list_devices(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let devices = state.prober.list_cameras().await?;

    state
        .realtime_hub
        .broadcast(HubMessage::DeviceList(DeviceListMessage {
            devices: devices.clone(),
            at: chrono::Utc::now().to_rfc3339(),
        }))
        .await;

    Ok(Json(ApiResponse::success(devices)))
}

/// Begin a scan session
/// POST /api/scanner/start
async fn start_scanner(
    State(state): State<AppState>,
    body: Option<Json<StartScanRequest>>,
) -> Result<impl IntoResponse> {
    let Json(request) = body.unwrap_or_default();
    let device_id = state.flow.start_scan(request.device_id).await?;
    Ok(Json(ApiResponse::success(StartScanResponse { device_id })))
}

/// Stop scanning and release the camera
/// POST /api/scanner/stop
async fn stop_scanner(State(state): State<AppState>) -> impl IntoResponse {
    state.flow.stop_scan().await;
    let session_state = state.session.state().await;
    Json(ApiResponse::success(serde_json::json!({
        "state": session_state.as_str(),
    })))
}

/// Change the direction the next scan records
/// PUT /api/direction
async fn set_direction(
    State(state): State<AppState>,
    Json(request): Json<SetDirectionRequest>,
) -> Result<impl IntoResponse> {
    let tipo = state.flow.set_direction(request.tipo).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "tipo": tipo,
    }))))
}

/// Read the stored kiosk identity
/// GET /api/identity
async fn get_identity(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(IdentityResponse {
        colaborador_id: state.identity.current(),
    }))
}

/// Replace the stored kiosk identity (pairing)
/// PUT /api/identity
async fn set_identity(
    State(state): State<AppState>,
    Json(request): Json<SetIdentityRequest>,
) -> Result<impl IntoResponse> {
    let colaborador_id = request.colaborador_id.trim().to_string();
    if colaborador_id.is_empty() {
        return Err(Error::Validation(
            "colaborador_id must not be empty".to_string(),
        ));
    }

    state.identity.set(colaborador_id.clone());
    Ok(Json(ApiResponse::success(IdentityResponse {
        colaborador_id: Some(colaborador_id),
    })))
}

/// Most recent recorded check-in for this kiosk's collaborator
/// GET /api/checkins/last
async fn last_checkin(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let Some(colaborador_id) = state.identity.current() else {
        return Err(Error::IdentityMissing(
            "no colaboradorID stored, pair the kiosk first".to_string(),
        ));
    };

    let last = state.submitter.last_checkin(&colaborador_id).await?;
    Ok(Json(ApiResponse::success(last)))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut rx) = state.realtime_hub.register().await;

    // Forward hub frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Drain the client side; the kiosk page sends nothing but pings
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.realtime_hub.unregister(&conn_id).await;
}
