//! RealtimeHub - WebSocket distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Scanner state fan-out (one frame per session transition)
//! - Check-in results, recorded or failed, for the kiosk display
//!
//! Note: frames carry state only. The kiosk page renders from these
//! frames and never polls while a scan is underway.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::camera_probe::CameraDevice;
use crate::checkin_submitter::Direction;
use crate::scan_session::ScanSessionState;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    ScannerState(ScannerStateMessage),
    CheckinRecorded(CheckinRecordedMessage),
    /// The physical scan worked but the record did not save
    CheckinFailed(CheckinFailedMessage),
    DeviceList(DeviceListMessage),
}

/// Scanner state message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerStateMessage {
    pub state: String,
    pub reason: Option<String>,
    pub tipo: Direction,
    pub at: String,
}

impl ScannerStateMessage {
    pub fn snapshot(state: &ScanSessionState, tipo: Direction) -> Self {
        Self {
            state: state.as_str().to_string(),
            reason: state.failure_reason().map(|r| r.to_string()),
            tipo,
            at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Recorded check-in message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRecordedMessage {
    pub colaborador_id: String,
    pub tipo: Direction,
    pub hora_registro: String,
    /// Payload of the code that triggered the check-in
    pub scanned: String,
}

/// Failed check-in message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinFailedMessage {
    pub scanned: String,
    pub error_code: String,
    pub message: String,
    pub at: String,
}

/// Device list message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceListMessage {
    pub devices: Vec<CameraDevice>,
    pub at: String,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let conn = ClientConnection { id, tx };

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let msg_type = match &message {
            HubMessage::ScannerState(_) => "scanner_state",
            HubMessage::CheckinRecorded(_) => "checkin_recorded",
            HubMessage::CheckinFailed(_) => "checkin_failed",
            HubMessage::DeviceList(_) => "device_list",
        };
        tracing::debug!(message_type = %msg_type, "Broadcasting message to clients");

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
