//! Shared data models

use serde::{Deserialize, Serialize};

use crate::attendance_flow::SubmitOutcome;
use crate::checkin_submitter::Direction;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ApiError) -> ApiResponse<T> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// API error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub backend_connected: bool,
    pub scanner_state: String,
}

/// Scanner status response
#[derive(Debug, Serialize, Deserialize)]
pub struct ScannerStatusResponse {
    pub state: String,
    pub reason: Option<String>,
    pub tipo: Direction,
    pub identity_set: bool,
    pub last_outcome: Option<SubmitOutcome>,
}

/// Stored identity response
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub colaborador_id: Option<String>,
}

/// Scan start request
#[derive(Debug, Default, Deserialize)]
pub struct StartScanRequest {
    /// Explicit capture device; omitted means probe and auto-select
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Scan start response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub device_id: String,
}

/// Direction change request
#[derive(Debug, Deserialize)]
pub struct SetDirectionRequest {
    pub tipo: Direction,
}

/// Identity update request
#[derive(Debug, Deserialize)]
pub struct SetIdentityRequest {
    pub colaborador_id: String,
}
