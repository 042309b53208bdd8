//! Application state for the check-in kiosk

use crate::attendance_flow::AttendanceFlow;
use crate::camera_probe::CameraProber;
use crate::checkin_submitter::CheckinSubmitter;
use crate::identity::StoredIdentity;
use crate::realtime_hub::RealtimeHub;
use crate::scan_session::ScanSession;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the HR portal backend that owns attendance records
    pub backend_url: String,
    /// colaboradorID this kiosk records check-ins for, if paired at boot
    pub colaborador_id: Option<String>,
    /// Directory the kiosk page is served from
    pub static_dir: String,
    /// zbarcam binary used to decode QR frames
    pub zbarcam_path: String,
    /// sysfs directory enumerated for V4L2 capture devices
    pub video_sys_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            colaborador_id: std::env::var("COLABORADOR_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
            zbarcam_path: std::env::var("ZBARCAM_PATH").unwrap_or_else(|_| "zbarcam".to_string()),
            video_sys_dir: std::env::var("VIDEO_SYS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/sys/class/video4linux")),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub started_at: Instant,
    pub prober: Arc<CameraProber>,
    pub session: Arc<ScanSession>,
    pub submitter: Arc<CheckinSubmitter>,
    pub identity: Arc<StoredIdentity>,
    pub flow: Arc<AttendanceFlow>,
    pub realtime_hub: Arc<RealtimeHub>,
}
