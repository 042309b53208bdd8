//! Check-in Kiosk Daemon
//!
//! QR attendance scanner for the HR portal: one camera, one decode
//! stream, at most one attendance event per scan.
//!
//! ## Components
//!
//! 1. ScanPlatform - Device enumeration + zbarcam decode streams
//! 2. CameraProber - Facing classification and device selection
//! 3. ScanSession - Single-flight camera binding lifecycle
//! 4. CheckinSubmitter - Attendance writes to the HR backend
//! 5. StoredIdentity - Paired colaboradorID
//! 6. AttendanceFlow - Decode success → submission → broadcast
//! 7. RealtimeHub - WebSocket distribution to the kiosk page
//! 8. WebAPI - REST surface + WebSocket upgrade
//!
//! ## Design Principles
//!
//! - The HR backend is the system of record; nothing persists here
//! - The camera binding is owned by exactly one ScanSession
//! - First decode wins; the session auto-stops before submitting

pub mod attendance_flow;
pub mod camera_probe;
pub mod checkin_submitter;
pub mod error;
pub mod identity;
pub mod models;
pub mod realtime_hub;
pub mod scan_platform;
pub mod scan_session;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
