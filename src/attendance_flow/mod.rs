//! Attendance flow
//!
//! Glue between the scan session and the backend: consumes session
//! events, turns decode successes into check-in submissions, owns the
//! operator-selected direction, and feeds the realtime hub.
//!
//! A failed submission never restarts scanning; the outcome is surfaced
//! and the operator decides when to scan again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, RwLock};

use crate::camera_probe::CameraProber;
use crate::checkin_submitter::{AttendanceEvent, CheckinSubmitter, Direction};
use crate::error::{Error, Result};
use crate::realtime_hub::{
    CheckinFailedMessage, CheckinRecordedMessage, HubMessage, RealtimeHub, ScannerStateMessage,
};
use crate::scan_session::{DecodeResult, ScanSession, ScanSessionState, SessionEvent};

/// Result of the most recent submission attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub accepted: bool,
    /// Payload of the code that triggered the attempt
    pub scanned: String,
    pub event: Option<AttendanceEvent>,
    pub error_code: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub struct AttendanceFlow {
    session: Arc<ScanSession>,
    prober: Arc<CameraProber>,
    submitter: Arc<CheckinSubmitter>,
    realtime_hub: Arc<RealtimeHub>,
    /// Direction the next scan will record
    direction: Arc<RwLock<Direction>>,
    /// Direction captured when the current session started
    armed_direction: Arc<RwLock<Direction>>,
    last_outcome: Arc<RwLock<Option<SubmitOutcome>>>,
    running: Arc<RwLock<bool>>,
}

impl AttendanceFlow {
    pub fn new(
        session: Arc<ScanSession>,
        prober: Arc<CameraProber>,
        submitter: Arc<CheckinSubmitter>,
        realtime_hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            session,
            prober,
            submitter,
            realtime_hub,
            direction: Arc::new(RwLock::new(Direction::default())),
            armed_direction: Arc::new(RwLock::new(Direction::default())),
            last_outcome: Arc::new(RwLock::new(None)),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the session event loop. Idempotent.
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Attendance flow already running");
                return;
            }
            *running = true;
        }

        let mut events = self.session.subscribe();
        let submitter = self.submitter.clone();
        let realtime_hub = self.realtime_hub.clone();
        let direction = self.direction.clone();
        let armed_direction = self.armed_direction.clone();
        let last_outcome = self.last_outcome.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            tracing::info!("Attendance flow started");
            loop {
                if !*running.read().await {
                    break;
                }
                match events.recv().await {
                    Ok(SessionEvent::StateChanged(state)) => {
                        let tipo = *direction.read().await;
                        realtime_hub
                            .broadcast(HubMessage::ScannerState(ScannerStateMessage::snapshot(
                                &state, tipo,
                            )))
                            .await;
                    }
                    Ok(SessionEvent::DecodeSuccess(result)) => {
                        let tipo = *armed_direction.read().await;
                        handle_decode(&submitter, &realtime_hub, &last_outcome, result, tipo).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Attendance flow lagged behind session events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::info!("Attendance flow stopped");
        });
    }

    /// Ask the event loop to wind down after the next event.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Start scanning. With no explicit device the prober picks one.
    pub async fn start_scan(&self, device_id: Option<String>) -> Result<String> {
        let device_id = match device_id {
            Some(id) => id,
            None => {
                let device = self.prober.select_device().await?;
                tracing::info!(
                    device_id = %device.device_id,
                    label = %device.label,
                    "Auto-selected camera device"
                );
                device.device_id
            }
        };

        // The in-flight session keeps the direction it was armed with
        {
            let tipo = *self.direction.read().await;
            *self.armed_direction.write().await = tipo;
        }

        self.session.start(&device_id).await?;
        Ok(device_id)
    }

    /// Stop scanning and wait for the camera to be released.
    pub async fn stop_scan(&self) {
        self.session.stop().await;
    }

    /// Change the direction the next scan records. Refused while a scan
    /// is underway so a decode cannot race the toggle.
    pub async fn set_direction(&self, tipo: Direction) -> Result<Direction> {
        let state = self.session.state().await;
        if matches!(
            state,
            ScanSessionState::Acquiring | ScanSessionState::Active | ScanSessionState::Stopping
        ) {
            return Err(Error::Conflict(format!(
                "direction is locked while a scan is underway (state: {state})"
            )));
        }

        *self.direction.write().await = tipo;
        tracing::info!(tipo = %tipo, "Check-in direction set");
        self.realtime_hub
            .broadcast(HubMessage::ScannerState(ScannerStateMessage::snapshot(
                &state, tipo,
            )))
            .await;
        Ok(tipo)
    }

    pub async fn direction(&self) -> Direction {
        *self.direction.read().await
    }

    pub async fn last_outcome(&self) -> Option<SubmitOutcome> {
        self.last_outcome.read().await.clone()
    }
}

/// Submit one captured scan and publish the outcome, whichever way it went.
async fn handle_decode(
    submitter: &CheckinSubmitter,
    realtime_hub: &RealtimeHub,
    last_outcome: &RwLock<Option<SubmitOutcome>>,
    result: DecodeResult,
    tipo: Direction,
) {
    match submitter.submit_scan(&result, tipo).await {
        Ok(event) => {
            let outcome = SubmitOutcome {
                accepted: true,
                scanned: result.text.clone(),
                event: Some(event.clone()),
                error_code: None,
                message: "check-in recorded".to_string(),
                at: Utc::now(),
            };
            *last_outcome.write().await = Some(outcome);
            realtime_hub
                .broadcast(HubMessage::CheckinRecorded(CheckinRecordedMessage {
                    colaborador_id: event.colaborador_id.clone(),
                    tipo: event.tipo,
                    hora_registro: event.hora_registro.to_rfc3339(),
                    scanned: result.text,
                }))
                .await;
        }
        Err(e) => {
            let message = format!("scan read successfully but the record was not saved: {e}");
            tracing::error!(scanned = %result.text, error = %e, "Check-in submission failed");
            let outcome = SubmitOutcome {
                accepted: false,
                scanned: result.text.clone(),
                event: None,
                error_code: Some(e.error_code().to_string()),
                message: message.clone(),
                at: Utc::now(),
            };
            *last_outcome.write().await = Some(outcome);
            realtime_hub
                .broadcast(HubMessage::CheckinFailed(CheckinFailedMessage {
                    scanned: result.text,
                    error_code: e.error_code().to_string(),
                    message,
                    at: Utc::now().to_rfc3339(),
                }))
                .await;
        }
    }
}
