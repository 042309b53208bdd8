//! Check-in submission client
//!
//! Writes attendance events to the HR portal backend. The backend is the
//! system of record: nothing is persisted or retried locally, a failed
//! write is reported and the operator scans again.

mod types;

pub use types::{Ack, AttendanceEvent, Direction, LastCheckin};

use chrono::Utc;
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identity::IdentityProvider;
use crate::scan_session::DecodeResult;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const PING_TIMEOUT_SECS: u64 = 5;

/// Envelope the backend wraps every response in. `ok` is numeric there.
#[derive(Debug, Deserialize)]
struct BackendEnvelope<T> {
    #[serde(default)]
    ok: u8,
    data: Option<T>,
    error: Option<String>,
}

pub struct CheckinSubmitter {
    http: Client,
    backend_url: String,
    identity: Arc<dyn IdentityProvider>,
}

impl CheckinSubmitter {
    pub fn new(backend_url: String, identity: Arc<dyn IdentityProvider>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    /// Build and submit the attendance event for a captured scan.
    ///
    /// Fails fast when the kiosk has no stored identity; no request
    /// leaves the device in that case.
    pub async fn submit_scan(
        &self,
        scan: &DecodeResult,
        tipo: Direction,
    ) -> Result<AttendanceEvent> {
        let Some(colaborador_id) = self.identity.current() else {
            return Err(Error::IdentityMissing(
                "no colaboradorID stored, pair the kiosk first".to_string(),
            ));
        };

        let event = AttendanceEvent {
            colaborador_id,
            tipo,
            hora_registro: Utc::now(),
        };
        tracing::debug!(
            scanned = %scan.text,
            scanned_at = %scan.timestamp,
            colaborador_id = %event.colaborador_id,
            "Building attendance event from scan"
        );
        self.submit(&event).await?;
        Ok(event)
    }

    /// POST one attendance event. Success means the backend answered
    /// 2xx with `ok: 1`; anything else is a submission error.
    pub async fn submit(&self, event: &AttendanceEvent) -> Result<Ack> {
        let url = format!("{}/presentismo", self.backend_url);
        let response = match self.http.post(&url).json(event).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Check-in request failed");
                return Err(Error::Submit(format!("request failed: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Backend rejected check-in");
            return Err(Error::Submit(format!(
                "backend returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let envelope: BackendEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| Error::Submit(format!("unreadable backend response: {e}")))?;
        if envelope.ok != 1 {
            let reason = envelope
                .error
                .unwrap_or_else(|| "no reason given".to_string());
            tracing::error!(reason = %reason, "Backend refused check-in");
            return Err(Error::Submit(format!("backend refused check-in: {reason}")));
        }

        tracing::info!(
            colaborador_id = %event.colaborador_id,
            tipo = %event.tipo,
            hora_registro = %event.hora_registro,
            "Attendance event recorded"
        );
        Ok(Ack {
            data: envelope.data,
        })
    }

    /// Most recent check-in for `colaborador_id`, if the backend has one.
    pub async fn last_checkin(&self, colaborador_id: &str) -> Result<Option<LastCheckin>> {
        let url = format!("{}/presentismo/{}/last", self.backend_url, colaborador_id);
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "backend returned HTTP {} for last check-in",
                response.status().as_u16()
            )));
        }

        let envelope: BackendEnvelope<LastCheckin> = response.json().await?;
        if envelope.ok != 1 {
            return Ok(None);
        }
        Ok(envelope.data)
    }

    /// Cheap reachability probe for health checks. Any HTTP answer
    /// counts, the backend root does not need to be a real endpoint.
    pub async fn ping(&self) -> bool {
        match self
            .http
            .get(&self.backend_url)
            .timeout(Duration::from_secs(PING_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Backend ping failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct FixedIdentity(Option<String>);

    impl IdentityProvider for FixedIdentity {
        fn current(&self) -> Option<String> {
            self.0.clone()
        }
    }

    #[derive(Clone)]
    struct FakeBackend {
        hits: Arc<AtomicUsize>,
        status: StatusCode,
        body: Arc<serde_json::Value>,
        last_body: Arc<Mutex<Option<serde_json::Value>>>,
    }

    async fn record(
        State(backend): State<FakeBackend>,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        backend.hits.fetch_add(1, Ordering::SeqCst);
        *backend.last_body.lock().await = Some(body);
        (backend.status, Json((*backend.body).clone()))
    }

    async fn last(State(backend): State<FakeBackend>) -> impl IntoResponse {
        (backend.status, Json((*backend.body).clone()))
    }

    async fn spawn_backend(status: StatusCode, body: serde_json::Value) -> (String, FakeBackend) {
        let backend = FakeBackend {
            hits: Arc::new(AtomicUsize::new(0)),
            status,
            body: Arc::new(body),
            last_body: Arc::new(Mutex::new(None)),
        };
        let app = Router::new()
            .route("/presentismo", post(record))
            .route("/presentismo/:id/last", get(last))
            .with_state(backend.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), backend)
    }

    fn submitter_for(url: String, identity: Option<&str>) -> CheckinSubmitter {
        CheckinSubmitter::new(url, Arc::new(FixedIdentity(identity.map(|s| s.to_string()))))
    }

    fn scan(text: &str) -> DecodeResult {
        DecodeResult {
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn submits_the_event_the_backend_expects() {
        let (url, backend) = spawn_backend(StatusCode::OK, json!({"ok": 1})).await;
        let submitter = submitter_for(url, Some("COL-7"));

        let event = submitter
            .submit_scan(&scan("EMP-42"), Direction::Salida)
            .await
            .unwrap();

        assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
        assert_eq!(event.colaborador_id, "COL-7");
        assert_eq!(event.tipo, Direction::Salida);

        let body = backend.last_body.lock().await.clone().unwrap();
        assert_eq!(body["colaboradorID"], "COL-7");
        assert_eq!(body["tipo"], "salida");
        let wire_ts = body["horaRegistro"].as_str().unwrap().to_string();
        assert!(DateTime::parse_from_rfc3339(&wire_ts).is_ok());
    }

    #[tokio::test]
    async fn missing_identity_fails_before_any_request() {
        let (url, backend) = spawn_backend(StatusCode::OK, json!({"ok": 1})).await;
        let submitter = submitter_for(url, None);

        let result = submitter
            .submit_scan(&scan("EMP-42"), Direction::Entrada)
            .await;

        assert!(matches!(result, Err(Error::IdentityMissing(_))));
        assert_eq!(backend.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_http_error_is_a_submit_error() {
        let (url, backend) = spawn_backend(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"ok": 0, "error": "boom"}),
        )
        .await;
        let submitter = submitter_for(url, Some("COL-7"));

        let result = submitter
            .submit_scan(&scan("EMP-42"), Direction::Entrada)
            .await;

        assert!(matches!(result, Err(Error::Submit(_))));
        assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_refusal_is_a_submit_error() {
        let (url, _backend) =
            spawn_backend(StatusCode::OK, json!({"ok": 0, "error": "jornada cerrada"})).await;
        let submitter = submitter_for(url, Some("COL-7"));

        let result = submitter
            .submit_scan(&scan("EMP-42"), Direction::Entrada)
            .await;

        match result {
            Err(Error::Submit(msg)) => assert!(msg.contains("jornada cerrada")),
            other => panic!("expected a submit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_submit_error() {
        let submitter = submitter_for("http://127.0.0.1:1".to_string(), Some("COL-7"));

        let result = submitter.submit_scan(&scan("X"), Direction::Entrada).await;

        assert!(matches!(result, Err(Error::Submit(_))));
    }

    #[tokio::test]
    async fn last_checkin_parses_the_envelope() {
        let (url, _backend) = spawn_backend(
            StatusCode::OK,
            json!({"ok": 1, "data": {"tipo": "entrada", "horaRegistro": "2025-03-14T08:02:11Z"}}),
        )
        .await;
        let submitter = submitter_for(url, Some("COL-7"));

        let last = submitter.last_checkin("COL-7").await.unwrap().unwrap();
        assert_eq!(last.tipo, Direction::Entrada);
    }

    #[tokio::test]
    async fn last_checkin_not_found_is_none() {
        let (url, _backend) = spawn_backend(StatusCode::NOT_FOUND, json!({})).await;
        let submitter = submitter_for(url, Some("COL-7"));

        assert!(submitter.last_checkin("COL-7").await.unwrap().is_none());
    }
}
