//! Scan session lifecycle
//!
//! Owns the single camera binding. All starts and stops funnel through
//! one lifecycle lock, so the kiosk never holds two streams and a stop
//! that races an acquisition still releases the hardware.

mod dispatcher;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::scan_platform::{ScanPlatform, StreamLease};

/// Scan session lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ScanSessionState {
    Idle,
    Acquiring,
    Active,
    Stopping,
    Failed(String),
}

impl ScanSessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSessionState::Idle => "idle",
            ScanSessionState::Acquiring => "acquiring",
            ScanSessionState::Active => "active",
            ScanSessionState::Stopping => "stopping",
            ScanSessionState::Failed(_) => "failed",
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            ScanSessionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanSessionState::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One successfully decoded code
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Events other components consume from the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(ScanSessionState),
    DecodeSuccess(DecodeResult),
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct ScanSession {
    platform: Arc<dyn ScanPlatform>,
    state: Arc<RwLock<ScanSessionState>>,
    binding: Arc<Mutex<Option<Box<dyn StreamLease>>>>,
    /// Serializes every start/stop body, including dispatcher auto-stops
    lifecycle: Arc<Mutex<()>>,
    /// Bumped per acquisition; stale dispatchers check it before touching state
    generation: Arc<AtomicU64>,
    events: broadcast::Sender<SessionEvent>,
}

impl ScanSession {
    pub fn new(platform: Arc<dyn ScanPlatform>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            platform,
            state: Arc::new(RwLock::new(ScanSessionState::Idle)),
            binding: Arc::new(Mutex::new(None)),
            lifecycle: Arc::new(Mutex::new(())),
            generation: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ScanSessionState {
        self.state.read().await.clone()
    }

    /// Begin scanning on `device_id`.
    ///
    /// No-op while a session is already underway; legal again after
    /// Failed. Resolves once the platform has granted or denied the
    /// camera, never earlier.
    pub async fn start(&self, device_id: &str) -> Result<()> {
        {
            let state = self.state.read().await;
            if matches!(
                *state,
                ScanSessionState::Acquiring | ScanSessionState::Active
            ) {
                tracing::debug!(device_id = %device_id, state = %*state, "Start ignored, session already underway");
                return Ok(());
            }
        }

        if device_id.trim().is_empty() {
            return Err(Error::Validation("device id must not be empty".to_string()));
        }

        let _lifecycle = self.lifecycle.lock().await;

        // Re-check now that we hold the lifecycle lock
        {
            let state = self.state.read().await;
            if matches!(
                *state,
                ScanSessionState::Acquiring | ScanSessionState::Active
            ) {
                tracing::debug!(device_id = %device_id, "Start ignored, session already underway");
                return Ok(());
            }
        }

        let session_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        transition(&self.state, &self.events, ScanSessionState::Acquiring).await;
        tracing::info!(device_id = %device_id, "Acquiring camera stream");

        let opened = match self.platform.open_stream(device_id).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(device_id = %device_id, error = %e, "Camera acquisition failed");
                transition(
                    &self.state,
                    &self.events,
                    ScanSessionState::Failed(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        {
            let mut binding = self.binding.lock().await;
            *binding = Some(opened.lease);
        }
        transition(&self.state, &self.events, ScanSessionState::Active).await;
        tracing::info!(device_id = %device_id, "Camera stream active, scanning");

        dispatcher::spawn(
            dispatcher::DispatcherContext {
                state: self.state.clone(),
                binding: self.binding.clone(),
                lifecycle: self.lifecycle.clone(),
                generation: self.generation.clone(),
                events: self.events.clone(),
                session_generation,
                device_id: device_id.to_string(),
            },
            opened.events,
        );

        Ok(())
    }

    /// Release the camera if held. Safe from any state; a stop that
    /// races an acquisition waits for it, then releases. Returns only
    /// after the hardware has actually let go.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let lease = { self.binding.lock().await.take() };
        let Some(lease) = lease else {
            tracing::debug!("Stop with no held stream, nothing to release");
            return;
        };

        let device_id = lease.device_id().to_string();
        transition(&self.state, &self.events, ScanSessionState::Stopping).await;
        if let Err(e) = lease.close().await {
            tracing::warn!(device_id = %device_id, error = %e, "Stream release reported an error");
        }
        transition(&self.state, &self.events, ScanSessionState::Idle).await;
        tracing::info!(device_id = %device_id, "Camera stream released");
    }
}

async fn transition(
    state: &RwLock<ScanSessionState>,
    events: &broadcast::Sender<SessionEvent>,
    next: ScanSessionState,
) {
    let prev = {
        let mut state = state.write().await;
        std::mem::replace(&mut *state, next.clone())
    };
    tracing::debug!(from = %prev, to = %next, "Scan session state changed");
    let _ = events.send(SessionEvent::StateChanged(next));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_platform::{DecodeEvent, DiscoveredDevice, OpenedStream};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct ScriptedPlatform {
        deny: AtomicBool,
        open_delay: Option<Duration>,
        open_streams: Arc<AtomicUsize>,
        opened_total: AtomicUsize,
        feed_tx: StdMutex<Option<mpsc::UnboundedSender<DecodeEvent>>>,
    }

    impl ScriptedPlatform {
        fn feed(&self, event: DecodeEvent) -> bool {
            let guard = self.feed_tx.lock().unwrap();
            match guard.as_ref() {
                Some(tx) => tx.send(event).is_ok(),
                None => false,
            }
        }
    }

    #[async_trait]
    impl ScanPlatform for ScriptedPlatform {
        async fn enumerate_devices(&self) -> Result<Vec<DiscoveredDevice>> {
            Ok(vec![])
        }

        async fn open_stream(&self, device_id: &str) -> Result<OpenedStream> {
            if let Some(delay) = self.open_delay {
                tokio::time::sleep(delay).await;
            }
            if self.deny.load(Ordering::SeqCst) {
                return Err(Error::PermissionDenied("denied by platform".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.feed_tx.lock().unwrap() = Some(tx);
            self.opened_total.fetch_add(1, Ordering::SeqCst);
            self.open_streams.fetch_add(1, Ordering::SeqCst);
            Ok(OpenedStream {
                lease: Box::new(ScriptedLease {
                    device_id: device_id.to_string(),
                    open_streams: self.open_streams.clone(),
                }),
                events: rx,
            })
        }
    }

    struct ScriptedLease {
        device_id: String,
        open_streams: Arc<AtomicUsize>,
    }

    impl Drop for ScriptedLease {
        fn drop(&mut self) {
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StreamLease for ScriptedLease {
        fn device_id(&self) -> &str {
            &self.device_id
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    async fn wait_for<F>(session: &ScanSession, predicate: F)
    where
        F: Fn(&ScanSessionState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if predicate(&session.state().await) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session did not reach the expected state in time");
    }

    #[tokio::test]
    async fn start_then_stop_releases_the_stream() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());

        session.start("/dev/video0").await.unwrap();
        assert_eq!(session.state().await, ScanSessionState::Active);
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 1);

        session.stop().await;
        assert_eq!(session.state().await, ScanSessionState::Idle);
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_active() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());

        session.start("/dev/video0").await.unwrap();
        session.start("/dev/video0").await.unwrap();

        assert_eq!(platform.opened_total.load(Ordering::SeqCst), 1);
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 1);
        session.stop().await;
    }

    #[tokio::test]
    async fn concurrent_starts_open_one_stream() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());

        let (a, b) = tokio::join!(session.start("/dev/video0"), session.start("/dev/video0"));
        a.unwrap();
        b.unwrap();

        assert_eq!(platform.opened_total.load(Ordering::SeqCst), 1);
        session.stop().await;
    }

    #[tokio::test]
    async fn stop_without_a_session_is_a_noop() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform);

        session.stop().await;
        session.stop().await;

        assert_eq!(session.state().await, ScanSessionState::Idle);
    }

    #[tokio::test]
    async fn denied_acquisition_fails_the_session() {
        let platform = Arc::new(ScriptedPlatform::default());
        platform.deny.store(true, Ordering::SeqCst);
        let session = ScanSession::new(platform.clone());

        let result = session.start("/dev/video0").await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
        assert!(matches!(session.state().await, ScanSessionState::Failed(_)));
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restart_after_failure_is_allowed() {
        let platform = Arc::new(ScriptedPlatform::default());
        platform.deny.store(true, Ordering::SeqCst);
        let session = ScanSession::new(platform.clone());

        assert!(session.start("/dev/video0").await.is_err());

        platform.deny.store(false, Ordering::SeqCst);
        session.start("/dev/video0").await.unwrap();
        assert_eq!(session.state().await, ScanSessionState::Active);
        session.stop().await;
    }

    #[tokio::test]
    async fn empty_device_id_is_rejected() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());

        let result = session.start("  ").await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(session.state().await, ScanSessionState::Idle);
        assert_eq!(platform.opened_total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_decode_auto_stops_and_publishes_once() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());
        let mut events = session.subscribe();

        session.start("/dev/video0").await.unwrap();
        assert!(platform.feed(DecodeEvent::FrameMiss {
            diagnostic: "no code in frame".to_string(),
        }));
        assert!(platform.feed(DecodeEvent::Decoded {
            text: "EMP-42".to_string(),
        }));

        wait_for(&session, |s| *s == ScanSessionState::Idle).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 0);
        // The dispatcher is gone, nobody is listening to this stream anymore
        assert!(!platform.feed(DecodeEvent::Decoded {
            text: "LATE".to_string(),
        }));

        let mut successes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::DecodeSuccess(result) = event {
                successes.push(result.text);
            }
        }
        assert_eq!(successes, vec!["EMP-42".to_string()]);
    }

    #[tokio::test]
    async fn frame_misses_keep_the_session_active() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());

        session.start("/dev/video0").await.unwrap();
        for _ in 0..5 {
            assert!(platform.feed(DecodeEvent::FrameMiss {
                diagnostic: "no code in frame".to_string(),
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session.state().await, ScanSessionState::Active);
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 1);
        session.stop().await;
    }

    #[tokio::test]
    async fn stream_death_fails_the_session() {
        let platform = Arc::new(ScriptedPlatform::default());
        let session = ScanSession::new(platform.clone());

        session.start("/dev/video0").await.unwrap();
        assert!(platform.feed(DecodeEvent::Closed {
            reason: "decoder process exited".to_string(),
        }));

        wait_for(&session, |s| matches!(s, ScanSessionState::Failed(_))).await;
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 0);

        let state = session.state().await;
        let reason = state.failure_reason().unwrap_or_default();
        assert!(reason.contains("Decode stream error"));

        // A fresh start recovers from the failure
        session.start("/dev/video0").await.unwrap();
        assert_eq!(session.state().await, ScanSessionState::Active);
        session.stop().await;
    }

    #[tokio::test]
    async fn stop_while_acquiring_waits_then_releases() {
        let platform = Arc::new(ScriptedPlatform {
            open_delay: Some(Duration::from_millis(150)),
            ..Default::default()
        });
        let session = Arc::new(ScanSession::new(platform.clone()));

        let starter = {
            let session = session.clone();
            tokio::spawn(async move { session.start("/dev/video0").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(session.state().await, ScanSessionState::Acquiring);

        session.stop().await;

        assert_eq!(session.state().await, ScanSessionState::Idle);
        assert_eq!(platform.opened_total.load(Ordering::SeqCst), 1);
        assert_eq!(platform.open_streams.load(Ordering::SeqCst), 0);
        starter.await.unwrap().unwrap();
    }
}
