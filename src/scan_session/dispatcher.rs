//! Decode event dispatcher
//!
//! One task per acquisition. Routes frame misses to the log, fails the
//! session when the stream dies underneath it, and on the first decoded
//! code releases the camera before publishing exactly one success.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::{transition, DecodeResult, ScanSessionState, SessionEvent};
use crate::error::Error;
use crate::scan_platform::{DecodeEvent, StreamLease};

pub(super) struct DispatcherContext {
    pub state: Arc<RwLock<ScanSessionState>>,
    pub binding: Arc<Mutex<Option<Box<dyn StreamLease>>>>,
    pub lifecycle: Arc<Mutex<()>>,
    pub generation: Arc<AtomicU64>,
    pub events: broadcast::Sender<SessionEvent>,
    pub session_generation: u64,
    pub device_id: String,
}

pub(super) fn spawn(
    ctx: DispatcherContext,
    mut decode_events: mpsc::UnboundedReceiver<DecodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut misses: u64 = 0;

        let close_reason = loop {
            let Some(event) = decode_events.recv().await else {
                break "decode event channel closed".to_string();
            };
            match event {
                DecodeEvent::FrameMiss { diagnostic } => {
                    misses += 1;
                    tracing::debug!(
                        device_id = %ctx.device_id,
                        misses,
                        diagnostic = %diagnostic,
                        "Frame without a decodable code"
                    );
                }
                DecodeEvent::Decoded { text } => {
                    handle_success(&ctx, text, misses).await;
                    return;
                }
                DecodeEvent::Closed { reason } => break reason,
            }
        };

        handle_stream_end(&ctx, close_reason).await;
    })
}

/// First decode wins: release the camera, then publish the result once.
async fn handle_success(ctx: &DispatcherContext, text: String, misses: u64) {
    let result = DecodeResult {
        text,
        timestamp: Utc::now(),
    };

    let lifecycle = ctx.lifecycle.lock().await;
    if ctx.generation.load(Ordering::SeqCst) != ctx.session_generation {
        tracing::debug!(device_id = %ctx.device_id, "Late decode ignored, session superseded");
        return;
    }

    let lease = { ctx.binding.lock().await.take() };
    if let Some(lease) = lease {
        transition(&ctx.state, &ctx.events, ScanSessionState::Stopping).await;
        if let Err(e) = lease.close().await {
            tracing::warn!(device_id = %ctx.device_id, error = %e, "Stream release reported an error");
        }
        transition(&ctx.state, &ctx.events, ScanSessionState::Idle).await;
    }
    drop(lifecycle);

    tracing::info!(device_id = %ctx.device_id, misses, "Code decoded, session auto-stopped");
    let _ = ctx.events.send(SessionEvent::DecodeSuccess(result));
}

/// Stream ended without a decode: either our own release or a mid-scan death.
async fn handle_stream_end(ctx: &DispatcherContext, close_reason: String) {
    let _lifecycle = ctx.lifecycle.lock().await;
    if ctx.generation.load(Ordering::SeqCst) != ctx.session_generation {
        return;
    }

    let lease = { ctx.binding.lock().await.take() };
    let Some(lease) = lease else {
        // Binding already gone: a stop on this session killed the stream.
        return;
    };

    tracing::warn!(device_id = %ctx.device_id, reason = %close_reason, "Decode stream died mid-scan");
    if let Err(e) = lease.close().await {
        tracing::debug!(device_id = %ctx.device_id, error = %e, "Release after stream death failed");
    }
    transition(
        &ctx.state,
        &ctx.events,
        ScanSessionState::Failed(Error::DecodeStream(close_reason).to_string()),
    )
    .await;
}
