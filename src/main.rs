//! Check-in Kiosk Daemon
//!
//! Main entry point for the attendance scanner.

use checkin_kiosk::{
    attendance_flow::AttendanceFlow,
    camera_probe::CameraProber,
    checkin_submitter::CheckinSubmitter,
    identity::{IdentityProvider, StoredIdentity},
    realtime_hub::RealtimeHub,
    scan_platform::{ScanPlatform, ZbarPlatform},
    scan_session::ScanSession,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_kiosk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::default();
    tracing::info!(
        backend_url = %config.backend_url,
        zbarcam = %config.zbarcam_path,
        "Check-in kiosk starting"
    );

    let platform: Arc<dyn ScanPlatform> = Arc::new(ZbarPlatform::new(
        config.zbarcam_path.clone(),
        config.video_sys_dir.clone(),
    ));
    let prober = Arc::new(CameraProber::new(platform.clone()));
    let session = Arc::new(ScanSession::new(platform));
    tracing::info!("ScanSession initialized (zbarcam platform)");

    let identity = Arc::new(StoredIdentity::new(config.colaborador_id.clone()));
    if identity.current().is_none() {
        tracing::warn!("No COLABORADOR_ID configured; check-ins will fail until the kiosk is paired");
    }

    let submitter = Arc::new(CheckinSubmitter::new(
        config.backend_url.clone(),
        identity.clone(),
    ));
    tracing::info!(backend_url = %config.backend_url, "CheckinSubmitter initialized");

    let realtime_hub = Arc::new(RealtimeHub::new());

    let flow = Arc::new(AttendanceFlow::new(
        session.clone(),
        prober.clone(),
        submitter.clone(),
        realtime_hub.clone(),
    ));
    flow.start().await;
    tracing::info!("AttendanceFlow started");

    let state = AppState {
        config,
        started_at: Instant::now(),
        prober,
        session: session.clone(),
        submitter,
        identity,
        flow,
        realtime_hub,
    };

    // Create router with static file serving
    let static_dir = state.config.static_dir.clone();
    let serve_dir = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(format!("{}/index.html", static_dir)));

    let app = web_api::create_router(state.clone())
        .fallback_service(serve_dir)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!(static_dir = %static_dir, "Static file serving enabled");

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Teardown: the camera must be released on every exit path.
    session.stop().await;
    tracing::info!("Camera released, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
