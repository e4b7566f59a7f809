use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use match_signaling_service::config::{LogConfig, LogFormat, Settings};
use match_signaling_service::server::{create_app, AppState};
use match_signaling_service::shutdown::{GracefulShutdown, ShutdownConfig};
use match_signaling_service::tasks::HeartbeatTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.log);
    tracing::info!("Configuration loaded");

    // Create application state
    let state = AppState::new(settings.clone());
    tracing::info!(
        auth_enabled = state.jwt_validator.is_some(),
        "Application state initialized"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start heartbeat task in background
    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.hub.clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_task.run().await;
    });

    let graceful = GracefulShutdown::with_config(
        state.hub.clone(),
        shutdown_tx,
        ShutdownConfig::from(&settings.shutdown),
    );

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(graceful))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = heartbeat_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal_handler(graceful: GracefulShutdown) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "Server interrupted"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "Server is restarting"
        }
    };

    // Sessions are drained before the listener stops
    graceful.execute(reason).await;
}

