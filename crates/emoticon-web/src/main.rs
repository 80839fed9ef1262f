//! emoticon-web — Axum adapter over the emoticon catalogue.
//! Loads config, opens the service, serves the REST API and the log channel.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use emoticon_core::config::Config;
use emoticon_core::service::EmoticonService;

use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = match Config::load_from_env(&working_dir) {
        Ok(config) => config,
        Err(e) => {
            warn!("Using default config: {:#}", e);
            Config::rooted_at(&working_dir)
        }
    };

    // A content path that is not a directory is fatal here.
    let service = Arc::new(
        EmoticonService::open(config)
            .await
            .context("Failed to start emoticon service")?,
    );
    let cfg = service.config();
    info!(
        "Serving emoticons from {} (enabled: {})",
        cfg.content_path().display(),
        cfg.emoticon_enabled
    );

    if cfg.debug_error_to_channel {
        let mut errors = service.errors().subscribe();
        let channel = cfg.debug_history_or_error_channel.clone();
        tokio::spawn(async move {
            loop {
                match errors.recv().await {
                    Ok(report) => warn!(
                        target: "log_channel",
                        "[{}] {} | {} | {}", channel, report.timestamp, report.context, report.error
                    ),
                    Err(RecvError::Lagged(n)) => warn!("Log channel lagged {} reports", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let state = Arc::new(AppState {
        service: Arc::clone(&service),
    });
    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    eprintln!("  Emoticon API listening on http://localhost:{}\n", port);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server stopped.");
    Ok(())
}
