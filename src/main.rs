use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use voicedesk::media::{MediaError, RoomConnection, RoomOptions, RoomTransport};
use voicedesk::{create_router, AppState, Config, HttpTokenIssuer};

#[derive(Debug, Parser)]
#[command(name = "voicedesk", about = "Live voice consultation session engine")]
struct Args {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/voicedesk")]
    config: String,
}

/// Deployments link a signaling adapter and inject it via `AppState`.
/// Without one, connect attempts fail cleanly and the controller reports
/// the error state instead of the process refusing to start.
struct UnconfiguredTransport;

#[async_trait]
impl RoomTransport for UnconfiguredTransport {
    async fn connect(
        &self,
        _server_url: &str,
        _token: &str,
        _options: &RoomOptions,
    ) -> Result<RoomConnection, MediaError> {
        Err(MediaError::ConnectFailed(
            "no media transport adapter configured".into(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Matching bus: {}", cfg.matching.nats_url);
    info!("Token issuer: {}", cfg.media.token_endpoint);

    let state = AppState::new(
        cfg.matching.nats_url.clone(),
        Arc::new(UnconfiguredTransport),
        Arc::new(HttpTokenIssuer::new(cfg.media.token_endpoint.clone())),
    );

    let router = create_router(state);
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
