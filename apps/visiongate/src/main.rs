use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use visiongate_common::{GlobalConfig, GlobalConfigPatch};
use visiongate_core::VisionEngine;
use visiongate_protocol::ProviderKind;
use visiongate_router::vision_router;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("visiongate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = load_config(Cli::parse())?;
    info!(
        host = %config.host,
        port = config.port,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        default_provider = %config.default_provider,
        max_image_bytes = config.max_image_bytes,
        heartbeat_ms = config.stream.heartbeat_ms,
        "config loaded"
    );
    for kind in ProviderKind::ALL {
        if !config.providers.get(kind).has_api_key() {
            warn!(provider = %kind, "no api key configured; upstream calls go out unauthenticated");
        }
    }

    let bind = format!("{}:{}", config.host, config.port);
    let engine = Arc::new(VisionEngine::from_config(config)?);
    let app = vision_router(engine);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutdown complete");
    Ok(())
}

/// Defaults, then the `--config` file, then environment and flags.
fn load_config(cli: Cli) -> Result<GlobalConfig, Box<dyn Error + Send + Sync>> {
    let mut merged = match cli.config.as_deref() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("read config {}: {err}", path.display()))?;
            GlobalConfigPatch::from_json(&raw)?
        }
        None => GlobalConfigPatch::default(),
    };
    merged.overlay(cli.into_patch());
    Ok(merged.into_config()?)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "visiongate=info,visiongate_core=info,visiongate_router=info",
        )
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
