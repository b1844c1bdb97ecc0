//! # fixin-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the dispatch engine and, when
//! configured, the pending-request reaper.

use clap::Parser;
use tokio::sync::watch;

use fixin_api::state::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "fixin-api", version, about = "FixIn request dispatch service")]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_FORMAT", value_parser = ["text", "json"], default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = AppConfig {
        port: cli.port,
        auth_token: std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
    };
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, bearer identities are trusted without a secret");
    }

    let dispatch = fixin_api::bootstrap::dispatch_config_from_env().map_err(|e| {
        tracing::error!("Invalid dispatch configuration: {e}");
        e
    })?;

    let notifier = fixin_api::bootstrap::notifier_from_env().map_err(|e| {
        tracing::error!("Notifier initialization failed: {e}");
        e
    })?;

    let db_pool = fixin_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let reaper_interval = dispatch.reaper_interval;
    let state = fixin_api::bootstrap::bootstrap(config, dispatch, notifier, db_pool);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = reaper_interval.map(|interval| {
        tracing::info!(?interval, "pending-request reaper enabled");
        fixin_dispatch::spawn_reaper(state.engine.clone(), interval, shutdown_rx)
    });

    let app = fixin_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("FixIn API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = reaper {
        let _ = handle.await;
    }

    Ok(())
}
