//! VSM - secret storage service
//!
//! Serves create, get and delete of envelope-encrypted secrets over HTTP,
//! backed by a configurable data store and key store.

mod config;
mod router;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vsm_secrets::SecretManager;

#[derive(Parser, Debug)]
#[command(name = "vsm")]
#[command(about = "Secret storage service with envelope encryption", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./vsm.toml if present)
    #[arg(short, long, env = "VSM_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration file
    #[arg(short, long, env = "VSM_PORT")]
    port: Option<u16>,

    /// Host to bind to, overriding the configuration file
    #[arg(long, env = "VSM_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "VSM_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "vsm={level},vsm_secrets={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load(args.config.as_deref())?;

    info!("Starting VSM...");
    info!("  Data store: {:?}", config.data_store);
    info!("  Key store: {:?}", config.key_store);

    let data_store = config.data_store.build_data_store();
    let key_store = config.key_store.build_key_store();

    let manager = Arc::new(SecretManager::new());
    manager
        .init(&config.secrets, data_store, key_store)
        .await?;

    let app = router::create_router(manager.clone());

    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.close().await?;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
