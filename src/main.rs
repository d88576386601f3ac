//! Wellspring - employee assistance counseling platform

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wellspring::{db::Database, server, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wellspring={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Wellspring - EAP counseling platform");
    info!("======================================");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT_SHORT"));
    info!("Listen: {}", args.listen_addr());
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("System counselor rate: {} KRW", args.system_counselor_rate);
    info!("Dashboard cache: {}", if args.dashboard_cache { "enabled" } else { "disabled" });

    let db = Database::connect_or_demo(args.mongodb_uri.as_deref(), &args.mongodb_db).await;
    if let Err(e) = db.ensure_indexes().await {
        error!("Failed to create indexes: {}", e);
        return Err(e.into());
    }

    let state = Arc::new(AppState::new(args, db)?);
    server::run(state).await?;

    Ok(())
}
