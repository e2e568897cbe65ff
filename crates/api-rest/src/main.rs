//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the claims REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `nme-run` binary wires the same
//! router after its own startup checks.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{app, AppState};
use nme_core::CoreConfig;

/// Main entry point for the claims REST API server
///
/// # Environment Variables
/// - `NME_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CLAIMS_DATA_DIR`: Directory for patient claim storage (default: "claims_data")
/// - `NME_PROMPTS_FILE`, `NME_IDEMPOTENCY_TTL_SECS`, `NME_ORACLE_TIMEOUT_SECS`,
///   `NME_SAME_DAY_GUARD`, `NME_ORACLE_PROVIDERS`: see `CoreConfig`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the prompt catalog cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("NME_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting NME REST API on {}", addr);

    let cfg = Arc::new(CoreConfig::from_env()?);

    let state = AppState::from_config(cfg)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
