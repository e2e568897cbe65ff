use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, app};
use nme_core::CoreConfig;

/// Main entry point for the NME claims service
///
/// Resolves configuration once, builds the claim store, prompt catalog, provider chain,
/// idempotency guard and orchestrator, then serves the REST API.
///
/// # Environment Variables
/// - `NME_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLAIMS_DATA_DIR`: Directory for patient claim storage (default: "claims_data")
/// - `NME_PROMPTS_FILE`: Prompt catalog (default: "prompts/claims.yaml")
/// - `NME_ORACLE_PROVIDERS`: Ordered text providers, `name=base_url|model|api_key_env`
/// - `API_KEY`: API key required on mutating routes
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("nme=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("NME_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::from_env()?);
    if !cfg.claims_data_dir().exists() {
        std::fs::create_dir_all(cfg.claims_data_dir())?;
        tracing::info!(
            "created claims data directory {}",
            cfg.claims_data_dir().display()
        );
    }
    if cfg.providers().is_empty() {
        tracing::warn!("NME_ORACLE_PROVIDERS is empty; escalations will fail to generate text");
    }

    let state = AppState::from_config(cfg)?;

    tracing::info!("++ Starting NME REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
