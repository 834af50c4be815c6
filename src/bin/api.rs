use prism_ledger::{
    api::{start_server, AppState},
    Config,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!("🚀 Prism Ledger - API Server");
    info!("📍 Port: {}", config.port);

    if config.openai_api_key.is_empty() {
        warn!("⚠️  OPENAI_API_KEY not set, /api/ai/parse will fail");
    }
    if config.google_client_id.is_empty() {
        warn!("⚠️  GOOGLE_CLIENT_ID not set, Google sign-in will fail");
    }

    let state = AppState::from_config(&config);

    info!("✅ Services initialized");
    info!("📡 Starting API server...");

    start_server(state, &config).await?;

    Ok(())
}
