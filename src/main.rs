use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use civichub::{
    api,
    auth::{AuthConfig, JwtAuth},
    config::HubConfig,
    membership::InMemoryMembership,
    state::{AppState, Collaborators},
    store::InMemoryMessageStore,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "civichub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting civichub...");

    let config = HubConfig::from_env();
    let auth_config = AuthConfig::from_env();

    let collaborators = Collaborators {
        tokens: Arc::new(JwtAuth::from_config(&auth_config)),
        membership: Arc::new(InMemoryMembership::from_env()),
        messages: Arc::new(InMemoryMessageStore::new()),
    };

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, auth_config, collaborators));
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
