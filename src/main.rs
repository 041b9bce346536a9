use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomrelay::{
    api,
    assistant::{AssistantConfig, AssistantTrigger},
    auth::AuthConfig,
    broadcast::RoomBroadcaster,
    gate::ConnectionGate,
    llm,
    revocation::{spawn_revocation_sweeper, RevocationConfig, RevocationRegistry},
    rooms::InMemoryRoomDirectory,
    state::AppState,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomrelay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting room relay...");

    let auth_config = AuthConfig::from_env();

    let revocation_config = RevocationConfig::from_env();
    let revocations = Arc::new(RevocationRegistry::new(&revocation_config));
    spawn_revocation_sweeper(revocations.clone(), revocation_config.sweep_interval);

    let rooms = Arc::new(InMemoryRoomDirectory::from_env());

    let provider = match llm::LlmConfig::from_env().build_provider() {
        Ok(provider) => {
            tracing::info!(provider = provider.name(), "LLM provider initialized");
            Some(provider)
        }
        Err(e) => {
            tracing::warn!("{}. Assistant summons will fail.", e);
            None
        }
    };

    let broadcaster = Arc::new(RoomBroadcaster::new());
    let assistant = AssistantTrigger::new(AssistantConfig::from_env(), provider, broadcaster.clone());
    let gate = ConnectionGate::new(&auth_config, revocations, rooms);
    let state = Arc::new(AppState::new(gate, broadcaster, assistant));

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);
    let ip = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| std::net::IpAddr::from([0, 0, 0, 0]));
    let addr = SocketAddr::new(ip, port);
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
