//! Order Flow - conversational food ordering service
//!
//! A deterministic router over an order state machine that dispatches each
//! customer turn to a stage-specific LLM handler.

mod api;
mod db;
mod handlers;
mod llm;
mod menu;
mod session;
mod state_machine;

use api::{create_router, AppState};
use db::Database;
use llm::{LlmConfig, ModelRegistry};
use menu::Menu;
use session::{DatabaseArchive, LlmClient, RegistryLlmClient, SessionConfig, SessionManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_flow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("ORDER_FLOW_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.order-flow/orders.db")
    });

    let port: u16 = std::env::var("ORDER_FLOW_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let menu = match std::env::var("ORDER_FLOW_MENU_PATH") {
        Ok(path) => {
            let menu = Menu::load(&path)?;
            tracing::info!(path = %path, items = menu.items.len(), "Loaded menu");
            menu
        }
        Err(_) => Menu::default(),
    };

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!("No LLM API keys configured. Set GEMINI_API_KEY or LLM_GATEWAY.");
    }

    let llm = Arc::new(RegistryLlmClient::new(llm_registry));
    let session_config = SessionConfig::from_env();
    tracing::info!(
        model = %llm.model_id(),
        max_attempts = session_config.max_attempts,
        llm_timeout_ms = u64::try_from(session_config.llm_timeout.as_millis()).unwrap_or(u64::MAX),
        max_turns = session_config.max_turns,
        "Session loop configured"
    );

    let sessions = Arc::new(SessionManager::new(
        session_config,
        Arc::new(menu),
        llm,
        Arc::new(DatabaseArchive::new(db.clone())),
    ));
    let state = AppState::new(sessions, db);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Order Flow server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
