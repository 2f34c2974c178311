//! Whiteboard server library logic.
//!
//! Hosts one [`whiteboard_session::CommandSession`] per WebSocket connection
//! and publishes the tool manifest the voice agent registers.

pub mod api_ws;
pub mod config;

use axum::{http::HeaderValue, routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use whiteboard_session::{tool_definitions, ToolDefinition};

pub use api_ws::SessionRegistry;
pub use config::Config;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Live whiteboard sessions, one per WebSocket.
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET /api/tools`: the tool definitions the agent should register.
async fn tools() -> Json<Vec<ToolDefinition>> {
    Json(tool_definitions())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/healthz", get(health))
        .route("/api/tools", get(tools))
        .route("/ws", get(api_ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
