//! Router assembly.
//!
//! The relay exposes exactly two endpoints: the websocket upgrade and a
//! health probe. CORS is permissive because classroom devices reach the
//! relay on arbitrary LAN addresses.

pub mod ws;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::handle_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthProtocols {
    http: bool,
    https: bool,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    connected: usize,
    protocols: HealthProtocols,
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let connected = state.clients.read().await.len();
    Json(HealthBody {
        status: "ok",
        connected,
        protocols: HealthProtocols { http: true, https: state.https_enabled },
    })
}
