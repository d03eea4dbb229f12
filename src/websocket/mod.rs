//! WebSocket front end: one `/ws` endpoint speaking a small framed protocol
//! (`subscribe` / `unsubscribe` / `message` / `rpc`) on top of the gateway.

mod connection;
mod hub;

pub use hub::Hub;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::gateway::Gateway;

pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub hub: Arc<Hub>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrade handler. The transport identifies users; here that is the `user`
/// query parameter (authentication is a fronting proxy's job).
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(user) = params.get("user").filter(|user| !user.is_empty()).cloned() else {
        return (StatusCode::BAD_REQUEST, "missing `user` query parameter").into_response();
    };

    ws.on_upgrade(move |socket| connection::handle_socket(socket, state, user))
}

async fn health_check(State(state): State<Arc<AppState>>) -> String {
    let rooms = state.gateway.manager().room_count().await;
    format!("OK ({rooms} rooms)")
}

pub async fn run_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
