//! Router assembly: the three connect routes, the three internal broadcast
//! routes, and a health probe.

use crate::config::AppConfig;
use crate::entities::{
    cart::CartKind,
    conversation::ConversationKind,
    user::{self, UserKind},
};
use crate::ws::broadcast;
use crate::ws::service::RealtimeHub;
use crate::ws::upgrade::{self, ConnectQuery};
use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;

/// Shared application state: the config plus one hub per entity family.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub conversations: Arc<RealtimeHub<ConversationKind>>,
    pub carts: Arc<RealtimeHub<CartKind>>,
    pub users: Arc<RealtimeHub<UserKind>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            conversations: RealtimeHub::new(),
            carts: RealtimeHub::new(),
            users: RealtimeHub::new(),
        }
    }
}

/// Build the full axum Router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ws/connect", get(conversation_connect))
        .route("/api/ws/cart-connect", get(cart_connect))
        .route("/api/ws/user-connect", get(user_connect))
        .route(
            "/internal/conversations/{conversation_id}/broadcast",
            post(conversation_broadcast),
        )
        .route("/internal/carts/{cart_user_id}/broadcast", post(cart_broadcast))
        .route("/internal/users/{user_id}/broadcast", post(user_broadcast))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn conversation_connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade::upgrade(
        ws,
        Arc::clone(&state.conversations),
        state.config.ws_token_secret.as_deref(),
        query,
    )
    .await
}

async fn cart_connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade::upgrade(
        ws,
        Arc::clone(&state.carts),
        state.config.ws_token_secret.as_deref(),
        query,
    )
    .await
}

async fn user_connect(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade::upgrade(
        ws,
        Arc::clone(&state.users),
        state.config.ws_token_secret.as_deref(),
        query,
    )
    .await
}

async fn conversation_broadcast(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    broadcast::handle(
        &state.conversations,
        state.config.internal_broadcast_secret.as_deref(),
        &headers,
        conversation_id,
        body,
    )
    .await
}

async fn cart_broadcast(
    State(state): State<AppState>,
    Path(cart_user_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    broadcast::handle(
        &state.carts,
        state.config.internal_broadcast_secret.as_deref(),
        &headers,
        cart_user_id,
        body,
    )
    .await
}

/// The user hub accepts only the narrow unread-count body, so it is decoded
/// here instead of through the generic event envelope.
async fn user_broadcast(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = broadcast::authorize(
        state.config.internal_broadcast_secret.as_deref(),
        &headers,
    ) {
        return response;
    }
    let Some(event) = user::event_from_broadcast_request(&body) else {
        return broadcast::invalid_request();
    };
    broadcast::deliver(&state.users, user_id, event).await
}
