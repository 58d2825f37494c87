//! Shared helpers for integration tests: a real server on an ephemeral
//! port, token signing, and small WebSocket client utilities.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use realtime_hub::config::AppConfig;
use realtime_hub::routes::{AppState, build_router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

/// Initialize tracing once for the whole test binary; honors RUST_LOG.
static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
});

pub const TOKEN_SECRET: &str = "test-token-secret";
pub const BROADCAST_SECRET: &str = "test-broadcast-secret";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ws_token_secret: Some(TOKEN_SECRET.to_string()),
        internal_broadcast_secret: Some(BROADCAST_SECRET.to_string()),
    }
}

/// Start the server on a random port and return its address plus the state,
/// so tests can inspect connection counts directly.
pub async fn start_test_server() -> (SocketAddr, AppState) {
    start_test_server_with(test_config()).await
}

pub async fn start_test_server_with(config: AppConfig) -> (SocketAddr, AppState) {
    Lazy::force(&TRACING);
    let state = AppState::new(config);
    let app = build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

pub fn future_exp() -> i64 {
    chrono::Utc::now().timestamp() + 60
}

pub fn sign_token(payload: &Value) -> String {
    realtime_hub::auth::sign(payload, TOKEN_SECRET).expect("failed to sign test token")
}

pub fn conversation_token(user_id: i64, conversation_id: i64) -> String {
    sign_token(&json!({
        "userId": user_id,
        "conversationId": conversation_id,
        "exp": future_exp(),
    }))
}

pub async fn connect(addr: SocketAddr, path_and_query: &str) -> WsClient {
    let url = format!("ws://{addr}{path_and_query}");
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket connect failed");
    stream
}

pub async fn connect_conversation(
    addr: SocketAddr,
    user_id: i64,
    conversation_id: i64,
) -> WsClient {
    let token = conversation_token(user_id, conversation_id);
    connect(addr, &format!("/api/ws/connect?token={token}")).await
}

pub async fn connect_cart(
    addr: SocketAddr,
    user_id: i64,
    cart_user_id: i64,
    role: &str,
) -> WsClient {
    let token = sign_token(&json!({
        "userId": user_id,
        "cartUserId": cart_user_id,
        "role": role,
        "exp": future_exp(),
    }));
    connect(addr, &format!("/api/ws/cart-connect?token={token}")).await
}

pub async fn connect_user(addr: SocketAddr, user_id: i64) -> WsClient {
    let token = sign_token(&json!({"userId": user_id, "exp": future_exp()}));
    connect(addr, &format!("/api/ws/user-connect?token={token}")).await
}

pub async fn send_text(client: &mut WsClient, text: &str) {
    client
        .send(Message::text(text.to_owned()))
        .await
        .expect("send failed");
}

/// Read frames until a text frame arrives, then parse it as JSON.
pub async fn recv_json(client: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended unexpectedly")
            .expect("websocket error");
        match message {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("frame is not JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert that no data frame arrives within `ms` milliseconds.
pub async fn assert_silent(client: &mut WsClient, ms: u64) {
    match tokio::time::timeout(Duration::from_millis(ms), client.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => {}
        Ok(other) => panic!("expected silence, got: {other:?}"),
    }
}

/// Unwrap a pre-upgrade HTTP rejection into its status code.
pub fn expect_http_status(err: tokio_tungstenite::tungstenite::Error) -> (u16, String) {
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            let body = response
                .into_body()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            (status, body)
        }
        other => panic!("expected an HTTP rejection, got: {other:?}"),
    }
}
