//! The token-gated upgrade path shared by every connect route.
//!
//! Non-WebSocket requests never reach this code: axum's `WebSocketUpgrade`
//! extractor rejects them with `426 Upgrade Required` before the handler
//! runs. Everything after that is ordered fail-closed: configuration, then
//! token presence, then the codec, then the kind's identity gate.

use crate::auth;
use crate::ws::handler::EntityKind;
use crate::ws::service::RealtimeHub;
use axum::{
    extract::ws::WebSocketUpgrade,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Query parameters accepted by every connect route. The token is optional
/// at the type level so its absence maps to a 401, not a query rejection.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Validate the request and, on success, hand the socket to the hub with
/// the resolved attachment.
///
/// Failure responses, in check order:
/// - signing secret unconfigured → `500 Server configuration error`
///   ("unconfigured" is never "allow");
/// - no `token` query parameter → `401 Missing token`;
/// - codec rejection → 401 carrying only the coarse failure kind, with the
///   detailed reason logged server-side;
/// - missing/zero identity fields for this kind → `401 Unauthorized`.
#[instrument(skip_all, fields(kind = K::KIND))]
pub async fn upgrade<K: EntityKind>(
    ws: WebSocketUpgrade,
    hub: Arc<RealtimeHub<K>>,
    signing_secret: Option<&str>,
    query: ConnectQuery,
) -> Response {
    let Some(secret) = signing_secret else {
        warn!("upgrade refused: no signing secret configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error",
        )
            .into_response();
    };

    let Some(token) = query.token else {
        warn!("upgrade refused: missing token");
        return (StatusCode::UNAUTHORIZED, "Missing token").into_response();
    };

    let claims = match auth::verify_claims(&token, secret) {
        Ok(claims) => claims,
        Err(err) => {
            warn!(reason = %err, "upgrade refused: token rejected");
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
    };

    let attachment = match K::resolve(&claims) {
        Ok(attachment) => attachment,
        Err(err) => {
            warn!(reason = %err, "upgrade refused: incomplete identity");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    info!(attachment = ?attachment, "upgrade accepted");

    ws.on_upgrade(move |socket| hub.handle_connection(socket, attachment))
}
