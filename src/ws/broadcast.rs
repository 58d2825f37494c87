//! The authenticated server-to-room broadcast channel.
//!
//! This is the only write path into a room from outside the WebSocket
//! protocol itself. Stateless HTTP mutation handlers call it after
//! committing their own state change, treating the hub purely as a fan-out
//! mechanism with no source-of-truth responsibilities.
//!
//! Authorization is a shared secret in the `X-Internal-Secret` header,
//! compared in constant time. Both sides must be present: a missing
//! configured secret or a missing header is a 401, never "no auth
//! required".

use crate::auth;
use crate::ws::handler::EntityKind;
use crate::ws::service::RealtimeHub;
use crate::ws::types::EntityId;
use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{debug, error, instrument, warn};

/// Header carrying the internal shared secret.
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// The `action` every broadcast body must carry.
const BROADCAST_ACTION: &str = "broadcast";

/// Handle a broadcast request carrying the standard
/// `{"action":"broadcast","event":{…}}` body. The event must decode into
/// the kind's closed event union; anything else is a 400.
#[instrument(skip_all, fields(kind = K::KIND, entity_id = entity_id))]
pub async fn handle<K: EntityKind>(
    hub: &RealtimeHub<K>,
    configured_secret: Option<&str>,
    headers: &HeaderMap,
    entity_id: EntityId,
    body: Value,
) -> Response {
    if let Err(response) = authorize(configured_secret, headers) {
        return response;
    }

    let Some(event_value) = envelope_event(&body) else {
        return invalid_request();
    };
    let event: K::Event = match serde_json::from_value(event_value.clone()) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, "broadcast event failed to decode");
            return invalid_request();
        }
    };

    deliver(hub, entity_id, event).await
}

/// Check the shared secret, failing closed when either side is absent.
pub(crate) fn authorize(
    configured_secret: Option<&str>,
    headers: &HeaderMap,
) -> Result<(), Response> {
    let Some(configured) = configured_secret else {
        warn!("broadcast refused: no internal secret configured");
        return Err(unauthorized());
    };
    let provided = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    let Some(provided) = provided else {
        warn!("broadcast refused: missing secret header");
        return Err(unauthorized());
    };
    if !auth::constant_time_eq(provided, configured) {
        warn!("broadcast refused: secret mismatch");
        return Err(unauthorized());
    }
    Ok(())
}

/// Fan a decoded event out and build the HTTP response. Delegation
/// failures surface as a generic 500; detail goes to logs only.
pub(crate) async fn deliver<K: EntityKind>(
    hub: &RealtimeHub<K>,
    entity_id: EntityId,
    event: K::Event,
) -> Response {
    match hub.broadcast(entity_id, &event).await {
        Ok(delivered) => {
            debug!(delivered, "event fanned out");
            Json(json!({"success": true})).into_response()
        }
        Err(err) => {
            error!(error = %err, "broadcast delegation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

/// Extract the `event` of a well-formed broadcast envelope, or `None` when
/// the body shape is wrong.
fn envelope_event(body: &Value) -> Option<&Value> {
    if body.get("action").and_then(Value::as_str) != Some(BROADCAST_ACTION) {
        return None;
    }
    body.get("event")
}

/// Check that a narrow-shape broadcast body (no `event` envelope) carries
/// the expected `action` and `type`.
pub(crate) fn is_narrow_request(body: &Value, expected_type: &str) -> bool {
    body.get("action").and_then(Value::as_str) == Some(BROADCAST_ACTION)
        && body.get("type").and_then(Value::as_str) == Some(expected_type)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

pub(crate) fn invalid_request() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid broadcast request").into_response()
}
