//! User rooms: one per user, carrying account-level notifications such as
//! unread-count changes to every device the user has open.

use crate::auth::TokenClaims;
use crate::ws::broadcast;
use crate::ws::handler::{EntityKind, FrameAction, IdentityError};
use crate::ws::types::EntityId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Marker type for user rooms.
pub struct UserKind;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttachment {
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserFrame {
    Ping,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEvent {
    #[serde(rename_all = "camelCase")]
    UnreadCountChanged { count: i64, timestamp: i64 },
}

/// Build an unread-count event stamped with the current time.
pub fn unread_count_changed(count: i64) -> UserEvent {
    UserEvent::UnreadCountChanged {
        count,
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// Decode the narrow broadcast body this kind accepts:
/// `{"action":"broadcast","type":"unread_count_changed","count":N}`.
pub fn event_from_broadcast_request(body: &Value) -> Option<UserEvent> {
    if !broadcast::is_narrow_request(body, "unread_count_changed") {
        return None;
    }
    let count = body.get("count").and_then(Value::as_i64)?;
    Some(unread_count_changed(count))
}

impl EntityKind for UserKind {
    type Attachment = UserAttachment;
    type ClientFrame = UserFrame;
    type Event = UserEvent;

    const KIND: &'static str = "user";

    fn resolve(claims: &TokenClaims) -> Result<Self::Attachment, IdentityError> {
        if claims.user_id == 0 {
            return Err(IdentityError("userId"));
        }
        Ok(UserAttachment {
            user_id: claims.user_id,
        })
    }

    fn entity_id(attachment: &Self::Attachment) -> EntityId {
        attachment.user_id
    }

    fn on_frame(
        frame: Self::ClientFrame,
        _attachment: &Self::Attachment,
    ) -> FrameAction<Self::Event> {
        match frame {
            // A JSON ping that missed the literal fast path (different
            // whitespace or extra fields) still deserves a pong.
            UserFrame::Ping => FrameAction::Reply(json!({"type": "pong"})),
            UserFrame::Pong => FrameAction::Ignore,
        }
    }

    fn on_unknown(type_name: &str, attachment: &Self::Attachment) -> FrameAction<Self::Event> {
        debug!(
            type_name,
            attachment = ?attachment,
            "unexpected client frame on user channel"
        );
        FrameAction::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_requires_a_user_id() {
        let claims = TokenClaims {
            user_id: 7,
            ..TokenClaims::default()
        };
        assert_eq!(UserKind::resolve(&claims).unwrap().user_id, 7);
        assert!(UserKind::resolve(&TokenClaims::default()).is_err());
    }

    #[test]
    fn json_ping_gets_a_direct_pong() {
        let attachment = UserAttachment { user_id: 7 };
        match UserKind::on_frame(UserFrame::Ping, &attachment) {
            FrameAction::Reply(reply) => assert_eq!(reply, json!({"type": "pong"})),
            other => panic!("expected pong reply, got {other:?}"),
        }
    }

    #[test]
    fn unexpected_frames_are_ignored() {
        let attachment = UserAttachment { user_id: 7 };
        assert!(matches!(
            UserKind::on_unknown("subscribe", &attachment),
            FrameAction::Ignore
        ));
    }

    #[test]
    fn unread_event_wire_shape() {
        let event = UserEvent::UnreadCountChanged {
            count: 3,
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "unread_count_changed", "count": 3, "timestamp": 1_700_000_000_000i64})
        );
    }

    #[test]
    fn narrow_broadcast_body_decodes() {
        let body = json!({"action": "broadcast", "type": "unread_count_changed", "count": 5});
        let UserEvent::UnreadCountChanged { count, timestamp } =
            event_from_broadcast_request(&body).unwrap();
        assert_eq!(count, 5);
        assert!(timestamp > 0);
    }

    #[test]
    fn narrow_broadcast_body_rejects_bad_shapes() {
        assert!(event_from_broadcast_request(&json!({"action": "broadcast"})).is_none());
        assert!(
            event_from_broadcast_request(
                &json!({"action": "broadcast", "type": "unread_count_changed"})
            )
            .is_none()
        );
        assert!(
            event_from_broadcast_request(
                &json!({"action": "publish", "type": "unread_count_changed", "count": 1})
            )
            .is_none()
        );
    }
}
