//! Cart rooms: notification-only channels keyed by the cart owner's user
//! id. Both the owner and any assisting agent attach to the same room; the
//! cart API pushes item events after committing its own state change.

use crate::auth::TokenClaims;
use crate::ws::handler::{EntityKind, FrameAction, IdentityError};
use crate::ws::types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Marker type for cart rooms.
pub struct CartKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartRole {
    Owner,
    Agent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartAttachment {
    pub user_id: i64,
    pub cart_user_id: i64,
    pub role: CartRole,
}

/// Who made a cart change, so clients can tell self-service and
/// agent-assisted edits apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredBy {
    pub role: CartRole,
}

/// Cart clients are not expected to send meaningful frames; keep-alive is
/// handled before dispatch and anything else is logged and ignored.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartFrame {
    Ping,
    Pong,
}

/// Events fanned out to a cart's sockets. Item bodies are owned by the cart
/// store and passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    #[serde(rename_all = "camelCase")]
    ItemAdded { item: Value, triggered_by: TriggeredBy },
    #[serde(rename_all = "camelCase")]
    ItemUpdated { item: Value, triggered_by: TriggeredBy },
    #[serde(rename_all = "camelCase")]
    ItemRemoved {
        item_id: i64,
        triggered_by: TriggeredBy,
    },
    #[serde(rename_all = "camelCase")]
    CartCleared { triggered_by: TriggeredBy },
}

impl EntityKind for CartKind {
    type Attachment = CartAttachment;
    type ClientFrame = CartFrame;
    type Event = CartEvent;

    const KIND: &'static str = "cart";

    fn resolve(claims: &TokenClaims) -> Result<Self::Attachment, IdentityError> {
        if claims.user_id == 0 {
            return Err(IdentityError("userId"));
        }
        if claims.cart_user_id == 0 {
            return Err(IdentityError("cartUserId"));
        }
        let role = match claims.role.as_deref() {
            Some("owner") => CartRole::Owner,
            Some("agent") => CartRole::Agent,
            _ => return Err(IdentityError("role")),
        };
        Ok(CartAttachment {
            user_id: claims.user_id,
            cart_user_id: claims.cart_user_id,
            role,
        })
    }

    fn entity_id(attachment: &Self::Attachment) -> EntityId {
        attachment.cart_user_id
    }

    fn on_frame(
        frame: Self::ClientFrame,
        _attachment: &Self::Attachment,
    ) -> FrameAction<Self::Event> {
        match frame {
            CartFrame::Ping | CartFrame::Pong => FrameAction::Ignore,
        }
    }

    fn on_unknown(type_name: &str, attachment: &Self::Attachment) -> FrameAction<Self::Event> {
        // This channel is receive-only from the client's perspective;
        // unexpected frames are logged but never error the connection.
        debug!(
            type_name,
            attachment = ?attachment,
            "unexpected client frame on cart channel"
        );
        FrameAction::Ignore
    }
}
