//! Conversation rooms: typing indicators and read receipts between chat
//! participants, plus message fan-out pushed by the messages API.

use crate::auth::TokenClaims;
use crate::ws::handler::{EntityKind, ErrorCode, FrameAction, IdentityError};
use crate::ws::types::EntityId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Marker type for conversation rooms.
pub struct ConversationKind;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAttachment {
    pub user_id: i64,
    pub conversation_id: i64,
}

/// Frames conversation clients may send. Identity always comes from the
/// attachment, never from the frame body, so no variant carries a payload.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationFrame {
    Typing,
    Read,
    Ping,
    Pong,
}

/// Events fanned out to a conversation's sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    Message {
        payload: MessagePayload,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        user_id: i64,
        conversation_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    Read {
        user_id: i64,
        conversation_id: i64,
        /// Unix milliseconds, stamped by whoever observed the read.
        timestamp: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: i64,
    pub content: String,
    pub content_type: ContentType,
    pub created_at: String,
    pub sender: SenderInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub id: i64,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl EntityKind for ConversationKind {
    type Attachment = ConversationAttachment;
    type ClientFrame = ConversationFrame;
    type Event = ConversationEvent;

    const KIND: &'static str = "conversation";

    fn resolve(claims: &TokenClaims) -> Result<Self::Attachment, IdentityError> {
        if claims.user_id == 0 {
            return Err(IdentityError("userId"));
        }
        if claims.conversation_id == 0 {
            return Err(IdentityError("conversationId"));
        }
        Ok(ConversationAttachment {
            user_id: claims.user_id,
            conversation_id: claims.conversation_id,
        })
    }

    fn entity_id(attachment: &Self::Attachment) -> EntityId {
        attachment.conversation_id
    }

    fn on_frame(
        frame: Self::ClientFrame,
        attachment: &Self::Attachment,
    ) -> FrameAction<Self::Event> {
        match frame {
            ConversationFrame::Typing => FrameAction::BroadcastOthers(ConversationEvent::Typing {
                user_id: attachment.user_id,
                conversation_id: attachment.conversation_id,
            }),
            ConversationFrame::Read => FrameAction::BroadcastOthers(ConversationEvent::Read {
                user_id: attachment.user_id,
                conversation_id: attachment.conversation_id,
                timestamp: Utc::now().timestamp_millis(),
            }),
            // Keep-alive frames that reached dispatch (e.g. re-serialized
            // with different whitespace) are not an error.
            ConversationFrame::Ping | ConversationFrame::Pong => FrameAction::Ignore,
        }
    }

    fn on_unknown(type_name: &str, _attachment: &Self::Attachment) -> FrameAction<Self::Event> {
        FrameAction::Reply(json!({
            "type": "error",
            "code": ErrorCode::UnknownMessageType.as_str(),
            "message": format!("Unknown message type: {type_name}"),
        }))
    }
}
