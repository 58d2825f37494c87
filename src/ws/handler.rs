//! Defines the `EntityKind` trait, the core abstraction that parameterizes
//! the generic [`RealtimeHub`] engine for one family of entities.
//!
//! The three specializations (conversation, cart, user) share one
//! accept/route/fan-out skeleton; everything that differs between them —
//! the attachment carried by each connection, the closed set of client
//! frames, the broadcast event union, and the dispatch table — lives behind
//! this trait.
//!
//! [`RealtimeHub`]: crate::ws::service::RealtimeHub

use crate::auth::TokenClaims;
use crate::ws::types::EntityId;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;

/// Error codes carried in `{"type":"error"}` frames sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The connection's registry entry is gone, so the identity needed for
    /// authorization is no longer available. The only frame-level failure
    /// that closes the connection.
    SessionExpired,
    /// A binary frame whose bytes are not valid UTF-8.
    DecodeError,
    /// A text frame that does not parse as JSON.
    InvalidJson,
    /// A JSON frame whose `type` tag no variant accepts.
    UnknownMessageType,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::DecodeError => "DECODE_ERROR",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
        }
    }
}

/// Returned by [`EntityKind::resolve`] when the verified token claims do not
/// carry the identity fields the kind requires (missing, or present as zero).
#[derive(Debug, Clone, Copy, Error)]
#[error("missing or zero identity field: {0}")]
pub struct IdentityError(pub &'static str);

/// What the hub should do with one decoded client frame.
#[derive(Debug)]
pub enum FrameAction<E> {
    /// Fan the event out to every *other* socket in the room. The sender is
    /// never echoed to.
    BroadcastOthers(E),
    /// Send a single JSON frame back to the sender only.
    Reply(Value),
    /// Nothing to deliver (the dispatch already logged if appropriate).
    Ignore,
}

/// The central trait implemented once per entity family.
///
/// Implementations are zero-sized markers: all state lives in the hub's
/// registry and in each connection's attachment, so dispatch is a pure
/// function of the decoded frame and the sender's identity.
pub trait EntityKind: Send + Sync + 'static {
    /// Immutable per-connection identity, established at upgrade time.
    /// Re-authentication requires a new connection, not an attachment update.
    type Attachment: Clone + Debug + Serialize + Send + Sync + 'static;

    /// The closed set of frames clients of this kind may send, tagged by
    /// `type`. Anything outside this union is routed to [`on_unknown`].
    ///
    /// [`on_unknown`]: EntityKind::on_unknown
    type ClientFrame: DeserializeOwned + Debug + Send;

    /// The broadcast event union for this kind, tagged by `type`.
    type Event: Serialize + DeserializeOwned + Debug + Send + Sync;

    /// Entity-key prefix, e.g. `conversation` in `conversation-42`.
    const KIND: &'static str;

    /// Build the attachment from verified token claims, rejecting any
    /// missing or zero required field.
    fn resolve(claims: &TokenClaims) -> Result<Self::Attachment, IdentityError>;

    /// Which room a connection with this attachment belongs to.
    fn entity_id(attachment: &Self::Attachment) -> EntityId;

    /// Dispatch one decoded client frame.
    fn on_frame(frame: Self::ClientFrame, attachment: &Self::Attachment) -> FrameAction<Self::Event>;

    /// The required default arm: a parseable JSON frame whose `type` tag is
    /// unknown to [`ClientFrame`] (or missing entirely — `type_name` is then
    /// the placeholder `(none)`). Must never escalate to a connection close.
    ///
    /// [`ClientFrame`]: EntityKind::ClientFrame
    fn on_unknown(type_name: &str, attachment: &Self::Attachment) -> FrameAction<Self::Event>;
}
