//! Internal connection-registry types used by the [`RealtimeHub`].
//!
//! [`RealtimeHub`]: crate::ws::service::RealtimeHub

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::stream::SplitSink;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A unique identifier for a single WebSocket connection.
pub type ConnectionId = Uuid;

/// The numeric identity of one logical entity (a conversation id, a cart
/// owner's user id, or a user id). Together with the kind's name it forms
/// the entity key, e.g. `conversation-42`.
pub type EntityId = i64;

/// A type alias for the WebSocket's writing half (the "Sink"),
/// protected by a Mutex for safe concurrent access from multiple tasks.
pub type WsSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// One live connection: its sink plus the immutable identity attached at
/// accept time. The attachment is owned by the handle outright — it is
/// connection-scoped identity, never a reference into mutable user state,
/// and it cannot change for the connection's lifetime.
pub(crate) struct ConnectionHandle<A> {
    pub(crate) sink: WsSink,
    pub(crate) attachment: A,
}

/// All live connections for one entity.
pub(crate) type Room<A> = HashMap<ConnectionId, ConnectionHandle<A>>;

/// Registry of entity rooms for one hub instance.
///
/// `DashMap` is used for high-performance, concurrent access without `async`
/// locks; guards are never held across an await point. A room is removed the
/// moment its last connection goes away, so an idle entity costs nothing.
pub(crate) struct HubState<A> {
    pub(crate) rooms: DashMap<EntityId, Room<A>>,
}

impl<A> Default for HubState<A> {
    fn default() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }
}

impl<A> fmt::Debug for HubState<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connections: usize = self.rooms.iter().map(|room| room.len()).sum();
        f.debug_struct("HubState")
            .field("rooms", &self.rooms.len())
            .field("connections", &connections)
            .finish()
    }
}
