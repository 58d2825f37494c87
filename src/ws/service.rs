//! The generic `RealtimeHub` that owns live connections and fan-out for one
//! entity family.
//!
//! One hub instance serves every room of its kind; rooms exist only while
//! they have at least one live connection. Every handler is written as if it
//! could be the first invocation after a cold start — nothing outside the
//! registry (and each connection's attachment) is relied upon across
//! invocations.

use crate::ws::{
    handler::{EntityKind, ErrorCode, FrameAction},
    types::{ConnectionHandle, ConnectionId, EntityId, HubState, WsSink},
};
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::{
    SinkExt,
    stream::{SplitStream, StreamExt},
};
use serde::Serialize;
use serde_json::json;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Keep-alive request, matched byte for byte before any parsing or dispatch
/// so heartbeats never run handler code.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;
/// Keep-alive response.
pub const PONG_FRAME: &str = r#"{"type":"pong"}"#;

/// Policy-violation close code, sent when a connection's registry entry is
/// gone and with it the identity needed to keep serving the socket.
const CLOSE_SESSION_EXPIRED: u16 = 1008;

/// A raw inbound data frame, before text normalization.
#[derive(Clone, Copy)]
enum RawFrame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// The per-entity connection hub, generic over an [`EntityKind`].
///
/// Instantiated once per entity family (conversation, cart, user); the three
/// instances share this engine and differ only in the kind's attachment,
/// frame, and event types.
pub struct RealtimeHub<K: EntityKind> {
    state: HubState<K::Attachment>,
}

impl<K: EntityKind> std::fmt::Debug for RealtimeHub<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeHub")
            .field("kind", &K::KIND)
            .field("state", &self.state)
            .finish()
    }
}

impl<K: EntityKind> Default for RealtimeHub<K> {
    fn default() -> Self {
        Self {
            state: HubState::default(),
        }
    }
}

impl<K: EntityKind> RealtimeHub<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Public entry point called by the upgrade gateway for each accepted
    /// connection. Registers the connection in its room and spawns the
    /// per-connection receive loop.
    #[instrument(skip_all, fields(kind = K::KIND, conn_id, entity_id))]
    pub async fn handle_connection(self: Arc<Self>, socket: WebSocket, attachment: K::Attachment) {
        let conn_id = ConnectionId::new_v4();
        let entity_id = K::entity_id(&attachment);
        tracing::Span::current().record("conn_id", tracing::field::display(conn_id));
        tracing::Span::current().record("entity_id", entity_id);

        let (sink, stream) = socket.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        self.state.rooms.entry(entity_id).or_default().insert(
            conn_id,
            ConnectionHandle {
                sink: Arc::clone(&sink),
                attachment: attachment.clone(),
            },
        );

        info!(attachment = ?attachment, "client connected");

        let hub = Arc::clone(&self);
        tokio::spawn(async move {
            hub.run_client_message_receiver(stream, conn_id, entity_id, sink)
                .await;
        });
    }

    /// Dedicated task that runs for each connection, processing its frames
    /// until the peer goes away. An error on this socket never affects the
    /// room's other sockets.
    #[instrument(skip_all, fields(kind = K::KIND, conn_id = %conn_id, entity_id = entity_id))]
    async fn run_client_message_receiver(
        &self,
        mut stream: SplitStream<WebSocket>,
        conn_id: ConnectionId,
        entity_id: EntityId,
        sink: WsSink,
    ) {
        let mut close_frame: Option<(u16, String)> = None;

        while let Some(received) = stream.next().await {
            match received {
                Ok(Message::Text(text)) => {
                    let outcome = self
                        .handle_frame(conn_id, entity_id, RawFrame::Text(text.as_str()), &sink)
                        .await;
                    if outcome.is_break() {
                        break;
                    }
                }
                Ok(Message::Binary(bytes)) => {
                    let outcome = self
                        .handle_frame(conn_id, entity_id, RawFrame::Binary(&bytes), &sink)
                        .await;
                    if outcome.is_break() {
                        break;
                    }
                }
                // Protocol-level keep-alive; pings are answered by the
                // websocket layer without reaching this loop's dispatch.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    close_frame = frame.map(|f| (f.code, f.reason.to_string()));
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "websocket receive error");
                    break;
                }
            }
        }

        self.on_disconnect(conn_id, entity_id, close_frame);
    }

    /// Process one inbound data frame. `Break` ends the receive loop.
    async fn handle_frame(
        &self,
        conn_id: ConnectionId,
        entity_id: EntityId,
        frame: RawFrame<'_>,
        sink: &WsSink,
    ) -> ControlFlow<()> {
        // Keep-alive fast path: the literal ping is answered before any
        // registry lookup, decode, or dispatch.
        if let RawFrame::Text(text) = frame {
            if text == PING_FRAME {
                self.send_text(sink, PONG_FRAME).await;
                return ControlFlow::Continue(());
            }
        }

        // Identity first: without the registry entry made at accept time
        // there is no authorization context left to serve this socket with.
        let Some(attachment) = self.attachment_of(entity_id, conn_id) else {
            warn!("no registry entry for live connection, closing");
            self.send_error(sink, ErrorCode::SessionExpired, None).await;
            self.close(sink, CLOSE_SESSION_EXPIRED, "session expired")
                .await;
            return ControlFlow::Break(());
        };

        // Normalize binary frames to text. A single undecodable frame is
        // not fatal to the connection.
        let text = match frame {
            RawFrame::Text(text) => text,
            RawFrame::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => {
                    debug!(error = %err, "binary frame is not valid UTF-8");
                    self.send_error(sink, ErrorCode::DecodeError, None).await;
                    return ControlFlow::Continue(());
                }
            },
        };

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "client frame is not valid JSON");
                self.send_error(sink, ErrorCode::InvalidJson, None).await;
                return ControlFlow::Continue(());
            }
        };

        // Decode into the kind's closed frame union; anything it does not
        // accept goes to the kind's default arm with the offending tag.
        let action = match serde_json::from_value::<K::ClientFrame>(value.clone()) {
            Ok(frame) => {
                debug!(frame = ?frame, "client frame received");
                K::on_frame(frame, &attachment)
            }
            Err(_) => {
                let type_name = value
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("(none)");
                K::on_unknown(type_name, &attachment)
            }
        };

        match action {
            FrameAction::BroadcastOthers(event) => {
                if let Err(err) = self.fan_out(entity_id, Some(conn_id), &event).await {
                    warn!(error = %err, "failed to serialize dispatch event");
                }
            }
            FrameAction::Reply(reply) => {
                self.send_json(sink, &reply).await;
            }
            FrameAction::Ignore => {}
        }

        ControlFlow::Continue(())
    }

    /// Fan `event` out to every socket currently in the room.
    ///
    /// Returns how many sockets were delivered to. Broadcasting to an
    /// absent or empty room is a successful no-op (0 sends).
    #[instrument(skip_all, fields(kind = K::KIND, entity_id = entity_id))]
    pub async fn broadcast(
        &self,
        entity_id: EntityId,
        event: &K::Event,
    ) -> Result<usize, serde_json::Error> {
        self.fan_out(entity_id, None, event).await
    }

    /// Shared fan-out: serialize the event once, snapshot the room's
    /// handles, then deliver sequentially and best-effort. A failed send is
    /// logged with that socket's attachment and skipped; it never aborts
    /// delivery to the remaining sockets.
    async fn fan_out(
        &self,
        entity_id: EntityId,
        skip: Option<ConnectionId>,
        event: &K::Event,
    ) -> Result<usize, serde_json::Error> {
        let payload = serde_json::to_string(event)?;

        // Snapshot under the map guard, send after releasing it.
        let targets: Vec<(ConnectionId, WsSink, K::Attachment)> =
            match self.state.rooms.get(&entity_id) {
                Some(room) => room
                    .iter()
                    .filter(|(id, _)| Some(**id) != skip)
                    .map(|(id, handle)| (*id, Arc::clone(&handle.sink), handle.attachment.clone()))
                    .collect(),
                None => return Ok(0),
            };

        if targets.is_empty() {
            return Ok(0);
        }

        debug!(count = targets.len(), event = ?event, "fanning out event");

        let message = Message::Text(Utf8Bytes::from(payload));
        let mut delivered = 0;
        for (conn_id, sink, attachment) in targets {
            match sink.lock().await.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        conn_id = %conn_id,
                        attachment = ?attachment,
                        event = ?event,
                        error = %err,
                        "failed to deliver event, skipping socket"
                    );
                }
            }
        }

        Ok(delivered)
    }

    /// Number of sockets currently attached to `entity_id`. Diagnostics
    /// only — never used for correctness-affecting logic.
    pub fn connection_count(&self, entity_id: EntityId) -> usize {
        self.state
            .rooms
            .get(&entity_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    fn attachment_of(&self, entity_id: EntityId, conn_id: ConnectionId) -> Option<K::Attachment> {
        let room = self.state.rooms.get(&entity_id)?;
        room.get(&conn_id).map(|handle| handle.attachment.clone())
    }

    /// Remove the connection from its room, dropping the room when it was
    /// the last one. Running this for an already-removed connection is a
    /// silent no-op.
    #[instrument(skip_all, fields(kind = K::KIND, conn_id = %conn_id, entity_id = entity_id))]
    fn on_disconnect(
        &self,
        conn_id: ConnectionId,
        entity_id: EntityId,
        close_frame: Option<(u16, String)>,
    ) {
        let removed = self
            .state
            .rooms
            .get_mut(&entity_id)
            .and_then(|mut room| room.remove(&conn_id))
            .map(|handle| handle.attachment);
        self.state
            .rooms
            .remove_if(&entity_id, |_, room| room.is_empty());

        match (&removed, close_frame) {
            (Some(attachment), Some((code, reason))) => {
                info!(attachment = ?attachment, code, reason = %reason, "client disconnected");
            }
            (Some(attachment), None) => {
                info!(attachment = ?attachment, "client disconnected");
            }
            (None, _) => {
                debug!("disconnect for already-removed connection");
            }
        }
    }

    async fn send_text(&self, sink: &WsSink, text: &str) {
        let message = Message::Text(Utf8Bytes::from(text.to_owned()));
        if let Err(err) = sink.lock().await.send(message).await {
            warn!(error = %err, "failed to send frame, client likely disconnected");
        }
    }

    async fn send_json<T: Serialize>(&self, sink: &WsSink, data: &T) {
        match serde_json::to_string(data) {
            Ok(text) => self.send_text(sink, &text).await,
            Err(err) => warn!(error = %err, "failed to serialize outbound frame"),
        }
    }

    /// Send a standardized error frame to one client.
    async fn send_error(&self, sink: &WsSink, code: ErrorCode, message: Option<String>) {
        let mut frame = json!({
            "type": "error",
            "code": code.as_str(),
        });
        if let Some(message) = message {
            frame["message"] = json!(message);
        }
        self.send_json(sink, &frame).await;
    }

    async fn close(&self, sink: &WsSink, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from(reason.to_owned()),
        };
        if let Err(err) = sink.lock().await.send(Message::Close(Some(frame))).await {
            debug!(error = %err, "failed to send close frame");
        }
    }
}
