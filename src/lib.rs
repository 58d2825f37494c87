//! # Realtime Hub
//!
//! Per-entity WebSocket coordination for a marketplace application: one
//! logical room per conversation, per cart, and per user, multiplexing
//! every socket currently interested in that entity.
//!
//! ## Core pieces
//!
//! - **Generic `RealtimeHub`**: one engine for accepting connections,
//!   routing client frames, and fanning events out, parameterized by an
//!   [`EntityKind`] and instantiated three times.
//! - **Token-gated upgrades**: HMAC-SHA256 bearer tokens verified before a
//!   socket is ever created.
//! - **Authenticated broadcast channel**: stateless HTTP handlers push
//!   events into a room through a shared-secret internal endpoint; the hub
//!   is pure fan-out, never a source of truth.
//! - **Typed frame routing**: closed `type`-tagged unions per entity
//!   family, with unknown input degrading to an error frame instead of a
//!   dropped connection.
//!
//! See the `ws` module for the engine and the `entities` module for the
//! three specializations.
//!
//! [`EntityKind`]: crate::ws::handler::EntityKind

pub mod auth;
pub mod config;
pub mod entities;
pub mod routes;
pub mod ws;

/// Public prelude for convenience.
///
/// This allows users to import the most common types with a single `use`
/// statement: `use realtime_hub::prelude::*;`
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::routes::{AppState, build_router};
    pub use crate::ws::{
        handler::{EntityKind, FrameAction},
        service::RealtimeHub,
    };
}
