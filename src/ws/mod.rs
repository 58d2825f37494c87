//! The WebSocket hub: connection registry, upgrade gateway, per-frame
//! routing, and the authenticated broadcast channel.

pub mod broadcast;
pub mod handler;
pub mod service;
pub mod types;
pub mod upgrade;
