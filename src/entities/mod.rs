//! The three entity families served by the hub.
//!
//! Each module supplies one zero-sized [`EntityKind`] marker plus its
//! attachment, client-frame, and event types. The shared engine lives in
//! [`crate::ws::service`]; only identity and dispatch differ here.
//!
//! [`EntityKind`]: crate::ws::handler::EntityKind

pub mod cart;
pub mod conversation;
pub mod user;
