//! Bridge Protocol Client
//!
//! WebSocket client for the remote signal bridge: authentication, heartbeat,
//! reconnect backoff and the session driver that routes trade signals to
//! execution and reports results.

pub mod auth;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
mod session;

pub use client::{BridgeClient, BridgeError, BridgeEvent, StatusHandle};
pub use codec::{CodecError, JsonCodec};
