//! A minimal reconnecting WebSocket client transport.
//!
//! The crate owns a TCP (optionally TLS) socket, performs the HTTP/1.1
//! upgrade handshake, speaks RFC 6455 client-role framing, keeps the
//! connection alive with a heartbeat, and transparently reconnects on
//! failure. Callers interact through [`WsClient`]: `start`/`stop`/`send`,
//! `is_connected`, and the opened/closed/message listener registrations.
//!
//! Out of scope by design: server-side behavior, extensions, subprotocol
//! negotiation, and fragmented-message reassembly.

#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![warn(missing_docs)]

/// Public client API and the reconnect supervisor.
pub mod client;
/// Client-role frame codec (tokio_util `Decoder`/`Encoder`) with injected
/// masking randomness.
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
/// Pure RFC 6455 frame parsing and encoding.
pub mod frame;
pub mod handshake;
mod session;
pub mod stream;

pub use client::WsClient;
pub use config::ClientConfig;
pub use error::WsError;
pub use events::EventListeners;
pub use frame::{Frame, Opcode};
pub use stream::Endpoint;
