//! Error types for the WebSocket client transport.

use thiserror::Error;

/// Errors produced by the frame codec, handshake, and transport layers.
///
/// Transport-level failures during connect or inside the read loop are caught
/// and logged internally; callers observe them only as a `closed` event and a
/// subsequently false `is_connected()`. The variants here surface through the
/// fallible entry points (`start` after dispose, direct codec/handshake use)
/// and through internal logging.
#[derive(Debug, Error)]
pub enum WsError {
    /// The TCP connect or TLS handshake did not complete within the
    /// configured timeout.
    #[error("connect attempt timed out")]
    ConnectTimeout,

    /// The server's upgrade response was not a valid `101 Switching
    /// Protocols` answer.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A frame claimed or required a payload length beyond the configured
    /// limit. Treated as untrusted-peer protection: the session is torn down
    /// rather than attempting the allocation.
    #[error("frame payload of {length} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Claimed or requested payload length.
        length: u64,
        /// Maximum payload length accepted.
        limit: u64,
    },

    /// The peer closed the connection: a zero-length read on a live stream,
    /// or an I/O failure mid-frame.
    #[error("stream disconnected")]
    StreamDisconnected,

    /// An operation was invoked on a client that has been disposed.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A frame header carried an opcode outside RFC 6455 Section 5.2.
    #[error("invalid WebSocket opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// A control frame (close/ping/pong) claimed a payload over 125 bytes.
    #[error("control frame payload exceeds 125 bytes")]
    ControlFrameTooLarge,

    /// A control frame arrived with FIN=0, which RFC 6455 forbids.
    #[error("control frame is fragmented")]
    ControlFrameFragmented,

    /// A frame header set reserved bits, which requires a negotiated
    /// extension this client never offers.
    #[error("reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// An underlying socket or TLS I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
