//! Client configuration with production defaults.

use std::time::Duration;

/// Tunables for the transport session and the reconnect supervisor.
///
/// The defaults mirror a conservative embedded-display deployment: connect
/// attempts every second, a 10 second heartbeat, and short bounded waits
/// everywhere so stop always takes effect promptly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for the TCP connect (and, separately, the TLS handshake).
    pub connect_timeout: Duration,
    /// Budget for reading the HTTP upgrade response.
    pub handshake_timeout: Duration,
    /// Send a ping after this long with no outbound activity.
    pub ping_interval: Duration,
    /// Delay between supervisor connect attempts, success or failure alike.
    pub reconnect_delay: Duration,
    /// How long teardown waits for the reader task before giving up on the
    /// join (overrun is logged, not fatal).
    pub shutdown_timeout: Duration,
    /// Largest inbound frame payload accepted before the session is torn
    /// down with a frame-too-large error.
    pub max_frame_payload: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(2),
            max_frame_payload: crate::frame::MAX_PAYLOAD_READ,
        }
    }
}
