//! Error types for the connection layer.

/// MQTT packet encoding or decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The packet is structurally invalid.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    /// Packet type this client does not handle.
    #[error("unsupported packet type {0}")]
    UnsupportedPacketType(u8),

    /// A string field is not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A string field exceeds the 16-bit length prefix.
    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),

    /// The packet body exceeds the remaining-length limit.
    #[error("packet of {0} bytes exceeds the remaining length limit")]
    PacketTooLarge(usize),
}

/// Failure of a single transport session.
///
/// Every variant is retried by the orchestrator after the reconnect period.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The WebSocket connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The gateway refused the handshake or the MQTT session.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// The peer sent bytes that are not valid MQTT.
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// The WebSocket failed mid-session.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The gateway did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Errors surfaced to callers of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Publishing requires the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// The transport's outbound queue is full.
    #[error("outbound queue is full")]
    Backpressure,
}
