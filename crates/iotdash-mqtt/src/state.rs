//! Connection lifecycle states.

use std::fmt;

/// State of the [`ConnectionOrchestrator`](crate::ConnectionOrchestrator).
///
/// ```text
/// Idle ──start──▶ Connecting ──CONNACK──▶ Connected
///                   │    ▲                    │
///     credential or │    │ reconnect period   │ close / error / expiry
///     signing error │    └──── Reconnecting ◀─┘
///                   ▼
///                 Failed
/// ```
///
/// `stop()` returns to `Idle` from any state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started, or stopped.
    #[default]
    Idle,
    /// Fetching credentials, signing or opening the transport.
    Connecting,
    /// Session established and subscriptions sent.
    Connected,
    /// Waiting out the reconnect period.
    Reconnecting,
    /// Credentials could not be obtained. Terminal until the next `start()`.
    Failed,
}

impl ConnectionState {
    /// Whether outbound publishes are accepted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        })
    }
}
