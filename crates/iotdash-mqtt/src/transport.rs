//! Transport abstraction.
//!
//! A [`Transport`] turns a signed URL into a live session. The session is
//! driven through a pair of channels so the orchestrator never touches the
//! socket directly, and tests can substitute an in-memory transport.

use async_trait::async_trait;
use bytes::Bytes;
use iotdash_auth::SignedUrl;
use iotdash_core::ClientId;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Instruction from the orchestrator to an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Subscribe to these exact topics at QoS 0.
    Subscribe(Vec<String>),
    /// Publish at QoS 0.
    Publish {
        /// Destination topic.
        topic: String,
        /// Message body.
        payload: Bytes,
    },
    /// Disconnect gracefully and end the session.
    Close,
}

/// Notification from an open session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The broker accepted the session.
    Connected,
    /// An inbound application message.
    Message {
        /// Topic the message arrived on.
        topic: String,
        /// Raw payload.
        payload: Bytes,
    },
    /// The session failed. No further events follow.
    Error(TransportError),
    /// The session ended. No further events follow.
    Closed,
}

/// Channels of one open session.
///
/// Dropping the command sender ends the session.
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound instructions.
    pub commands: mpsc::Sender<TransportCommand>,
    /// Inbound notifications.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens sessions against the device gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one session with a freshly signed URL.
    ///
    /// Returning `Ok` only means the session was started; the broker's
    /// acceptance arrives later as [`TransportEvent::Connected`].
    async fn open(
        &self,
        url: &SignedUrl,
        client_id: &ClientId,
    ) -> Result<TransportLink, TransportError>;
}
