//! MQTT over WebSocket connection lifecycle for iotdash.
//!
//! The [`ConnectionOrchestrator`] keeps a single authenticated session to the
//! device gateway alive. Every attempt signs a fresh URL with fresh
//! credentials, and inbound messages are decoded and handed to a
//! [`TopicRouter`] by exact topic match.
//!
//! # Modules
//!
//! - [`codec`] - MQTT 3.1.1 packet encoding and decoding
//! - [`error`] - Codec, transport and connection error types
//! - [`orchestrator`] - Connection state machine and reconnect policy
//! - [`router`] - Exact-match topic routing
//! - [`state`] - Connection lifecycle states
//! - [`transport`] - The [`Transport`] trait and its channel types
//! - [`websocket`] - `tokio-tungstenite` backed [`Transport`]

pub mod codec;
pub mod error;
pub mod orchestrator;
pub mod router;
pub mod state;
pub mod transport;
pub mod websocket;

pub use error::{CodecError, ConnectionError, TransportError};
pub use orchestrator::{ConnectionOrchestrator, OrchestratorConfig};
pub use router::{Handler, TopicRouter};
pub use state::ConnectionState;
pub use transport::{Transport, TransportCommand, TransportEvent, TransportLink};
pub use websocket::WebSocketTransport;
