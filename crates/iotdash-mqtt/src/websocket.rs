//! MQTT 3.1.1 over a secure WebSocket.
//!
//! [`WebSocketTransport::open`] performs the upgrade with the `mqtt`
//! subprotocol, sends CONNECT, and hands the socket to a session task. The
//! task owns both halves of the socket and multiplexes inbound frames,
//! outbound commands and the keep-alive timer.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Sink, SinkExt, Stream, StreamExt};
use iotdash_auth::SignedUrl;
use iotdash_core::ClientId;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};

use crate::codec::{Connect, Packet, Publish, SUBACK_FAILURE, Subscribe};
use crate::error::TransportError;
use crate::transport::{Transport, TransportCommand, TransportEvent, TransportLink};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Transport`] backed by `tokio-tungstenite`.
///
/// The keep-alive is advertised in whole seconds. When it rounds to zero the
/// broker is told keep-alive is off, and the session neither pings nor
/// watches for silence.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    keep_alive: Duration,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    /// Create a transport that sends PINGREQ every `keep_alive`.
    #[must_use]
    pub fn new(keep_alive: Duration) -> Self {
        Self {
            keep_alive,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound the WebSocket upgrade and the wait for CONNACK. Defaults to 10 s.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn keep_alive_secs(&self) -> u16 {
        u16::try_from(self.keep_alive.as_secs()).unwrap_or(u16::MAX)
    }

    fn timers(&self) -> SessionTimers {
        let secs = self.keep_alive_secs();
        SessionTimers {
            keep_alive: (secs > 0).then(|| Duration::from_secs(u64::from(secs))),
            connack_timeout: self.connect_timeout,
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        url: &SignedUrl,
        client_id: &ClientId,
    ) -> Result<TransportLink, TransportError> {
        install_crypto_provider();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("mqtt"));

        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "WebSocket upgrade not completed within {:?}",
                    self.connect_timeout
                ))
            })?;
        let (socket, response) = handshake.map_err(|e| match e {
            WsError::Http(response) => {
                TransportError::Rejected(format!("handshake returned {}", response.status()))
            }
            other => TransportError::Connect(other.to_string()),
        })?;
        debug!(
            host = url.host(),
            status = %response.status(),
            "WebSocket upgrade complete"
        );

        let (mut sink, stream) = socket.split();

        let connect = Packet::Connect(Connect {
            client_id: client_id.to_string(),
            keep_alive: self.keep_alive_secs(),
            clean_session: true,
        })
        .to_bytes()?;
        sink.send(Message::Binary(connect))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        tokio::spawn(run_session(
            sink,
            stream,
            command_rx,
            event_tx,
            self.timers(),
        ));

        Ok(TransportLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}

/// Pick the process-wide rustls backend before the first TLS handshake.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err only when a provider is already installed.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Liveness limits of one session.
#[derive(Debug, Clone, Copy)]
struct SessionTimers {
    /// PINGREQ interval. `None` turns keep-alive off.
    keep_alive: Option<Duration>,
    /// How long the broker has to answer CONNECT.
    connack_timeout: Duration,
}

impl SessionTimers {
    /// Longest silence tolerated from an accepted session.
    fn idle_limit(&self) -> Option<Duration> {
        self.keep_alive.map(|interval| interval * 3 / 2)
    }
}

/// Drive one session until it closes, fails, or the orchestrator lets go.
async fn run_session<S, R>(
    mut sink: S,
    mut stream: R,
    mut commands: mpsc::Receiver<TransportCommand>,
    events: mpsc::Sender<TransportEvent>,
    timers: SessionTimers,
) where
    S: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut session = Session::default();
    let mut read_buf = BytesMut::new();
    let mut ping = timers.keep_alive.map(|interval| {
        let mut ping = tokio::time::interval_at(Instant::now() + interval, interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping
    });
    // Fixed until CONNACK. Afterwards every inbound frame pushes it back.
    let mut deadline = Some(Instant::now() + timers.connack_timeout);

    let final_event = loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Binary(data))) => {
                        read_buf.extend_from_slice(&data);
                        if let Err(event) = session.drain(&mut read_buf, &mut sink, &events).await {
                            break event;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Gateway closed the WebSocket");
                        break Some(TransportEvent::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break Some(TransportEvent::Error(TransportError::WebSocket(e.to_string())));
                    }
                    None => break Some(TransportEvent::Closed),
                }
                if session.connected {
                    deadline = timers.idle_limit().map(|limit| Instant::now() + limit);
                }
            }
            command = commands.recv() => match command {
                Some(command) => {
                    if let Err(event) = session.execute(command, &mut sink).await {
                        break event;
                    }
                }
                // The orchestrator dropped the link.
                None => {
                    disconnect(&mut sink).await;
                    break None;
                }
            },
            () = next_tick(&mut ping), if session.connected => {
                trace!("Sending PINGREQ");
                if let Err(e) = send_packet(&mut sink, &Packet::PingReq).await {
                    break Some(TransportEvent::Error(e));
                }
            }
            () = sleep_until(deadline) => {
                let reason = if session.connected {
                    format!(
                        "nothing received from the gateway for {:?}",
                        timers.idle_limit().unwrap_or_default()
                    )
                } else {
                    format!("no CONNACK within {:?}", timers.connack_timeout)
                };
                warn!(%reason, "Gateway went silent");
                break Some(TransportEvent::Error(TransportError::Timeout(reason)));
            }
        }
    };

    if let Some(event) = final_event {
        let _ = events.send(event).await;
    }
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(ping) => {
            ping.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug)]
struct Session {
    next_packet_id: u16,
    connected: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            next_packet_id: 1,
            connected: false,
        }
    }
}

impl Session {
    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // Packet identifiers are non-zero.
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }

    /// Decode and handle every complete packet in `buf`.
    ///
    /// `Err` carries the session's final event, if any is still owed.
    async fn drain<S>(
        &mut self,
        buf: &mut BytesMut,
        sink: &mut S,
        events: &mpsc::Sender<TransportEvent>,
    ) -> Result<(), Option<TransportEvent>>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        loop {
            let packet = match Packet::decode(buf) {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(e) => return Err(Some(TransportEvent::Error(e.into()))),
            };

            let event = match packet {
                Packet::ConnAck(ack) if ack.return_code == 0 => {
                    self.connected = true;
                    TransportEvent::Connected
                }
                Packet::ConnAck(ack) => {
                    return Err(Some(TransportEvent::Error(TransportError::Rejected(
                        format!("CONNACK return code {}", ack.return_code),
                    ))));
                }
                Packet::Publish(publish) => {
                    if let Some(packet_id) = publish.packet_id {
                        send_packet(sink, &Packet::PubAck { packet_id })
                            .await
                            .map_err(|e| Some(TransportEvent::Error(e)))?;
                    }
                    TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload,
                    }
                }
                Packet::SubAck(ack) => {
                    let refused = ack
                        .return_codes
                        .iter()
                        .filter(|code| **code == SUBACK_FAILURE)
                        .count();
                    if refused > 0 {
                        warn!(packet_id = ack.packet_id, refused, "Gateway refused subscriptions");
                    } else {
                        debug!(packet_id = ack.packet_id, "Subscriptions acknowledged");
                    }
                    continue;
                }
                Packet::PingResp => {
                    trace!("Received PINGRESP");
                    continue;
                }
                other => {
                    debug!(?other, "Ignoring unexpected packet");
                    continue;
                }
            };

            if events.send(event).await.is_err() {
                // Nobody is listening any more.
                disconnect(sink).await;
                return Err(None);
            }
        }
    }

    async fn execute<S>(
        &mut self,
        command: TransportCommand,
        sink: &mut S,
    ) -> Result<(), Option<TransportEvent>>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let packet = match command {
            TransportCommand::Subscribe(topics) => Packet::Subscribe(Subscribe {
                packet_id: self.packet_id(),
                filters: topics.into_iter().map(|topic| (topic, 0)).collect(),
            }),
            TransportCommand::Publish { topic, payload } => Packet::Publish(Publish {
                topic,
                qos: 0,
                retain: false,
                packet_id: None,
                payload,
            }),
            TransportCommand::Close => {
                disconnect(sink).await;
                return Err(Some(TransportEvent::Closed));
            }
        };
        send_packet(sink, &packet)
            .await
            .map_err(|e| Some(TransportEvent::Error(e)))
    }
}

async fn send_packet<S>(sink: &mut S, packet: &Packet) -> Result<(), TransportError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let bytes = packet.to_bytes()?;
    sink.send(Message::Binary(bytes))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}

async fn disconnect<S>(sink: &mut S)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    if let Err(e) = send_packet(sink, &Packet::Disconnect).await {
        debug!(error = %e, "DISCONNECT not delivered");
    }
    let _ = sink.close().await;
}
