//! Connection lifecycle.
//!
//! One supervisor task per [`ConnectionOrchestrator::start`] owns the whole
//! lifecycle. Each attempt fetches fresh credentials, signs a new URL with
//! the current time, opens the transport, and subscribes once the broker
//! accepts the session. Any loss of the session waits out the reconnect
//! period and starts a new attempt from scratch. Signed URLs are never
//! reused.
//!
//! Stopping is a `watch` flag every await point listens to, so a pending
//! reconnect sleep is cancelled rather than left to fire.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use iotdash_auth::{CredentialSource, Credentials, presign};
use iotdash_core::{AwsRegion, ClientId, DashboardConfig};
use iotdash_model::Command;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::error::ConnectionError;
use crate::router::TopicRouter;
use crate::state::ConnectionState;
use crate::transport::{Transport, TransportCommand, TransportEvent, TransportLink};

/// Settings for a [`ConnectionOrchestrator`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct OrchestratorConfig {
    /// Device gateway host.
    #[builder(setter(into))]
    pub host: String,

    /// Request path.
    #[builder(default = String::from("/mqtt"), setter(into))]
    pub path: String,

    /// Region for the credential scope.
    #[builder(default)]
    pub region: AwsRegion,

    /// Service for the credential scope.
    #[builder(default = String::from("iotdevicegateway"), setter(into))]
    pub service: String,

    /// Topics subscribed after every successful connect.
    #[builder(default)]
    pub topics: Vec<String>,

    /// Delay between a lost session and the next attempt.
    #[builder(default = Duration::from_secs(5))]
    pub reconnect_period: Duration,

    /// Prefix for the per-attempt client identifier.
    #[builder(default = String::from(ClientId::DEFAULT_PREFIX), setter(into))]
    pub client_id_prefix: String,
}

impl From<&DashboardConfig> for OrchestratorConfig {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            host: config.iot_endpoint.clone(),
            path: config.mqtt_path.clone(),
            region: config.region.clone(),
            service: config.service_name.clone(),
            topics: config.topics.clone(),
            reconnect_period: config.reconnect_period(),
            client_id_prefix: config.client_id_prefix.clone(),
        }
    }
}

/// Keeps one authenticated MQTT session alive.
///
/// Must be started from within a Tokio runtime.
pub struct ConnectionOrchestrator {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

struct Shared {
    config: OrchestratorConfig,
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<dyn Transport>,
    router: TopicRouter,
    state: watch::Sender<ConnectionState>,
    /// Command channel of the current session, present only while connected.
    link: Mutex<Option<mpsc::Sender<TransportCommand>>>,
}

struct Supervisor {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// How an attempt ended.
enum Outcome {
    Stopped,
    Lost,
    Fatal,
}

impl ConnectionOrchestrator {
    /// Create an idle orchestrator.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        credentials: Arc<dyn CredentialSource>,
        transport: Arc<dyn Transport>,
        router: TopicRouter,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                credentials,
                transport,
                router,
                state,
                link: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Begin connecting. A no-op while a lifecycle is already running;
    /// restarts from `Failed`.
    pub fn start(&self) {
        let mut supervisor = self.supervisor.lock();
        if let Some(existing) = supervisor.as_ref() {
            if !existing.handle.is_finished() && self.state() != ConnectionState::Failed {
                debug!("Connection lifecycle already running");
                return;
            }
        }
        if let Some(previous) = supervisor.take() {
            previous.handle.abort();
        }

        info!(host = %self.shared.config.host, "Starting connection lifecycle");
        let (stop, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(shared.run(stop_rx));
        *supervisor = Some(Supervisor { stop, handle });
    }

    /// Close the session, cancel any pending reconnect, and return to `Idle`.
    ///
    /// Once this returns no further connection attempt is made until the
    /// next [`start`](Self::start).
    pub async fn stop(&self) {
        let supervisor = self.supervisor.lock().take();
        if let Some(Supervisor { stop, handle }) = supervisor {
            let _ = stop.send(true);
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "Connection supervisor panicked");
                }
            }
        }
        self.shared.link.lock().take();
        self.shared.set_state(ConnectionState::Idle);
        info!("Connection lifecycle stopped");
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Whether the session is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Publish at QoS 0 on the current session.
    ///
    /// Rejected with [`ConnectionError::NotConnected`] in any state other than
    /// `Connected`. Nothing is queued for a later session.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        let link = self.shared.link.lock();
        let commands = link.as_ref().ok_or(ConnectionError::NotConnected)?;
        commands
            .try_send(TransportCommand::Publish {
                topic: topic.to_owned(),
                payload: payload.into(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ConnectionError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => ConnectionError::NotConnected,
            })
    }

    /// Publish a device command on its topic.
    pub fn send_command(&self, command: &Command) -> Result<(), ConnectionError> {
        debug!(%command, "Publishing command");
        self.publish(command.topic().as_str(), command.payload())
    }
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .field("router", &self.shared.router)
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionOrchestrator {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.handle.abort();
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.attempt(attempt, &mut stop).await {
                Outcome::Stopped => return,
                Outcome::Fatal => {
                    self.set_state(ConnectionState::Failed);
                    return;
                }
                Outcome::Lost => {}
            }

            self.set_state(ConnectionState::Reconnecting);
            info!(
                delay_ms = self.config.reconnect_period.as_millis(),
                "Reconnecting after delay"
            );
            tokio::select! {
                biased;
                () = stopped(&mut stop) => return,
                () = tokio::time::sleep(self.config.reconnect_period) => {}
            }
        }
    }

    async fn attempt(&self, attempt: u64, stop: &mut watch::Receiver<bool>) -> Outcome {
        self.set_state(ConnectionState::Connecting);

        let credentials = tokio::select! {
            biased;
            () = stopped(stop) => return Outcome::Stopped,
            result = self.credentials.fetch() => match result {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!(error = %e, "Failed to obtain credentials, not retrying");
                    return Outcome::Fatal;
                }
            },
        };

        let now = Utc::now();
        if credentials.is_expired_at(now) {
            error!(
                expires_at = %credentials.expires_at(),
                "Credential source returned expired credentials, not retrying"
            );
            return Outcome::Fatal;
        }

        let config = &self.config;
        let url = match presign(
            &config.host,
            &config.path,
            config.region.as_str(),
            &config.service,
            &credentials,
            now,
        ) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Failed to sign connection URL, not retrying");
                return Outcome::Fatal;
            }
        };

        let client_id = ClientId::generate(&config.client_id_prefix);
        info!(attempt, host = %config.host, %client_id, "Opening connection");

        let link = tokio::select! {
            biased;
            () = stopped(stop) => return Outcome::Stopped,
            result = self.transport.open(&url, &client_id) => match result {
                Ok(link) => link,
                Err(e) => {
                    warn!(error = %e, "Failed to open connection");
                    return Outcome::Lost;
                }
            },
        };

        let outcome = self.drive(link, &credentials, stop).await;
        self.link.lock().take();
        outcome
    }

    /// Pump transport events until the session ends.
    async fn drive(
        &self,
        link: TransportLink,
        credentials: &Credentials,
        stop: &mut watch::Receiver<bool>,
    ) -> Outcome {
        let TransportLink {
            commands,
            mut events,
        } = link;
        let expiry = tokio::time::sleep(until(credentials.expires_at()));
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                () = stopped(stop) => {
                    let _ = commands.try_send(TransportCommand::Close);
                    return Outcome::Stopped;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        let topics = self.config.topics.clone();
                        if commands.send(TransportCommand::Subscribe(topics)).await.is_err() {
                            warn!("Session ended before subscribing");
                            return Outcome::Lost;
                        }
                        *self.link.lock() = Some(commands.clone());
                        self.set_state(ConnectionState::Connected);
                        info!(topics = ?self.config.topics, "Connected and subscribed");
                    }
                    Some(TransportEvent::Message { topic, payload }) => {
                        self.handle_message(&topic, &payload);
                    }
                    Some(TransportEvent::Error(e)) => {
                        warn!(error = %e, "Connection error");
                        return Outcome::Lost;
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!("Connection closed");
                        return Outcome::Lost;
                    }
                },
                () = &mut expiry => {
                    info!("Credentials expired, re-signing");
                    let _ = commands.try_send(TransportCommand::Close);
                    return Outcome::Lost;
                }
            }
        }
    }

    fn handle_message(&self, topic: &str, payload: &[u8]) {
        match iotdash_model::decode(topic, payload) {
            Ok(message) => {
                let handlers = self.router.dispatch(topic, &message);
                debug!(topic, handlers, "Dispatched message");
            }
            Err(e) => warn!(topic, error = %e, "Dropping undecodable message"),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = %current, to = %next, "Connection state changed");
            *current = next;
            true
        });
    }
}

/// Resolves once stop is requested or the orchestrator is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

fn until(deadline: DateTime<Utc>) -> Duration {
    (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
