//! Integration tests for the iotdash connection lifecycle.
//!
//! Most tests drive a [`ConnectionOrchestrator`] against an in-memory
//! [`StubTransport`] and a scripted [`SequenceCredentialSource`], so they run
//! with plain `cargo test`. Tests that need a real AWS IoT endpoint are
//! marked `#[ignore]`.
//!
//! Run those with:
//! ```text
//! IOT_ENDPOINT=... AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=... \
//!     cargo test -p iotdash-integration -- --ignored
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use iotdash_auth::{CredentialError, CredentialSource, Credentials, SignedUrl};
use iotdash_core::ClientId;
use iotdash_mqtt::{
    ConnectionOrchestrator, ConnectionState, OrchestratorConfig, TopicRouter, Transport,
    TransportCommand, TransportError, TransportEvent, TransportLink,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

static INIT: Once = Once::new();

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Reconnect period used by the stubbed tests.
pub const RECONNECT_PERIOD: Duration = Duration::from_millis(20);

/// Upper bound for any single wait in a test.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Topics every stubbed orchestrator subscribes to.
#[must_use]
pub fn test_topics() -> Vec<String> {
    vec!["cloud/esp32".to_owned(), "myesplock".to_owned()]
}

/// Orchestrator settings for the stubbed tests.
#[must_use]
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig::builder()
        .host("a1b2c3-ats.iot.us-east-1.amazonaws.com")
        .topics(test_topics())
        .reconnect_period(RECONNECT_PERIOD)
        .build()
}

/// Credentials carrying `token` as the session token.
#[must_use]
pub fn credentials_with_token(token: &str) -> Credentials {
    Credentials::new("ASIAEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
        .with_session_token(token)
}

/// Create an orchestrator over the given stubs.
#[must_use]
pub fn orchestrator(
    source: &Arc<SequenceCredentialSource>,
    transport: &Arc<StubTransport>,
    router: TopicRouter,
) -> ConnectionOrchestrator {
    init_tracing();
    ConnectionOrchestrator::new(
        test_config(),
        Arc::clone(source) as Arc<dyn CredentialSource>,
        Arc::clone(transport) as Arc<dyn Transport>,
        router,
    )
}

/// Wait until the orchestrator reaches `state`.
pub async fn wait_for_state(orchestrator: &ConnectionOrchestrator, state: ConnectionState) {
    let mut states = orchestrator.watch_state();
    tokio::time::timeout(WAIT_LIMIT, states.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}, still {}", orchestrator.state()))
        .expect("state channel closed");
}

/// Record every state the orchestrator publishes from now on.
#[must_use]
pub fn record_states(orchestrator: &ConnectionOrchestrator) -> Arc<Mutex<Vec<ConnectionState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut states = orchestrator.watch_state();
    let recorder = Arc::clone(&seen);
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            recorder.lock().push(state);
        }
    });
    seen
}

/// Poll `condition` until it holds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting until {what}"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Credential source that replays a script, then repeats its last entry.
#[derive(Debug)]
pub struct SequenceCredentialSource {
    script: Mutex<VecDeque<Result<Credentials, CredentialError>>>,
    last: Mutex<Option<Result<Credentials, CredentialError>>>,
    fetches: Mutex<usize>,
}

impl SequenceCredentialSource {
    /// Create a source that returns `script` in order.
    #[must_use]
    pub fn new(script: Vec<Result<Credentials, CredentialError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            fetches: Mutex::new(0),
        })
    }

    /// Create a source that always returns `credentials`.
    #[must_use]
    pub fn always(credentials: Credentials) -> Arc<Self> {
        Self::new(vec![Ok(credentials)])
    }

    /// Number of `fetch` calls so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }
}

#[async_trait]
impl CredentialSource for SequenceCredentialSource {
    async fn fetch(&self) -> Result<Credentials, CredentialError> {
        *self.fetches.lock() += 1;
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(CredentialError::Provider("empty script".to_owned())))
    }
}

/// One session opened on a [`StubTransport`], seen from the broker side.
#[derive(Debug)]
pub struct StubSession {
    /// The URL the session was opened with.
    pub url: SignedUrl,
    /// The client identifier the session was opened with.
    pub client_id: ClientId,
    /// Commands the orchestrator sent.
    pub commands: mpsc::Receiver<TransportCommand>,
    /// Inject events into the orchestrator.
    pub events: mpsc::Sender<TransportEvent>,
}

/// In-memory [`Transport`].
///
/// Accepts every session (emitting `Connected` straight away) unless the
/// URL's security token is in the rejected set or the transport is refusing.
#[derive(Debug, Default)]
pub struct StubTransport {
    opened: Mutex<Vec<SignedUrl>>,
    sessions: Mutex<VecDeque<StubSession>>,
    rejected_tokens: Mutex<HashSet<String>>,
    refusing: Mutex<bool>,
}

impl StubTransport {
    /// Create an accepting transport.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject any URL signed with this session token.
    pub fn reject_token(&self, token: &str) {
        self.rejected_tokens.lock().insert(token.to_owned());
    }

    /// Refuse every open.
    pub fn refuse_all(&self, refusing: bool) {
        *self.refusing.lock() = refusing;
    }

    /// Every URL passed to `open`, accepted or not.
    #[must_use]
    pub fn opened(&self) -> Vec<SignedUrl> {
        self.opened.lock().clone()
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Take the oldest accepted session not yet taken.
    pub async fn next_session(&self) -> StubSession {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            if let Some(session) = self.sessions.lock().pop_front() {
                return session;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for a session"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn open(
        &self,
        url: &SignedUrl,
        client_id: &ClientId,
    ) -> Result<TransportLink, TransportError> {
        self.opened.lock().push(url.clone());

        if *self.refusing.lock() {
            return Err(TransportError::Connect("connection refused".to_owned()));
        }
        if let Some(token) = url.query_param("X-Amz-Security-Token") {
            if self.rejected_tokens.lock().contains(token) {
                return Err(TransportError::Rejected("handshake returned 403 Forbidden".to_owned()));
            }
        }

        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        event_tx
            .try_send(TransportEvent::Connected)
            .expect("fresh channel has capacity");
        self.sessions.lock().push_back(StubSession {
            url: url.clone(),
            client_id: client_id.clone(),
            commands: command_rx,
            events: event_tx,
        });

        Ok(TransportLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}

mod test_credentials;
mod test_lifecycle;
mod test_live;
mod test_routing;
