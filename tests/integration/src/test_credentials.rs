//! Credential and signing integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use iotdash_auth::{CredentialError, Credentials, StaticCredentialSource};
    use iotdash_mqtt::{ConnectionOrchestrator, ConnectionState, TopicRouter, TransportCommand};

    use crate::{
        RECONNECT_PERIOD, SequenceCredentialSource, StubTransport, credentials_with_token,
        init_tracing, orchestrator, record_states, test_config, test_topics, wait_for_state,
    };

    #[tokio::test]
    async fn test_should_resign_with_fresh_credentials_after_rejection() {
        let source = SequenceCredentialSource::new(vec![
            Ok(credentials_with_token("expired-1")),
            Ok(credentials_with_token("fresh-2")),
        ]);
        let transport = StubTransport::new();
        transport.reject_token("expired-1");
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());
        let states = record_states(&orchestrator);

        orchestrator.start();
        let session = transport.next_session().await;
        wait_for_state(&orchestrator, ConnectionState::Connected).await;

        let opened = transport.opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[0].query_param("X-Amz-Security-Token"), Some("expired-1"));
        assert_eq!(opened[1].query_param("X-Amz-Security-Token"), Some("fresh-2"));
        assert_ne!(opened[0].as_str(), opened[1].as_str());
        assert_eq!(session.url, opened[1]);
        assert!(states.lock().contains(&ConnectionState::Reconnecting));

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_fail_without_retry_when_credentials_unavailable() {
        let source = SequenceCredentialSource::new(vec![
            Err(CredentialError::Provider("identity pool unavailable".to_owned())),
            Ok(credentials_with_token("token-2")),
        ]);
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Failed).await;
        tokio::time::sleep(RECONNECT_PERIOD * 10).await;

        assert_eq!(orchestrator.state(), ConnectionState::Failed);
        assert_eq!(source.fetches(), 1);
        assert_eq!(transport.open_count(), 0);

        // A new start() begins a fresh lifecycle.
        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        assert_eq!(source.fetches(), 2);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_fail_when_credentials_cannot_be_signed() {
        let source = SequenceCredentialSource::always(Credentials::new("AKIDEXAMPLE", ""));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Failed).await;
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_should_reconnect_when_credentials_expire_while_connected() {
        let short_lived = credentials_with_token("short-1")
            .with_expiry(Utc::now() + chrono::Duration::milliseconds(150));
        let source = SequenceCredentialSource::new(vec![
            Ok(short_lived),
            Ok(credentials_with_token("long-2")),
        ]);
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        let mut first = transport.next_session().await;
        assert_eq!(
            first.commands.recv().await,
            Some(TransportCommand::Subscribe(test_topics()))
        );
        assert_eq!(first.commands.recv().await, Some(TransportCommand::Close));

        let second = transport.next_session().await;
        assert_eq!(second.url.query_param("X-Amz-Security-Token"), Some("long-2"));
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_sign_each_attempt_independently() {
        let source = SequenceCredentialSource::new(vec![
            Ok(credentials_with_token("token-1")),
            Ok(credentials_with_token("token-2")),
            Ok(credentials_with_token("token-3")),
        ]);
        let transport = StubTransport::new();
        transport.reject_token("token-1");
        transport.reject_token("token-2");
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;

        let tokens: Vec<String> = transport
            .opened()
            .iter()
            .filter_map(|url| url.query_param("X-Amz-Security-Token").map(ToOwned::to_owned))
            .collect();
        assert_eq!(tokens, vec!["token-1", "token-2", "token-3"]);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_fail_instead_of_signing_expired_credentials() {
        let stale = credentials_with_token("stale-1")
            .with_expiry(Utc::now() - chrono::Duration::hours(1));
        let source = SequenceCredentialSource::always(stale);
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Failed).await;
        tokio::time::sleep(RECONNECT_PERIOD * 10).await;

        assert_eq!(orchestrator.state(), ConnectionState::Failed);
        assert_eq!(source.fetches(), 1);
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_should_fail_when_static_credentials_lapse_while_connected() {
        init_tracing();
        let short_lived = credentials_with_token("short-1")
            .with_expiry(Utc::now() + chrono::Duration::milliseconds(150));
        let transport = StubTransport::new();
        let orchestrator = ConnectionOrchestrator::new(
            test_config(),
            Arc::new(StaticCredentialSource::new(short_lived)),
            Arc::clone(&transport) as Arc<dyn iotdash_mqtt::Transport>,
            TopicRouter::new(),
        );
        let states = record_states(&orchestrator);

        orchestrator.start();
        let mut session = transport.next_session().await;
        assert_eq!(
            session.commands.recv().await,
            Some(TransportCommand::Subscribe(test_topics()))
        );
        assert_eq!(session.commands.recv().await, Some(TransportCommand::Close));
        wait_for_state(&orchestrator, ConnectionState::Failed).await;
        tokio::time::sleep(RECONNECT_PERIOD * 10).await;

        assert_eq!(orchestrator.state(), ConnectionState::Failed);
        assert_eq!(transport.open_count(), 1);
        assert!(states.lock().contains(&ConnectionState::Connected));
    }
}
