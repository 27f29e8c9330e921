//! Connection lifecycle integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use iotdash_model::Command;
    use iotdash_mqtt::{
        ConnectionError, ConnectionState, TopicRouter, TransportCommand, TransportEvent,
    };

    use crate::{
        RECONNECT_PERIOD, SequenceCredentialSource, StubTransport, credentials_with_token,
        orchestrator, test_topics, wait_for_state, wait_until,
    };

    #[tokio::test]
    async fn test_should_connect_subscribe_and_stop() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());
        assert_eq!(orchestrator.state(), ConnectionState::Idle);

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;

        let mut session = transport.next_session().await;
        assert_eq!(
            session.commands.recv().await,
            Some(TransportCommand::Subscribe(test_topics()))
        );
        assert!(session.client_id.as_str().starts_with("mqtt_"));
        assert_eq!(session.url.query_param("X-Amz-Security-Token"), Some("token-1"));

        orchestrator.stop().await;
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
        assert!(matches!(
            session.commands.recv().await,
            Some(TransportCommand::Close) | None
        ));
    }

    #[tokio::test]
    async fn test_should_publish_only_while_connected() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        let command = Command::Garden { on: true };
        assert_eq!(
            orchestrator.send_command(&command),
            Err(ConnectionError::NotConnected)
        );

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        let mut session = transport.next_session().await;
        let _subscribe = session.commands.recv().await;

        orchestrator.send_command(&command).unwrap();
        assert_eq!(
            session.commands.recv().await,
            Some(TransportCommand::Publish {
                topic: "smartgarden/control".to_owned(),
                payload: Bytes::from_static(br#"{"relay":1}"#),
            })
        );

        orchestrator.stop().await;
        assert_eq!(
            orchestrator.publish("smart/3lighting", Bytes::from_static(br#"{"relay1":1}"#)),
            Err(ConnectionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_should_ignore_start_while_running() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        orchestrator.start();
        tokio::time::sleep(RECONNECT_PERIOD * 5).await;

        assert_eq!(transport.open_count(), 1);
        assert_eq!(orchestrator.state(), ConnectionState::Connected);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_reconnect_with_fresh_credentials_after_connection_loss() {
        let source = SequenceCredentialSource::new(vec![
            Ok(credentials_with_token("token-1")),
            Ok(credentials_with_token("token-2")),
        ]);
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        let first = transport.next_session().await;

        first.events.send(TransportEvent::Closed).await.unwrap();
        let second = transport.next_session().await;
        wait_for_state(&orchestrator, ConnectionState::Connected).await;

        assert_eq!(source.fetches(), 2);
        assert_eq!(second.url.query_param("X-Amz-Security-Token"), Some("token-2"));
        assert_ne!(first.client_id, second.client_id);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_release_previous_session_before_reconnecting() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        let mut first = transport.next_session().await;
        let _subscribe = first.commands.recv().await;

        first
            .events
            .send(TransportEvent::Error(iotdash_mqtt::TransportError::WebSocket(
                "connection reset".to_owned(),
            )))
            .await
            .unwrap();

        // The orchestrator drops its end of the first session.
        assert_eq!(first.commands.recv().await, None);
        wait_until("second session opened", || transport.open_count() == 2).await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_not_reconnect_after_stop_during_backoff() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        transport.refuse_all(true);
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Reconnecting).await;
        orchestrator.stop().await;
        let attempts = transport.open_count();

        tokio::time::sleep(RECONNECT_PERIOD * 10).await;
        assert_eq!(transport.open_count(), attempts);
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_should_keep_retrying_while_transport_refuses() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        transport.refuse_all(true);
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_until("three attempts", || transport.open_count() >= 3).await;
        assert!(source.fetches() >= 3);

        transport.refuse_all(false);
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_restart_after_stop() {
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, TopicRouter::new());

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        orchestrator.stop().await;

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        assert_eq!(transport.open_count(), 2);
        orchestrator.stop().await;
    }
}
