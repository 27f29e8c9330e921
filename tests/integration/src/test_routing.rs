//! Inbound message routing integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use iotdash_model::DeviceMessage;
    use iotdash_mqtt::{ConnectionState, TopicRouter, TransportEvent};
    use parking_lot::Mutex;

    use crate::{
        SequenceCredentialSource, StubTransport, credentials_with_token, orchestrator,
        wait_for_state, wait_until,
    };

    type Inbox = Arc<Mutex<Vec<DeviceMessage>>>;

    fn recording_router() -> (TopicRouter, Inbox, Inbox) {
        let energy: Inbox = Arc::default();
        let lock: Inbox = Arc::default();
        let energy_inbox = Arc::clone(&energy);
        let lock_inbox = Arc::clone(&lock);
        let router = TopicRouter::new()
            .route("cloud/esp32", move |message: &DeviceMessage| {
                energy_inbox.lock().push(message.clone());
            })
            .route("myesplock", move |message: &DeviceMessage| {
                lock_inbox.lock().push(message.clone());
            });
        (router, energy, lock)
    }

    fn message(topic: &str, payload: &'static [u8]) -> TransportEvent {
        TransportEvent::Message {
            topic: topic.to_owned(),
            payload: Bytes::from_static(payload),
        }
    }

    #[tokio::test]
    async fn test_should_route_by_exact_topic() {
        let (router, energy, lock) = recording_router();
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, router);

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        let session = transport.next_session().await;

        session
            .events
            .send(message(
                "myesplock",
                br#"{"cardID":"04A1B2","status":"granted","owner":"Ana"}"#,
            ))
            .await
            .unwrap();
        wait_until("lock event handled", || lock.lock().len() == 1).await;

        assert!(energy.lock().is_empty());
        assert!(matches!(
            lock.lock()[0],
            DeviceMessage::DoorLock(ref event) if event.card_id == "04A1B2"
        ));
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_drop_undecodable_payload_without_state_change() {
        let (router, energy, _lock) = recording_router();
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, router);

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        let session = transport.next_session().await;

        session.events.send(message("cloud/esp32", b"{not json")).await.unwrap();
        session
            .events
            .send(message(
                "cloud/esp32",
                br#"{"timestamp":1700000000,"temperature":26.0,"humidity":58.0,"voltage":230.1,"current":0.5,"power":115.0}"#,
            ))
            .await
            .unwrap();
        wait_until("energy reading handled", || energy.lock().len() == 1).await;

        assert!(matches!(energy.lock()[0], DeviceMessage::Energy(_)));
        assert_eq!(orchestrator.state(), ConnectionState::Connected);
        assert_eq!(transport.open_count(), 1);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_should_drop_messages_on_unrouted_topics() {
        let (router, energy, lock) = recording_router();
        let source = SequenceCredentialSource::always(credentials_with_token("token-1"));
        let transport = StubTransport::new();
        let orchestrator = orchestrator(&source, &transport, router);

        orchestrator.start();
        wait_for_state(&orchestrator, ConnectionState::Connected).await;
        let session = transport.next_session().await;

        session
            .events
            .send(message("mykitchen/gas", br#"{"status":"Safe","gasLevel":120}"#))
            .await
            .unwrap();
        session
            .events
            .send(message("cloud/esp32/extra", br#"{"power":1}"#))
            .await
            .unwrap();
        session
            .events
            .send(message(
                "myesplock",
                br#"{"cardID":"FF00","status":"denied"}"#,
            ))
            .await
            .unwrap();
        wait_until("lock event handled", || lock.lock().len() == 1).await;

        // Events are handled in order, so the earlier ones were already dropped.
        assert!(energy.lock().is_empty());
        assert_eq!(orchestrator.state(), ConnectionState::Connected);
        orchestrator.stop().await;
    }
}
