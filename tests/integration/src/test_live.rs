//! Tests against a real AWS IoT device gateway.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use iotdash_auth::{CognitoCredentialSource, CredentialSource, StaticCredentialSource};
    use iotdash_core::DashboardConfig;
    use iotdash_mqtt::{
        ConnectionOrchestrator, ConnectionState, OrchestratorConfig, TopicRouter,
        WebSocketTransport,
    };

    use crate::init_tracing;

    #[tokio::test]
    #[ignore = "requires AWS IoT endpoint and credentials"]
    async fn test_should_connect_to_live_gateway() {
        init_tracing();
        let config = DashboardConfig::from_env();
        config.validate().expect("IOT_ENDPOINT must be set");
        let source = StaticCredentialSource::from_env().expect("AWS credentials must be set");

        let orchestrator = ConnectionOrchestrator::new(
            OrchestratorConfig::from(&config),
            Arc::new(source),
            Arc::new(WebSocketTransport::new(Duration::from_secs(30))),
            TopicRouter::new(),
        );
        orchestrator.start();

        let mut states = orchestrator.watch_state();
        tokio::time::timeout(
            Duration::from_secs(30),
            states.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await
        .expect("connected within 30 seconds")
        .expect("state channel open");

        orchestrator.stop().await;
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    #[ignore = "requires a Cognito identity pool"]
    async fn test_should_issue_fresh_cognito_credentials() {
        init_tracing();
        let config = DashboardConfig::from_env();
        let pool = config
            .identity_pool_id
            .clone()
            .expect("IDENTITY_POOL_ID must be set");
        let source = CognitoCredentialSource::new(config.region.as_str(), pool);

        let first = source.fetch().await.expect("first credential set");
        let second = source.fetch().await.expect("second credential set");
        assert!(first.session_token().is_some());
        assert_ne!(first.session_token(), second.session_token());
        assert!(!first.is_expired_at(chrono::Utc::now()));
    }
}
