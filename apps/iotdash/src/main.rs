//! iotdash - terminal dashboard for a home IoT fleet.
//!
//! Connects to the AWS IoT device gateway over MQTT on a SigV4-signed
//! WebSocket, logs device readings as they arrive, and publishes relay
//! commands typed on stdin.
//!
//! # Usage
//!
//! ```text
//! IOT_ENDPOINT=abc123-ats.iot.us-east-1.amazonaws.com iotdash
//! iotdash --print-url
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IOT_ENDPOINT` | *(required)* | Device gateway host |
//! | `AWS_REGION` | `us-east-1` | Region in the credential scope |
//! | `AWS_ACCESS_KEY_ID` | *(required without pool)* | Access key |
//! | `AWS_SECRET_ACCESS_KEY` | *(required without pool)* | Secret key |
//! | `AWS_SESSION_TOKEN` | *(unset)* | Session token for temporary credentials |
//! | `AWS_CREDENTIAL_EXPIRATION` | *(unset)* | RFC 3339 expiry of temporary credentials |
//! | `IDENTITY_POOL_ID` | *(unset)* | Cognito identity pool; replaces the static keys when set |
//! | `MQTT_TOPICS` | the seven device topics | Comma-separated subscription list |
//! | `RECONNECT_PERIOD_MS` | `5000` | Delay before reconnecting |
//! | `KEEP_ALIVE_SECS` | `30` | MQTT keep-alive interval |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod commands;
mod dashboard;

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use iotdash_auth::{CognitoCredentialSource, CredentialSource, StaticCredentialSource, presign};
use iotdash_core::DashboardConfig;
use iotdash_mqtt::{ConnectionOrchestrator, ConnectionState, OrchestratorConfig, WebSocketTransport};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{HELP, Input, parse_line};
use crate::dashboard::Dashboard;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Cognito when an identity pool is configured, static keys otherwise.
fn credential_source(config: &DashboardConfig) -> Result<Arc<dyn CredentialSource>> {
    if let Some(pool) = &config.identity_pool_id {
        info!(identity_pool = %pool, "Using Cognito identity pool credentials");
        return Ok(Arc::new(CognitoCredentialSource::new(
            config.region.as_str(),
            pool.clone(),
        )));
    }
    let source = StaticCredentialSource::from_env().context("failed to load credentials")?;
    Ok(Arc::new(source))
}

/// Sign one URL with the current credentials and print it.
async fn print_url(config: &DashboardConfig, source: &dyn CredentialSource) -> Result<()> {
    let credentials = source.fetch().await.context("failed to obtain credentials")?;
    let url = presign(
        &config.iot_endpoint,
        &config.mqtt_path,
        config.region.as_str(),
        &config.service_name,
        &credentials,
        Utc::now(),
    )
    .context("failed to sign connection URL")?;
    println!("{url}");
    Ok(())
}

/// Forward stdin lines from a dedicated thread.
///
/// The thread is detached and ends with the process.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Handle operator input until `quit`.
///
/// End of input only stops reading. The dashboard keeps running until a
/// shutdown signal, so it can run detached from a terminal.
async fn command_loop(
    mut lines: mpsc::Receiver<String>,
    orchestrator: &ConnectionOrchestrator,
    dashboard: &Dashboard,
) {
    while let Some(line) = lines.recv().await {
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(Input::Send(command))) => match orchestrator.send_command(&command) {
                Ok(()) => info!(%command, "Command sent"),
                Err(e) => warn!(%command, error = %e, "Command not sent"),
            },
            Ok(Some(Input::Status)) => {
                println!("connection  {}", orchestrator.state());
                println!("{}", dashboard.snapshot());
            }
            Ok(Some(Input::Help)) => println!("{HELP}"),
            Ok(Some(Input::Quit)) => return,
            Err(e) => println!("{e}\n{HELP}"),
        }
    }
    info!("Input closed, running until interrupted");
    std::future::pending::<()>().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = DashboardConfig::from_env();
    init_tracing(&config.log_level)?;
    config.validate().context("invalid configuration")?;

    let source = credential_source(&config)?;

    if std::env::args().any(|a| a == "--print-url") {
        return print_url(&config, source.as_ref()).await;
    }

    let dashboard = Arc::new(Dashboard::default());
    let router = dashboard.router(&config.topics);
    let transport = WebSocketTransport::new(Duration::from_secs(u64::from(config.keep_alive_secs)));
    let orchestrator = ConnectionOrchestrator::new(
        OrchestratorConfig::from(&config),
        source,
        Arc::new(transport),
        router,
    );

    info!(
        endpoint = %config.iot_endpoint,
        region = %config.region,
        topics = config.topics.len(),
        "Starting iotdash"
    );
    orchestrator.start();

    let mut states = orchestrator.watch_state();
    tokio::select! {
        () = command_loop(spawn_stdin_reader(), &orchestrator, &dashboard) => {
            info!("Quit requested");
        }
        _ = states.wait_for(|state| *state == ConnectionState::Failed) => {
            warn!("Connection failed permanently, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    orchestrator.stop().await;
    Ok(())
}
