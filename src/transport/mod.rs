// NATS transport binding

pub mod topic;


use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream};
use serde::Deserialize;
use tracing::info;

/// Transport configuration
#[derive(Clone, Debug, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_command_stream")]
    pub command_stream: String,
    #[serde(default = "default_command_subjects")]
    pub command_subjects: Vec<String>,
}

fn default_url() -> String {
    std::env::var("FLEETLINK_NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_command_stream() -> String {
    "FLEET_COMMANDS".to_string()
}

fn default_command_subjects() -> Vec<String> {
    vec!["*.s2r.>".to_string()]
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            command_stream: default_command_stream(),
            command_subjects: default_command_subjects(),
        }
    }
}

/// Live NATS session.
///
/// Telemetry uses core NATS subscriptions (the transport is allowed to drop
/// messages); outbound commands go through JetStream so every publish is
/// acknowledged (at-least-once hint).
#[derive(Clone)]
pub struct Transport {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl Transport {
    /// Connect and ensure the command stream exists.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to NATS");

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        let transport = Self { client, jetstream };
        transport.ensure_command_stream(config).await?;

        Ok(transport)
    }

    /// Ensure the JetStream stream backing outbound commands exists.
    async fn ensure_command_stream(&self, config: &TransportConfig) -> Result<()> {
        if self.jetstream.get_stream(&config.command_stream).await.is_ok() {
            return Ok(());
        }

        info!(stream = %config.command_stream, "Creating command stream");

        let stream_config = stream::Config {
            name: config.command_stream.clone(),
            subjects: config.command_subjects.clone(),
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .context("Failed to create command stream")?;

        Ok(())
    }

    /// Subscribe to a topic pattern (slash/`+` form).
    pub async fn subscribe(&self, pattern: &str) -> Result<async_nats::Subscriber> {
        let subject = topic::to_subject(pattern);
        self.client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to '{}'", subject))
    }

    /// Publish an outbound command with an acknowledged JetStream publish.
    pub async fn publish_command(
        &self,
        topic: &str,
        headers: async_nats::HeaderMap,
        payload: Vec<u8>,
    ) -> Result<()> {
        let subject = topic::to_subject(topic);
        self.jetstream
            .publish_with_headers(subject.clone(), headers, payload.into())
            .await
            .with_context(|| format!("Failed to publish command to '{}'", subject))?
            .await
            .context("Failed to await command publish ack")?;
        Ok(())
    }
}
