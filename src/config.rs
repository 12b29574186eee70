//! Configuration types for dlhub

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OrchestratorConfig {
    /// Concurrency used when a caller does not pick one (default: 3)
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// How long to wait for in-flight work after cancellation before
    /// aborting it, in seconds (default: 5)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Broadcast hub configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HubConfig {
    /// Capacity of the hub's command queue; publishes beyond it are dropped (default: 1000)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of each subscriber's outbound queue; a subscriber whose queue
    /// is full is disconnected (default: 256)
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Progress aggregator configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AggregatorConfig {
    /// Buffer between reporting workers and the forwarding task (default: 1024)
    #[serde(default = "default_aggregator_buffer")]
    pub buffer: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            buffer: default_aggregator_buffer(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration
///
/// Every field has a default, so `Config::default()` and `{}` both describe a
/// working setup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Worker pool settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Broadcast hub settings
    #[serde(default)]
    pub hub: HubConfig,

    /// Progress aggregator settings
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Check that every capacity is usable
    ///
    /// Tokio channels panic on a zero capacity, so zeros are rejected here
    /// rather than at spawn time.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("orchestrator.default_concurrency", self.orchestrator.default_concurrency),
            ("hub.queue_capacity", self.hub.queue_capacity),
            ("hub.subscriber_buffer", self.hub.subscriber_buffer),
            ("aggregator.buffer", self.aggregator.buffer),
        ];

        for (key, value) in checks {
            if value == 0 {
                return Err(Error::Config {
                    message: format!("{key} must be greater than zero"),
                    key: Some(key.to_string()),
                });
            }
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    3
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_aggregator_buffer() -> usize {
    1024
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
