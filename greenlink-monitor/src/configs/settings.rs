use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use greenlink_api::{AlertThresholds, RetryPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logger {
    pub level: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where to find the greenhouse controller. The default endpoint list is
/// fixed at startup; a custom endpoint set at runtime is tried first until
/// it fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub default_endpoints: Vec<String>,
    pub websocket_port: u16,
    pub custom_endpoint: Option<String>,
    /// Targets without an on-board controller have nothing to poll.
    pub monitorable: bool,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            default_endpoints: vec![
                "192.168.0.100".to_string(),
                "192.168.1.100".to_string(),
                "192.168.4.1".to_string(),
            ],
            websocket_port: 81,
            custom_endpoint: None,
            monitorable: true,
        }
    }
}

/// Backend proxy reached over plain HTTP when the live channel is down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxy {
    pub base_url: String,
}

impl Default for Proxy {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api/greenhouse".to_string(),
        }
    }
}

/// Every timing constant the client uses, named and overridable instead of
/// hard-coded at call sites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub connect_timeout_ms: u64,
    pub candidate_retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub liveness_timeout_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
    pub poll_interval_ms: u64,
    pub poll_backoff_base_ms: u64,
    pub poll_backoff_max_ms: u64,
    pub poll_max_retries: u32,
    pub http_timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            candidate_retry_delay_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            liveness_timeout_ms: 60_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            reconnect_max_attempts: 5,
            poll_interval_ms: 2_000,
            poll_backoff_base_ms: 2_000,
            poll_backoff_max_ms: 10_000,
            poll_max_retries: 2,
            http_timeout_ms: 13_000,
        }
    }
}

impl Timing {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn candidate_retry_delay(&self) -> Duration {
        Duration::from_millis(self.candidate_retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.reconnect_max_attempts,
        )
    }

    pub fn poll_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.poll_backoff_base_ms),
            Duration::from_millis(self.poll_backoff_max_ms),
            self.poll_max_retries,
        )
    }
}

/// Retention caps for the in-memory telemetry series and alert panel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
    pub history_capacity: usize,
    pub alert_capacity: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            alert_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logger: Logger,
    pub device: Device,
    pub proxy: Proxy,
    pub timing: Timing,
    pub retention: Retention,
    pub thresholds: AlertThresholds,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::default().separator("_"))
            .build()?
            .try_deserialize()
    }
}
