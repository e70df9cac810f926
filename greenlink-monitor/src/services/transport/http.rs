use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use greenlink_api::{Actuator, DeviceCommand, DevicePayload, SwitchState, parse_status_body};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::configs::{Proxy, Timing};
use crate::errors::ChannelError;
use crate::services::state::MonitorState;

use super::DeviceChannel;

#[derive(Serialize)]
struct ControlBody {
    device: Actuator,
    action: SwitchState,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
}

#[derive(Serialize)]
struct CustomIpBody<'a> {
    ip: &'a str,
}

/// Request/response path through the backend proxy, used for failover
/// polling and as the fallback command channel when the socket is down.
pub struct HttpChannel {
    client: reqwest::Client,
    base_url: String,
    target: RwLock<String>,
    timeout: Duration,
    state: Arc<MonitorState>,
}

impl HttpChannel {
    pub fn new(
        proxy: &Proxy,
        timing: &Timing,
        state: Arc<MonitorState>,
        initial_target: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: proxy.base_url.trim_end_matches('/').to_string(),
            target: RwLock::new(initial_target),
            timeout: timing.http_timeout(),
            state,
        }
    }

    /// Point subsequent requests at the best-known device address.
    pub async fn set_target(&self, address: String) {
        *self.target.write().await = address;
    }

    pub async fn target(&self) -> String {
        self.target.read().await.clone()
    }

    /// Bounded-timeout reachability probe.
    pub async fn probe_health(&self) -> Result<(), ChannelError> {
        let target = self.target().await;
        self.client
            .get(format!("{}/health", self.base_url))
            .query(&[("ip", target.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;
        Ok(())
    }

    /// Fetch the current device status, unwrapping the proxy envelope.
    pub async fn fetch_status(&self) -> Result<DevicePayload, ChannelError> {
        let target = self.target().await;
        let cache_buster = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).to_string();

        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .query(&[("ip", target.as_str()), ("_t", cache_buster.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let body = response.text().await.map_err(request_error)?;
        parse_status_body(&body).map_err(|e| ChannelError::Protocol(e.to_string()))
    }

    /// Tell the proxy which device address the user prefers.
    pub async fn push_custom_ip(&self, ip: &str) -> Result<(), ChannelError> {
        self.client
            .post(format!("{}/set-custom-ip", self.base_url))
            .json(&CustomIpBody { ip })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;
        Ok(())
    }

    async fn post_control(
        &self,
        device: Actuator,
        action: SwitchState,
        duration: Option<u32>,
    ) -> Result<(), ChannelError> {
        self.client
            .post(format!("{}/control", self.base_url))
            .json(&ControlBody {
                device,
                action,
                duration,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;
        Ok(())
    }

    /// The proxy exposes mode switching as a toggle; refetch afterwards so
    /// the snapshot reflects the device's actual mode.
    async fn toggle_mode(&self) -> Result<(), ChannelError> {
        self.client
            .get(format!("{}/toggleMode", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let payload = self.fetch_status().await?;
        self.state.ingest(&payload).await;
        Ok(())
    }
}

fn request_error(error: reqwest::Error) -> ChannelError {
    if error.is_timeout() {
        ChannelError::Timeout
    } else {
        ChannelError::Http(error.to_string())
    }
}

#[async_trait]
impl DeviceChannel for HttpChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    /// Plain HTTP is always worth a try; failures surface per request.
    async fn is_available(&self) -> bool {
        true
    }

    async fn send_command(&self, command: &DeviceCommand) -> Result<(), ChannelError> {
        match command {
            DeviceCommand::GetData => {
                let payload = self.fetch_status().await?;
                self.state.ingest(&payload).await;
                Ok(())
            }
            DeviceCommand::Control {
                device,
                action,
                duration,
            } => self.post_control(*device, *action, *duration).await,
            DeviceCommand::SetMode { .. } => self.toggle_mode().await,
            DeviceCommand::Ping => self.probe_health().await,
        }
    }
}
