mod http;
mod live;

pub use http::*;
pub use live::*;

use std::sync::Arc;

use async_trait::async_trait;
use greenlink_api::DeviceCommand;

use crate::errors::ChannelError;

/// One way of getting a command to the device. Both telemetry refreshes and
/// control dispatch go through the same interface, so transport selection is
/// written once instead of per call site.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this channel is worth trying right now.
    async fn is_available(&self) -> bool;

    async fn send_command(&self, command: &DeviceCommand) -> Result<(), ChannelError>;
}

/// Composite that walks its channels in priority order and uses the first
/// available one, falling through on send failure.
pub struct PreferFirstAvailable {
    channels: Vec<Arc<dyn DeviceChannel>>,
}

impl PreferFirstAvailable {
    pub fn new(channels: Vec<Arc<dyn DeviceChannel>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl DeviceChannel for PreferFirstAvailable {
    fn name(&self) -> &'static str {
        "prefer-first-available"
    }

    async fn is_available(&self) -> bool {
        for channel in &self.channels {
            if channel.is_available().await {
                return true;
            }
        }
        false
    }

    async fn send_command(&self, command: &DeviceCommand) -> Result<(), ChannelError> {
        let mut last_error = None;

        for channel in &self.channels {
            if !channel.is_available().await {
                continue;
            }

            match channel.send_command(command).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(channel = channel.name(), "Command send failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ChannelError::NotConnected))
    }
}
