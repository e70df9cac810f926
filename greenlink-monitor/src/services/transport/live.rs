use std::sync::Arc;

use async_trait::async_trait;
use greenlink_api::DeviceCommand;
use tokio::sync::{RwLock, mpsc};

use crate::errors::ChannelError;
use crate::services::state::{ConnectionState, MonitorState};

use super::DeviceChannel;

/// Outbound half of the WebSocket session. The connection service installs a
/// sender while a session is up and clears it on teardown.
pub type LiveSenderSlot = Arc<RwLock<Option<mpsc::UnboundedSender<DeviceCommand>>>>;

pub fn live_sender_slot() -> LiveSenderSlot {
    Arc::new(RwLock::new(None))
}

/// Command path over the live WebSocket session, preferred for latency.
pub struct LiveChannel {
    sender: LiveSenderSlot,
    state: Arc<MonitorState>,
}

impl LiveChannel {
    pub fn new(sender: LiveSenderSlot, state: Arc<MonitorState>) -> Self {
        Self { sender, state }
    }
}

#[async_trait]
impl DeviceChannel for LiveChannel {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn is_available(&self) -> bool {
        self.state.connection().await == ConnectionState::Connected
            && self.sender.read().await.is_some()
    }

    async fn send_command(&self, command: &DeviceCommand) -> Result<(), ChannelError> {
        let guard = self.sender.read().await;
        let sender = guard.as_ref().ok_or(ChannelError::NotConnected)?;

        sender
            .send(command.clone())
            .map_err(|_| ChannelError::SendFailed("live session closed".to_string()))
    }
}
