use greenlink_api::TelemetrySnapshot;
use tokio::sync::broadcast;

use crate::errors::ChannelError;

/// Everything the UI can observe from the monitor, as one sum type so each
/// subscriber statically knows the payload of every variant.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Connecting,
    Connected { address: String },
    Disconnected,
    Data(Box<TelemetrySnapshot>),
    Error(ChannelError),
}

/// Broadcast fan-out for monitor events. Publishing with no subscribers is
/// not an error; late subscribers simply miss earlier events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: MonitorEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for monitor event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
