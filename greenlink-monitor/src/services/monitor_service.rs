use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use greenlink_api::{Alert, HistoryPoint, TelemetrySnapshot};
use tokio::sync::broadcast;

use crate::configs::Settings;
use crate::services::command_service::CommandService;
use crate::services::connection_service::ConnectionService;
use crate::services::event_bus::{EventBus, MonitorEvent};
use crate::services::polling_service::PollingService;
use crate::services::state::{ConnectionState, MonitorState};
use crate::services::transport::{
    DeviceChannel, HttpChannel, LiveChannel, PreferFirstAvailable, live_sender_slot,
};

struct MonitorInner {
    state: Arc<MonitorState>,
    events: EventBus,
    connection: ConnectionService,
    polling: PollingService,
    commands: CommandService,
    http: Arc<HttpChannel>,
    handles: AtomicUsize,
}

/// Facade over the whole monitoring pipeline: one instance per device,
/// shared by every consumer through cheap clones.
///
/// Consumers hold a [`MonitorHandle`] while they care about the device; the
/// channels are torn down when the last handle is released.
#[derive(Clone)]
pub struct MonitorService {
    inner: Arc<MonitorInner>,
}

/// Refcounted lease on the monitor. Dropping the last one disconnects both
/// channels in the background.
pub struct MonitorHandle {
    inner: Arc<MonitorInner>,
}

impl MonitorService {
    pub fn new(settings: &Settings) -> Self {
        let state = Arc::new(MonitorState::new(
            settings.retention,
            settings.thresholds.clone(),
        ));
        let events = EventBus::default();
        let slot = live_sender_slot();

        let initial_target = settings
            .device
            .custom_endpoint
            .clone()
            .or_else(|| settings.device.default_endpoints.first().cloned())
            .unwrap_or_else(|| greenlink_api::UNKNOWN_ADDRESS.to_string());
        let http = Arc::new(HttpChannel::new(
            &settings.proxy,
            &settings.timing,
            state.clone(),
            initial_target,
        ));

        let live = Arc::new(LiveChannel::new(slot.clone(), state.clone()));
        let channel: Arc<dyn DeviceChannel> = Arc::new(PreferFirstAvailable::new(vec![
            live as Arc<dyn DeviceChannel>,
            http.clone() as Arc<dyn DeviceChannel>,
        ]));

        let connection = ConnectionService::new(
            settings.device.clone(),
            settings.timing,
            state.clone(),
            events.clone(),
            slot,
        );
        let polling = PollingService::new(
            http.clone(),
            settings.timing,
            settings.device.monitorable,
            state.clone(),
            events.clone(),
        );
        let commands = CommandService::new(channel, state.clone());

        let inner = Arc::new(MonitorInner {
            state,
            events,
            connection,
            polling,
            commands,
            http,
            handles: AtomicUsize::new(0),
        });

        tokio::spawn(supervise_failover(
            Arc::downgrade(&inner),
            inner.events.subscribe(),
        ));

        Self { inner }
    }

    /// Register interest in this device. The monitor stays live as long as
    /// at least one handle is around.
    pub fn acquire(&self) -> MonitorHandle {
        self.inner.handles.fetch_add(1, Ordering::AcqRel);
        MonitorHandle {
            inner: self.inner.clone(),
        }
    }

    pub fn handle_count(&self) -> usize {
        self.inner.handles.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Bring up the live channel. Polling is stopped first; only one
    /// transport feeds the snapshot at a time.
    pub async fn connect(&self) {
        self.inner.polling.stop_polling().await;
        self.inner.connection.connect().await;
    }

    /// Switch to HTTP polling, tearing down the live channel first.
    pub async fn start_polling(&self) {
        self.inner.connection.disconnect().await;
        self.inner.polling.start_polling().await;
    }

    pub async fn stop_polling(&self) {
        self.inner.polling.stop_polling().await;
    }

    pub async fn is_polling(&self) -> bool {
        self.inner.polling.is_polling().await
    }

    /// Tear down both channels. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await;
        self.inner.polling.stop_polling().await;
    }

    /// Prefer `address` for both channels from now on, and let the proxy
    /// know. A proxy that does not support the hint is not an error.
    pub async fn set_custom_endpoint(&self, address: String) {
        self.inner
            .connection
            .set_custom_endpoint(address.clone())
            .await;
        self.inner.http.set_target(address.clone()).await;

        if let Err(e) = self.inner.http.push_custom_ip(&address).await {
            tracing::debug!("Proxy rejected custom address hint: {}", e);
        }
    }

    pub fn commands(&self) -> &CommandService {
        &self.inner.commands
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.state.connection().await
    }

    pub async fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.state.snapshot().await
    }

    pub async fn history(&self) -> Vec<HistoryPoint> {
        self.inner.state.history().await
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.state.alerts().await
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.inner.handles.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // Teardown is async; it runs in the background when a runtime is
        // still around, otherwise the tasks die with the runtime anyway.
        let inner = self.inner.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                tracing::debug!("Last handle released, tearing down channels");
                inner.connection.disconnect().await;
                inner.polling.stop_polling().await;
            });
        }
    }
}

/// Watches the event stream and falls back to HTTP polling whenever the live
/// channel gives up for good. Holds only a weak reference so it dies with
/// the monitor.
async fn supervise_failover(
    inner: Weak<MonitorInner>,
    mut events: broadcast::Receiver<MonitorEvent>,
) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Error(error)) if error.is_terminal() => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if inner.handles.load(Ordering::Acquire) == 0 {
                    continue;
                }

                tracing::info!("Live channel unavailable ({}), switching to polling", error);
                inner.polling.start_polling().await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Failover supervisor lagged by {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
