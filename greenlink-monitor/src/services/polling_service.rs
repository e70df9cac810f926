use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use greenlink_api::TelemetrySnapshot;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::configs::Timing;
use crate::errors::ChannelError;
use crate::services::event_bus::{EventBus, MonitorEvent};
use crate::services::state::{ConnectionState, MonitorState};
use crate::services::transport::HttpChannel;

struct PollInner {
    task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// HTTP failover loop: keeps telemetry flowing through the proxy when the
/// live channel cannot be established.
pub struct PollingService {
    http: Arc<HttpChannel>,
    timing: Timing,
    monitorable: bool,
    state: Arc<MonitorState>,
    events: EventBus,
    inner: Mutex<PollInner>,
    in_flight: Arc<AtomicBool>,
}

impl PollingService {
    pub fn new(
        http: Arc<HttpChannel>,
        timing: Timing,
        monitorable: bool,
        state: Arc<MonitorState>,
        events: EventBus,
    ) -> Self {
        Self {
            http,
            timing,
            monitorable,
            state,
            events,
            inner: Mutex::new(PollInner {
                task: None,
                shutdown: None,
            }),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin polling. No-op for targets without an on-board controller and
    /// while a poll loop is already running.
    pub async fn start_polling(&self) {
        if !self.monitorable {
            tracing::debug!("Target is not monitorable, skipping polling");
            return;
        }

        let mut guard = self.inner.lock().await;
        if let Some(task) = &guard.task {
            if !task.is_finished() {
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        guard.shutdown = Some(shutdown_tx);
        guard.task = Some(tokio::spawn(poll_loop(
            self.http.clone(),
            self.timing,
            self.state.clone(),
            self.events.clone(),
            self.in_flight.clone(),
            shutdown_rx,
        )));
    }

    /// Cancel the loop and report the channel as down. Idempotent; the
    /// connection indicator is only touched when a loop actually ran, since
    /// another transport may own it.
    pub async fn stop_polling(&self) {
        let (task, shutdown) = {
            let mut guard = self.inner.lock().await;
            (guard.task.take(), guard.shutdown.take())
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        let Some(task) = task else {
            return;
        };
        let _ = task.await;

        if self.state.set_connection(ConnectionState::Disconnected).await {
            self.events.publish(MonitorEvent::Disconnected);
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.inner
            .lock()
            .await
            .task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

async fn poll_loop(
    http: Arc<HttpChannel>,
    timing: Timing,
    state: Arc<MonitorState>,
    events: EventBus,
    in_flight: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let policy = timing.poll_retry_policy();
    let mut retries: u32 = 0;

    // One reachability probe up front; an unreachable proxy feeds the same
    // backoff path as a failed fetch instead of starting the interval.
    if let Err(e) = http.probe_health().await {
        tracing::warn!("Health probe failed: {}", e);
        retries = 1;
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(policy.delay_for(0)) => {}
        }
    }

    loop {
        if *shutdown.borrow() {
            return;
        }

        match fetch_once(&http, &state, &in_flight).await {
            Ok(snapshot) => {
                retries = 0;
                if state.set_connection(ConnectionState::Connected).await {
                    events.publish(MonitorEvent::Connected {
                        address: http.target().await,
                    });
                }
                if let Some(snapshot) = snapshot {
                    events.publish(MonitorEvent::Data(Box::new(snapshot)));
                }

                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = sleep(timing.poll_interval()) => {}
                }
            }
            Err(e) => {
                retries += 1;
                if retries > policy.max_attempts {
                    tracing::warn!("Polling gave up after {} failures: {}", retries, e);
                    if state.set_connection(ConnectionState::Disconnected).await {
                        events.publish(MonitorEvent::Disconnected);
                    }
                    return;
                }

                let delay = policy.delay_for(retries - 1);
                tracing::debug!("Poll failed ({}), retrying in {:?}", e, delay);
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

/// Single fetch with a single-flight guard; a request already under way is
/// never overlapped by a new one.
async fn fetch_once(
    http: &HttpChannel,
    state: &Arc<MonitorState>,
    in_flight: &AtomicBool,
) -> Result<Option<TelemetrySnapshot>, ChannelError> {
    if in_flight.swap(true, Ordering::SeqCst) {
        tracing::trace!("Status fetch already in flight");
        return Ok(None);
    }

    let result = http.fetch_status().await;
    in_flight.store(false, Ordering::SeqCst);

    let payload = result?;
    Ok(Some(state.ingest(&payload).await))
}
