use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use greenlink_api::{DeviceCommand, DevicePayload};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::configs::{Device, Timing};
use crate::errors::ChannelError;
use crate::services::event_bus::{EventBus, MonitorEvent};
use crate::services::state::{ConnectionState, MonitorState};
use crate::services::transport::LiveSenderSlot;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointOrigin {
    /// From the fixed startup list.
    Default,
    /// Supplied at runtime; tried first until it fails.
    Custom,
}

/// Candidate address for reaching the device.
#[derive(Debug, Clone)]
struct DeviceEndpoint {
    address: String,
    origin: EndpointOrigin,
}

/// Why a WebSocket session ended.
enum SessionEnd {
    /// Local `disconnect()`; the caller owns the state transition.
    Shutdown,
    /// Device closed with a normal closure code; no automatic reconnect.
    RemoteClosed,
    /// Anything else: transport error, liveness timeout, abnormal close.
    Unexpected,
}

struct ConnInner {
    custom_endpoint: Option<String>,
    candidate_index: usize,
    task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// Owns the live WebSocket channel: candidate iteration, per-attempt
/// timeouts, heartbeat supervision and the reconnect/backoff cycle.
pub struct ConnectionService {
    device: Device,
    timing: Timing,
    state: Arc<MonitorState>,
    events: EventBus,
    live_sender: LiveSenderSlot,
    inner: Arc<Mutex<ConnInner>>,
}

impl ConnectionService {
    pub fn new(
        device: Device,
        timing: Timing,
        state: Arc<MonitorState>,
        events: EventBus,
        live_sender: LiveSenderSlot,
    ) -> Self {
        let custom_endpoint = device.custom_endpoint.clone();
        Self {
            device,
            timing,
            state,
            events,
            live_sender,
            inner: Arc::new(Mutex::new(ConnInner {
                custom_endpoint,
                candidate_index: 0,
                task: None,
                shutdown: None,
            })),
        }
    }

    /// Record a user-preferred address, tried before the default list on the
    /// next connection cycle. Cleared automatically once it fails.
    pub async fn set_custom_endpoint(&self, address: String) {
        self.inner.lock().await.custom_endpoint = Some(address);
    }

    /// Start the connection cycle. No-op while already connecting or
    /// connected.
    pub async fn connect(&self) {
        if matches!(
            self.state.connection().await,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
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
        guard.task = Some(tokio::spawn(run_loop(
            self.device.clone(),
            self.timing,
            self.state.clone(),
            self.events.clone(),
            self.live_sender.clone(),
            self.inner.clone(),
            shutdown_rx,
        )));
    }

    /// Tear the channel down with a normal closure. Idempotent: only an
    /// actual state transition is published, and the connection indicator is
    /// left alone when no cycle was running, since another transport may own
    /// it.
    pub async fn disconnect(&self) {
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

        self.inner.lock().await.candidate_index = 0;
        self.live_sender.write().await.take();

        if self.state.set_connection(ConnectionState::Disconnected).await {
            self.events.publish(MonitorEvent::Disconnected);
        }
    }
}

async fn run_loop(
    device: Device,
    timing: Timing,
    state: Arc<MonitorState>,
    events: EventBus,
    live_sender: LiveSenderSlot,
    inner: Arc<Mutex<ConnInner>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let policy = timing.reconnect_policy();
    let mut reconnect_attempts: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        state.set_connection(ConnectionState::Connecting).await;
        events.publish(MonitorEvent::Connecting);

        let Some((stream, address)) =
            walk_candidates(&device, &timing, &events, &state, &inner, &mut shutdown).await
        else {
            return;
        };

        state.set_connection(ConnectionState::Connected).await;
        inner.lock().await.candidate_index = 0;
        reconnect_attempts = 0;
        tracing::info!("Live channel established with {}", address);
        events.publish(MonitorEvent::Connected {
            address: address.clone(),
        });

        let end = run_session(stream, &timing, &state, &events, &live_sender, &mut shutdown).await;
        live_sender.write().await.take();

        match end {
            SessionEnd::Shutdown => return,
            SessionEnd::RemoteClosed => {
                if state.set_connection(ConnectionState::Disconnected).await {
                    events.publish(MonitorEvent::Disconnected);
                }
                return;
            }
            SessionEnd::Unexpected => {
                if state.set_connection(ConnectionState::Disconnected).await {
                    events.publish(MonitorEvent::Disconnected);
                }

                if policy.is_exhausted(reconnect_attempts) {
                    tracing::error!(
                        "Giving up on {} after {} reconnect attempts",
                        address,
                        reconnect_attempts
                    );
                    events.publish(MonitorEvent::Error(ChannelError::RetriesExhausted {
                        attempts: reconnect_attempts,
                    }));
                    return;
                }

                let delay = policy.delay_for(reconnect_attempts);
                reconnect_attempts += 1;
                tracing::debug!(
                    "Reconnecting in {:?} (attempt {})",
                    delay,
                    reconnect_attempts
                );

                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

/// Try candidates in order: the custom endpoint first when set, then the
/// default list from the current index. A failed custom endpoint is cleared
/// and iteration restarts at the head of the defaults.
async fn walk_candidates(
    device: &Device,
    timing: &Timing,
    events: &EventBus,
    state: &Arc<MonitorState>,
    inner: &Arc<Mutex<ConnInner>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<(WebSocketStream<MaybeTlsStream<TcpStream>>, String)> {
    loop {
        let candidate = {
            let guard = inner.lock().await;
            if let Some(custom) = guard.custom_endpoint.clone() {
                Some(DeviceEndpoint {
                    address: custom,
                    origin: EndpointOrigin::Custom,
                })
            } else if guard.candidate_index < device.default_endpoints.len() {
                Some(DeviceEndpoint {
                    address: device.default_endpoints[guard.candidate_index].clone(),
                    origin: EndpointOrigin::Default,
                })
            } else {
                None
            }
        };

        let Some(DeviceEndpoint { address, origin }) = candidate else {
            tracing::warn!("All candidate endpoints failed");
            inner.lock().await.candidate_index = 0;
            if state.set_connection(ConnectionState::Disconnected).await {
                events.publish(MonitorEvent::Disconnected);
            }
            events.publish(MonitorEvent::Error(ChannelError::EndpointsExhausted));
            return None;
        };

        let url = format!("ws://{}:{}/", address, device.websocket_port);
        tracing::debug!("Trying endpoint {}", url);

        let reason = tokio::select! {
            _ = shutdown.changed() => return None,
            attempt = timeout(timing.connect_timeout(), connect_async(&url)) => match attempt {
                Ok(Ok((stream, _))) => return Some((stream, address)),
                Ok(Err(e)) => e.to_string(),
                Err(_) => "handshake timed out".to_string(),
            },
        };

        tracing::warn!("Endpoint {} failed: {}", address, reason);
        events.publish(MonitorEvent::Error(ChannelError::ConnectFailed {
            address: address.clone(),
            reason,
        }));
        {
            let mut guard = inner.lock().await;
            match origin {
                EndpointOrigin::Custom => {
                    guard.custom_endpoint = None;
                    guard.candidate_index = 0;
                }
                EndpointOrigin::Default => guard.candidate_index += 1,
            }
        }

        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = sleep(timing.candidate_retry_delay()) => {}
        }
    }
}

async fn run_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    timing: &Timing,
    state: &Arc<MonitorState>,
    events: &EventBus,
    live_sender: &LiveSenderSlot,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = stream.split();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    *live_sender.write().await = Some(command_tx);

    // Full refresh right away; pushes take over from here.
    if send_frame(&mut sink, &DeviceCommand::GetData).await.is_err() {
        return SessionEnd::Unexpected;
    }

    let mut heartbeat = tokio::time::interval(timing.heartbeat_interval());
    heartbeat.tick().await;
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                return SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                if last_inbound.elapsed() >= timing.liveness_timeout() {
                    tracing::warn!(
                        "No inbound traffic for {:?}, treating live channel as dead",
                        last_inbound.elapsed()
                    );
                    return SessionEnd::Unexpected;
                }
                if send_frame(&mut sink, &DeviceCommand::Ping).await.is_err() {
                    return SessionEnd::Unexpected;
                }
            }
            command = command_rx.recv() => {
                let Some(command) = command else {
                    return SessionEnd::Unexpected;
                };
                if send_frame(&mut sink, &command).await.is_err() {
                    return SessionEnd::Unexpected;
                }
            }
            message = stream.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    last_inbound = Instant::now();
                    match serde_json::from_str::<DevicePayload>(&text) {
                        Ok(payload) => {
                            let snapshot = state.ingest(&payload).await;
                            events.publish(MonitorEvent::Data(Box::new(snapshot)));
                        }
                        Err(e) => {
                            tracing::warn!("Malformed device payload: {}", e);
                            events.publish(MonitorEvent::Error(
                                ChannelError::Protocol(e.to_string()),
                            ));
                        }
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let normal = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    return if normal {
                        SessionEnd::RemoteClosed
                    } else {
                        SessionEnd::Unexpected
                    };
                }
                Some(Ok(_)) => {
                    last_inbound = Instant::now();
                }
                Some(Err(e)) => {
                    tracing::warn!("Live channel error: {}", e);
                    return SessionEnd::Unexpected;
                }
                None => return SessionEnd::Unexpected,
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, command: &DeviceCommand) -> Result<(), ChannelError> {
    let text = serde_json::to_string(command)
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
    sink.send(WsMessage::Text(text))
        .await
        .map_err(|e| ChannelError::SendFailed(e.to_string()))
}
