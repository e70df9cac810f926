use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use greenlink_monitor::configs::Settings;
use greenlink_monitor::services::MonitorEvent;

pub fn device_payload_json() -> String {
    json!({
        "temperature": 24.5,
        "humidity": 60.0,
        "soilMoisture": 1500,
        "ipAddress": "192.168.0.100",
        "signalStrength": -55,
        "connectedSSID": "greenhouse",
        "dhtSensorWorking": true,
        "fanState": false,
        "lightState": false,
        "pumpState": false,
        "heaterState": false,
        "autoMode": true
    })
    .to_string()
}

/// In-process greenhouse controller: accepts WebSocket sessions, records
/// every inbound frame and close code, answers data requests with a canned
/// payload and forwards frames handed to `push` to the connected client.
pub struct MockDevice {
    pub port: u16,
    pub received: Arc<Mutex<Vec<String>>>,
    pub close_codes: Arc<Mutex<Vec<u16>>>,
    push_tx: broadcast::Sender<String>,
}

impl MockDevice {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let close_codes = Arc::new(Mutex::new(Vec::new()));
        let (push_tx, _) = broadcast::channel(16);

        let inbox = received.clone();
        let codes = close_codes.clone();
        let pusher = push_tx.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let inbox = inbox.clone();
                let codes = codes.clone();
                let mut push_rx = pusher.subscribe();
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(socket).await else {
                        return;
                    };
                    let (mut sink, mut stream) = ws.split();

                    loop {
                        tokio::select! {
                            message = stream.next() => match message {
                                Some(Ok(Message::Text(text))) => {
                                    let wants_data = text.contains("getData");
                                    inbox.lock().unwrap().push(text);
                                    if wants_data
                                        && sink
                                            .send(Message::Text(device_payload_json()))
                                            .await
                                            .is_err()
                                    {
                                        return;
                                    }
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    if let Some(frame) = frame {
                                        codes.lock().unwrap().push(frame.code.into());
                                    }
                                    return;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(_)) | None => return,
                            },
                            frame = push_rx.recv() => {
                                if let Ok(frame) = frame {
                                    if sink.send(Message::Text(frame)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            port,
            received,
            close_codes,
            push_tx,
        }
    }

    /// Send a raw text frame to whichever client is connected.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.push_tx.send(frame.into());
    }
}

#[derive(Clone, Default)]
pub struct ProxyState {
    pub control_calls: Arc<Mutex<Vec<Value>>>,
    pub custom_ips: Arc<Mutex<Vec<String>>>,
}

/// In-process stand-in for the backend proxy's greenhouse endpoints.
pub struct MockProxy {
    pub base_url: String,
    pub state: ProxyState,
}

impl MockProxy {
    pub async fn spawn() -> Self {
        let state = ProxyState::default();
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/status", get(status))
            .route("/control", post(control))
            .route("/toggleMode", get(|| async { "ok" }))
            .route("/set-custom-ip", post(set_custom_ip))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", address),
            state,
        }
    }
}

async fn status() -> Json<Value> {
    let payload: Value = serde_json::from_str(&device_payload_json()).unwrap();
    Json(json!({ "success": true, "data": payload }))
}

async fn control(State(state): State<ProxyState>, Json(body): Json<Value>) -> Json<Value> {
    state.control_calls.lock().unwrap().push(body);
    Json(json!({ "success": true }))
}

async fn set_custom_ip(State(state): State<ProxyState>, Json(body): Json<Value>) -> Json<Value> {
    if let Some(ip) = body.get("ip").and_then(Value::as_str) {
        state.custom_ips.lock().unwrap().push(ip.to_string());
    }
    Json(json!({ "success": true }))
}

/// Settings shrunk to test scale: real candidate walking and backoff, but in
/// milliseconds instead of seconds.
pub fn test_settings(device_port: u16, proxy_url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.device.default_endpoints = vec!["127.0.0.1".to_string()];
    settings.device.websocket_port = device_port;
    settings.proxy.base_url = proxy_url.to_string();
    settings.timing.connect_timeout_ms = 1_000;
    settings.timing.candidate_retry_delay_ms = 20;
    settings.timing.heartbeat_interval_ms = 60_000;
    settings.timing.liveness_timeout_ms = 120_000;
    settings.timing.reconnect_base_delay_ms = 20;
    settings.timing.reconnect_max_delay_ms = 100;
    settings.timing.reconnect_max_attempts = 1;
    settings.timing.poll_interval_ms = 50;
    settings.timing.poll_backoff_base_ms = 20;
    settings.timing.poll_backoff_max_ms = 50;
    settings.timing.http_timeout_ms = 1_000;
    settings
}

/// Drain events until one matches, panicking after `deadline`.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<MonitorEvent>,
    deadline: Duration,
    mut matches: F,
) -> MonitorEvent
where
    F: FnMut(&MonitorEvent) -> bool,
{
    let result = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;

    match result {
        Ok(event) => event,
        Err(_) => panic!("expected event did not arrive within {:?}", deadline),
    }
}
