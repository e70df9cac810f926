mod common;

use std::time::Duration;

use greenlink_api::{Actuator, ControlMode, SwitchState};
use greenlink_monitor::services::MonitorService;
use serde_json::json;

use common::{MockDevice, MockProxy, test_settings, wait_for_event};
use greenlink_monitor::services::MonitorEvent;
use tokio::net::TcpListener;

async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_control_goes_through_live_channel_when_connected() {
    let device = MockDevice::spawn().await;
    let proxy = MockProxy::spawn().await;
    let settings = test_settings(device.port, &proxy.base_url);

    let monitor = MonitorService::new(&settings);
    let _lease = monitor.acquire();
    let mut events = monitor.subscribe();

    monitor.connect().await;
    // Let the opening data exchange finish so the device's reply cannot
    // overwrite the optimistic update below.
    wait_for_event(&mut events, Duration::from_secs(5), |event| {
        matches!(event, MonitorEvent::Data(_))
    })
    .await;

    monitor
        .commands()
        .send_control(Actuator::Fan, SwitchState::On, None)
        .await
        .unwrap();

    // The frame lands on the socket, not the proxy.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frames = device.received.lock().unwrap().clone();
            if frames.iter().any(|f| f.contains("\"control\"")) {
                return frames;
            }
            drop(frames);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("control frame should reach the device");

    assert!(proxy.state.control_calls.lock().unwrap().is_empty());

    let frames = device.received.lock().unwrap().clone();
    let control = frames
        .iter()
        .find(|f| f.contains("\"control\""))
        .cloned()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&control).unwrap();
    assert_eq!(
        value,
        json!({ "type": "control", "device": "fan", "action": "on" })
    );

    // Accepted sends reflect in the snapshot before the next device push.
    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot.actuators[&Actuator::Fan].status, SwitchState::On);
    assert!(snapshot.actuators[&Actuator::Fan].last_toggled_at.is_some());

    monitor.disconnect().await;
}

#[tokio::test]
async fn test_control_falls_back_to_proxy_when_socket_is_down() {
    let proxy = MockProxy::spawn().await;
    let mut settings = test_settings(dead_port().await, &proxy.base_url);
    settings.device.monitorable = false;

    let monitor = MonitorService::new(&settings);
    let _lease = monitor.acquire();

    monitor
        .commands()
        .send_control(Actuator::WaterPump, SwitchState::On, Some(10))
        .await
        .unwrap();

    let calls = proxy.state.control_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        json!({ "device": "waterPump", "action": "on", "duration": 10 })
    );
}

#[tokio::test]
async fn test_mode_change_over_proxy_refetches_status() {
    let proxy = MockProxy::spawn().await;
    let mut settings = test_settings(dead_port().await, &proxy.base_url);
    settings.device.monitorable = false;

    let monitor = MonitorService::new(&settings);
    let _lease = monitor.acquire();

    monitor
        .commands()
        .send_mode_change(ControlMode::Manual)
        .await
        .unwrap();

    // The proxy toggle is followed by a status fetch, so the snapshot holds
    // what the device actually reports.
    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot.temperature, Some(24.5));
    assert!(snapshot.auto_mode);
}

#[tokio::test]
async fn test_custom_endpoint_is_pushed_to_proxy() {
    let proxy = MockProxy::spawn().await;
    let mut settings = test_settings(dead_port().await, &proxy.base_url);
    settings.device.monitorable = false;

    let monitor = MonitorService::new(&settings);
    let _lease = monitor.acquire();

    monitor
        .set_custom_endpoint("10.0.0.42".to_string())
        .await;

    let pushed = proxy.state.custom_ips.lock().unwrap().clone();
    assert_eq!(pushed, vec!["10.0.0.42".to_string()]);
}
