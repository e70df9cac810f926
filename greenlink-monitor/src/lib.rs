use std::sync::Arc;

use crate::configs::Settings;
use crate::services::{MonitorEvent, MonitorService};

pub mod configs;
pub mod errors;
pub mod services;

/// Run the monitor until interrupted: bring up the live channel, log what
/// the device reports and let the supervisor fall back to polling when the
/// socket cannot be kept alive.
pub async fn run(settings: &Arc<Settings>) {
    let monitor = MonitorService::new(settings);
    let _lease = monitor.acquire();
    let mut events = monitor.subscribe();

    monitor.connect().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                monitor.disconnect().await;
                return;
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::Connected { address }) => {
                    tracing::info!("Connected to {}", address);
                }
                Ok(MonitorEvent::Disconnected) => {
                    tracing::info!("Disconnected");
                }
                Ok(MonitorEvent::Data(snapshot)) => {
                    tracing::info!(
                        "Telemetry: {:?}°C {:?}% moisture {:?}",
                        snapshot.temperature,
                        snapshot.humidity,
                        snapshot.soil_moisture,
                    );
                }
                Ok(MonitorEvent::Error(error)) => {
                    tracing::warn!("Channel error: {}", error);
                }
                Ok(MonitorEvent::Connecting) => {}
                Err(_) => return,
            }
        }
    }
}
