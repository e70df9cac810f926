use greenlink_api::{
    Actuator, Alert, AlertLog, AlertThresholds, DevicePayload, HistoryPoint, SwitchState,
    TelemetryHistory, TelemetrySnapshot, evaluate_alerts,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::configs::Retention;

/// Channel health as the UI sees it. Owned by whichever transport is active;
/// the single-active-transport invariant keeps writers from racing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Shared mutable heart of the monitor: the canonical snapshot, its history,
/// the alert panel and the connection indicator. Mutation happens only
/// through `ingest`, `apply_control` and `set_connection`, serialized by the
/// surrounding locks.
pub struct MonitorState {
    connection: RwLock<ConnectionState>,
    snapshot: RwLock<TelemetrySnapshot>,
    history: RwLock<TelemetryHistory>,
    alerts: RwLock<AlertLog>,
    thresholds: AlertThresholds,
}

impl MonitorState {
    pub fn new(retention: Retention, thresholds: AlertThresholds) -> Self {
        Self {
            connection: RwLock::new(ConnectionState::Disconnected),
            snapshot: RwLock::new(TelemetrySnapshot::default()),
            history: RwLock::new(TelemetryHistory::new(retention.history_capacity)),
            alerts: RwLock::new(AlertLog::new(retention.alert_capacity)),
            thresholds,
        }
    }

    pub async fn connection(&self) -> ConnectionState {
        *self.connection.read().await
    }

    /// Move the connection indicator; returns whether this was an actual
    /// transition, so callers can emit events only on change.
    pub async fn set_connection(&self, next: ConnectionState) -> bool {
        let mut current = self.connection.write().await;
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    }

    pub async fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn history(&self) -> Vec<HistoryPoint> {
        self.history.read().await.points().cloned().collect()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.entries().to_vec()
    }

    /// Normalize a raw payload into the canonical snapshot, append to the
    /// climate history when eligible and fold the cycle's alerts into the
    /// panel. Both the live channel and the poller route through here.
    pub async fn ingest(&self, payload: &DevicePayload) -> TelemetrySnapshot {
        let now = OffsetDateTime::now_utc();

        let next = {
            let mut snapshot = self.snapshot.write().await;
            let next = TelemetrySnapshot::from_payload(payload, &snapshot);
            *snapshot = next.clone();
            next
        };

        self.history.write().await.record(&next, now);

        let fresh = evaluate_alerts(&next, &self.thresholds, now);
        if !fresh.is_empty() {
            self.alerts.write().await.absorb(fresh);
        }

        next
    }

    /// Optimistic actuator update after a control command was accepted by
    /// either transport; the authoritative state arrives with the next push.
    pub async fn apply_control(
        &self,
        actuator: Actuator,
        action: SwitchState,
        duration: Option<u32>,
    ) {
        self.snapshot
            .write()
            .await
            .apply_control(actuator, action, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> MonitorState {
        MonitorState::new(Retention::default(), AlertThresholds::default())
    }

    #[tokio::test]
    async fn test_ingest_replaces_snapshot_and_records_history() {
        let state = state();

        let payload = DevicePayload {
            temperature: Some(24.5),
            humidity: Some(60.0),
            soil_moisture: Some(1500),
            dht_sensor_working: Some(true),
            ..DevicePayload::default()
        };

        let snapshot = state.ingest(&payload).await;
        assert_eq!(snapshot.temperature, Some(24.5));
        assert_eq!(state.history().await.len(), 1);
        assert!(state.alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_unhealthy_sensor_alerts_without_history() {
        let state = state();

        let payload = DevicePayload {
            dht_sensor_working: Some(false),
            soil_moisture: Some(1500),
            ..DevicePayload::default()
        };

        state.ingest(&payload).await;
        assert!(state.history().await.is_empty());

        let alerts = state.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "sensor-failure");
    }

    #[tokio::test]
    async fn test_connection_transition_reported_once() {
        let state = state();

        assert!(state.set_connection(ConnectionState::Connected).await);
        assert!(!state.set_connection(ConnectionState::Connected).await);
        assert!(state.set_connection(ConnectionState::Disconnected).await);
    }

    #[tokio::test]
    async fn test_apply_control_is_visible_immediately() {
        let state = state();

        state
            .apply_control(Actuator::Fan, SwitchState::On, Some(30))
            .await;

        let snapshot = state.snapshot().await;
        let fan = &snapshot.actuators[&Actuator::Fan];
        assert_eq!(fan.status, SwitchState::On);
        assert!(fan.last_toggled_at.is_some());
        assert_eq!(fan.timer_minutes, Some(30));
    }
}
