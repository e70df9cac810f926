use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::command::{Actuator, SwitchState};
use crate::payload::DevicePayload;

/// Fallbacks applied when a payload omits a field.
pub const DEFAULT_SOIL_MOISTURE: i32 = 1500;
pub const DEFAULT_SIGNAL_STRENGTH: i32 = -100;
pub const UNKNOWN_ADDRESS: &str = "unknown";
pub const UNKNOWN_NETWORK: &str = "unknown";

/// Last known position of one actuator. `last_toggled_at` and
/// `timer_minutes` are client-side bookkeeping and survive normalization;
/// only a control command rewrites them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActuatorState {
    pub status: SwitchState,
    pub last_toggled_at: Option<OffsetDateTime>,
    pub timer_minutes: Option<u32>,
}

/// Canonical latest-known device reading. Replaced wholesale on every
/// normalization; readers never observe a partially updated snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub soil_moisture: i32,
    pub ip_address: String,
    pub signal_strength: i32,
    pub network_name: String,
    pub client_count: u32,
    pub sensor_healthy: bool,
    pub auto_mode: bool,
    pub actuators: BTreeMap<Actuator, ActuatorState>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            temperature: None,
            humidity: None,
            soil_moisture: DEFAULT_SOIL_MOISTURE,
            ip_address: UNKNOWN_ADDRESS.to_string(),
            signal_strength: DEFAULT_SIGNAL_STRENGTH,
            network_name: UNKNOWN_NETWORK.to_string(),
            client_count: 0,
            sensor_healthy: false,
            auto_mode: true,
            actuators: Actuator::ALL
                .into_iter()
                .map(|a| (a, ActuatorState::default()))
                .collect(),
        }
    }
}

impl TelemetrySnapshot {
    /// Normalize a raw payload into a full snapshot, carrying actuator
    /// bookkeeping over from the previous snapshot.
    pub fn from_payload(payload: &DevicePayload, previous: &TelemetrySnapshot) -> Self {
        let mut actuators = BTreeMap::new();
        for actuator in Actuator::ALL {
            let flag = match actuator {
                Actuator::Fan => payload.fan_state,
                Actuator::Lights => payload.light_state,
                Actuator::WaterPump => payload.pump_state,
                Actuator::Heater => payload.heater_state,
            };
            let carried = previous.actuators.get(&actuator);
            actuators.insert(
                actuator,
                ActuatorState {
                    status: SwitchState::from(flag.unwrap_or(false)),
                    last_toggled_at: carried.and_then(|s| s.last_toggled_at),
                    timer_minutes: carried.and_then(|s| s.timer_minutes),
                },
            );
        }

        Self {
            temperature: payload.temperature,
            humidity: payload.humidity,
            soil_moisture: payload.soil_moisture.unwrap_or(DEFAULT_SOIL_MOISTURE),
            ip_address: payload
                .ip_address
                .clone()
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
            signal_strength: payload.signal_strength.unwrap_or(DEFAULT_SIGNAL_STRENGTH),
            network_name: payload
                .connected_ssid
                .clone()
                .unwrap_or_else(|| UNKNOWN_NETWORK.to_string()),
            client_count: payload.web_socket_clients.unwrap_or(0),
            sensor_healthy: payload.dht_sensor_working.unwrap_or(false),
            auto_mode: payload.auto_mode.unwrap_or(previous.auto_mode),
            actuators,
        }
    }

    /// Record a user control action ahead of the next device push so the
    /// caller sees feedback immediately.
    pub fn apply_control(&mut self, actuator: Actuator, action: SwitchState, duration: Option<u32>) {
        let entry = self.actuators.entry(actuator).or_default();
        entry.status = action;
        entry.last_toggled_at = Some(OffsetDateTime::now_utc());
        entry.timer_minutes = duration;
    }

    /// A snapshot is chart-worthy only when the climate sensor produced a
    /// complete reading.
    pub fn has_climate_reading(&self) -> bool {
        self.sensor_healthy && self.temperature.is_some() && self.humidity.is_some()
    }
}

/// One plotted point of the climate series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub recorded_at: OffsetDateTime,
    pub temperature: f32,
    pub humidity: f32,
    pub soil_moisture: i32,
}

impl HistoryPoint {
    /// Axis label in `HH:MM` form, matching what the charts render.
    pub fn label(&self) -> String {
        format!("{:02}:{:02}", self.recorded_at.hour(), self.recorded_at.minute())
    }
}

/// Bounded climate series; oldest points are evicted first.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl TelemetryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point for the given snapshot if it carries a complete
    /// climate reading. Returns whether a point was recorded.
    pub fn record(&mut self, snapshot: &TelemetrySnapshot, recorded_at: OffsetDateTime) -> bool {
        if !snapshot.has_climate_reading() {
            return false;
        }
        let (Some(temperature), Some(humidity)) = (snapshot.temperature, snapshot.humidity) else {
            return false;
        };

        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(HistoryPoint {
            recorded_at,
            temperature,
            humidity,
            soil_moisture: snapshot.soil_moisture,
        });
        true
    }

    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
