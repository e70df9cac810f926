use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::telemetry::TelemetrySnapshot;

/// Which panel section an alert belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Temperature,
    Humidity,
    Moisture,
    Sensor,
}

/// Human-readable anomaly derived from a snapshot. Alerts with the same id
/// describe the same ongoing condition and collapse in the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    pub category: AlertCategory,
    pub message: String,
    pub raised_at: OffsetDateTime,
}

impl Alert {
    fn new(id: &str, category: AlertCategory, message: String, raised_at: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            category,
            message,
            raised_at,
        }
    }
}

/// Range limits for the evaluator. Values mirror the device firmware's
/// comfort band and are overridable through configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    pub temperature_high: f32,
    pub temperature_low: f32,
    pub humidity_low: f32,
    pub humidity_high: f32,
    pub moisture_dry: i32,
    pub moisture_wet: i32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature_high: 30.0,
            temperature_low: 15.0,
            humidity_low: 40.0,
            humidity_high: 80.0,
            moisture_dry: 2000,
            moisture_wet: 1000,
        }
    }
}

/// Derive the alerts one snapshot warrants.
///
/// A failed climate sensor yields a single sensor alert and suppresses the
/// temperature/humidity range checks for that cycle; soil moisture sits on a
/// separate sensor and is evaluated regardless.
pub fn evaluate_alerts(
    snapshot: &TelemetrySnapshot,
    thresholds: &AlertThresholds,
    raised_at: OffsetDateTime,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if !snapshot.sensor_healthy {
        alerts.push(Alert::new(
            "sensor-failure",
            AlertCategory::Sensor,
            "Climate sensor failure detected".to_string(),
            raised_at,
        ));
    } else {
        if let Some(temperature) = snapshot.temperature {
            if temperature > thresholds.temperature_high {
                alerts.push(Alert::new(
                    "temperature-high",
                    AlertCategory::Temperature,
                    format!("High temperature: {:.1}°C", temperature),
                    raised_at,
                ));
            } else if temperature < thresholds.temperature_low {
                alerts.push(Alert::new(
                    "temperature-low",
                    AlertCategory::Temperature,
                    format!("Low temperature: {:.1}°C", temperature),
                    raised_at,
                ));
            }
        }

        if let Some(humidity) = snapshot.humidity {
            if humidity < thresholds.humidity_low {
                alerts.push(Alert::new(
                    "humidity-low",
                    AlertCategory::Humidity,
                    format!("Low humidity: {:.1}%", humidity),
                    raised_at,
                ));
            } else if humidity > thresholds.humidity_high {
                alerts.push(Alert::new(
                    "humidity-high",
                    AlertCategory::Humidity,
                    format!("High humidity: {:.1}%", humidity),
                    raised_at,
                ));
            }
        }
    }

    if snapshot.soil_moisture > thresholds.moisture_dry {
        alerts.push(Alert::new(
            "moisture-dry",
            AlertCategory::Moisture,
            format!("Soil needs watering (reading {})", snapshot.soil_moisture),
            raised_at,
        ));
    } else if snapshot.soil_moisture < thresholds.moisture_wet {
        alerts.push(Alert::new(
            "moisture-wet",
            AlertCategory::Moisture,
            format!("Soil is too wet (reading {})", snapshot.soil_moisture),
            raised_at,
        ));
    }

    alerts
}

/// Bounded, newest-first alert list with id deduplication.
#[derive(Debug, Clone)]
pub struct AlertLog {
    entries: Vec<Alert>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Fold a cycle's alerts into the log: prepend, keep the newest entry
    /// per id, truncate to capacity.
    pub fn absorb(&mut self, fresh: Vec<Alert>) {
        let mut merged = fresh;
        merged.append(&mut self.entries);

        let mut seen = Vec::new();
        merged.retain(|alert| {
            if seen.contains(&alert.id) {
                false
            } else {
                seen.push(alert.id.clone());
                true
            }
        });
        merged.truncate(self.capacity);

        self.entries = merged;
    }

    pub fn entries(&self) -> &[Alert] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
