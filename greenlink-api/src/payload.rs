use serde::{Deserialize, Serialize};

/// Raw reading pushed by the greenhouse controller, either as a WebSocket
/// text frame or inside the HTTP status envelope. Every field is optional on
/// the wire; normalization fills in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevicePayload {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub soil_moisture: Option<i32>,
    pub ip_address: Option<String>,
    pub signal_strength: Option<i32>,
    #[serde(rename = "connectedSSID")]
    pub connected_ssid: Option<String>,
    pub web_socket_clients: Option<u32>,
    pub dht_sensor_working: Option<bool>,
    pub fan_state: Option<bool>,
    pub light_state: Option<bool>,
    pub pump_state: Option<bool>,
    pub heater_state: Option<bool>,
    pub auto_mode: Option<bool>,
}

/// Success/data envelope returned by the proxy status endpoint. Some firmware
/// builds answer with the bare payload instead, so `parse_status_body` accepts
/// both shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<DevicePayload>,
}

impl StatusEnvelope {
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true) && self.data.is_some()
    }
}

/// Parse an HTTP status body, unwrapping the `{success, data}` envelope when
/// present and falling back to the raw payload shape.
pub fn parse_status_body(body: &str) -> Result<DevicePayload, serde_json::Error> {
    if let Ok(envelope) = serde_json::from_str::<StatusEnvelope>(body) {
        if let Some(data) = envelope.data {
            return Ok(data);
        }
    }

    serde_json::from_str::<DevicePayload>(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let raw = r#"{
            "temperature": 24.5,
            "humidity": 60.0,
            "soilMoisture": 1500,
            "ipAddress": "192.168.0.100",
            "signalStrength": -55,
            "connectedSSID": "greenhouse",
            "webSocketClients": 2,
            "dhtSensorWorking": true,
            "fanState": true,
            "lightState": false,
            "pumpState": false,
            "heaterState": false,
            "autoMode": true
        }"#;

        let payload: DevicePayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.temperature, Some(24.5));
        assert_eq!(payload.soil_moisture, Some(1500));
        assert_eq!(payload.connected_ssid.as_deref(), Some("greenhouse"));
        assert_eq!(payload.fan_state, Some(true));
        assert_eq!(payload.auto_mode, Some(true));
    }

    #[test]
    fn test_parse_sparse_payload() {
        let payload: DevicePayload = serde_json::from_str("{}").unwrap();
        assert!(payload.temperature.is_none());
        assert!(payload.dht_sensor_working.is_none());
    }

    #[test]
    fn test_parse_status_envelope() {
        let body = r#"{"success": true, "data": {"temperature": 21.0}}"#;
        let payload = parse_status_body(body).unwrap();
        assert_eq!(payload.temperature, Some(21.0));
    }

    #[test]
    fn test_parse_status_bare_payload() {
        let body = r#"{"temperature": 19.5, "soilMoisture": 1800}"#;
        let payload = parse_status_body(body).unwrap();
        assert_eq!(payload.temperature, Some(19.5));
        assert_eq!(payload.soil_moisture, Some(1800));
    }

    #[test]
    fn test_parse_status_rejects_garbage() {
        assert!(parse_status_body("not json").is_err());
    }
}
