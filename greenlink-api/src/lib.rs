pub mod alert;
pub mod command;
pub mod payload;
pub mod retry;
pub mod telemetry;

pub use alert::{Alert, AlertCategory, AlertLog, AlertThresholds, evaluate_alerts};
pub use command::{Actuator, ControlMode, DeviceCommand, SwitchState, TimerSetting};
pub use payload::{DevicePayload, StatusEnvelope, parse_status_body};
pub use retry::RetryPolicy;
pub use telemetry::{
    ActuatorState, DEFAULT_SIGNAL_STRENGTH, DEFAULT_SOIL_MOISTURE, HistoryPoint, TelemetryHistory,
    TelemetrySnapshot, UNKNOWN_ADDRESS, UNKNOWN_NETWORK,
};
