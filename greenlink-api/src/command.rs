use std::fmt;

use serde::{Deserialize, Serialize};

/// Controllable output on the greenhouse controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Actuator {
    Fan,
    Lights,
    WaterPump,
    Heater,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [
        Actuator::Fan,
        Actuator::Lights,
        Actuator::WaterPump,
        Actuator::Heater,
    ];

    /// Lights stay user-controllable while the device runs its automatic
    /// rules; every other actuator only accepts commands in manual mode.
    /// The dispatcher does not enforce this, callers check the current mode.
    pub fn controllable_in_auto(&self) -> bool {
        matches!(self, Actuator::Lights)
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Actuator::Fan => "fan",
            Actuator::Lights => "lights",
            Actuator::WaterPump => "waterPump",
            Actuator::Heater => "heater",
        };
        write!(f, "{}", name)
    }
}

/// On/off position, used both for outgoing control actions and for the
/// actuator status inside a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    #[default]
    Off,
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on { SwitchState::On } else { SwitchState::Off }
    }
}

/// Device-side control policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Auto,
    Manual,
}

/// Outbound command frame, serialized as a JSON text frame on the live
/// channel. The HTTP channel maps each variant onto the matching proxy
/// endpoint instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DeviceCommand {
    #[serde(rename = "getData")]
    GetData,
    #[serde(rename = "control")]
    Control {
        device: Actuator,
        action: SwitchState,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<u32>,
    },
    #[serde(rename = "setMode")]
    SetMode { mode: ControlMode },
    #[serde(rename = "ping")]
    Ping,
}

/// Per-actuator schedule requested by the user; `duration_minutes` is what
/// accompanies a timed control command.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerSetting {
    pub hours: u32,
    pub minutes: u32,
    pub active: bool,
}

impl TimerSetting {
    pub fn new(hours: u32, minutes: u32) -> Self {
        Self {
            hours,
            minutes,
            active: hours != 0 || minutes != 0,
        }
    }

    pub fn clear() -> Self {
        Self::default()
    }

    pub fn duration_minutes(&self) -> Option<u32> {
        if self.active {
            Some(self.hours * 60 + self.minutes)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_command_wire_shape() {
        let command = DeviceCommand::Control {
            device: Actuator::WaterPump,
            action: SwitchState::On,
            duration: Some(15),
        };

        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "control",
                "device": "waterPump",
                "action": "on",
                "duration": 15
            })
        );
    }

    #[test]
    fn test_control_command_omits_missing_duration() {
        let command = DeviceCommand::Control {
            device: Actuator::Fan,
            action: SwitchState::Off,
            duration: None,
        };

        let json = serde_json::to_string(&command).unwrap();
        assert!(!json.contains("duration"));
    }

    #[test]
    fn test_simple_command_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&DeviceCommand::GetData).unwrap(),
            r#"{"type":"getData"}"#
        );
        assert_eq!(
            serde_json::to_string(&DeviceCommand::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
        assert_eq!(
            serde_json::to_string(&DeviceCommand::SetMode {
                mode: ControlMode::Manual
            })
            .unwrap(),
            r#"{"type":"setMode","mode":"manual"}"#
        );
    }

    #[test]
    fn test_auto_mode_policy() {
        assert!(Actuator::Lights.controllable_in_auto());
        assert!(!Actuator::Fan.controllable_in_auto());
        assert!(!Actuator::WaterPump.controllable_in_auto());
        assert!(!Actuator::Heater.controllable_in_auto());
    }

    #[test]
    fn test_timer_duration() {
        assert_eq!(TimerSetting::new(1, 30).duration_minutes(), Some(90));
        assert_eq!(TimerSetting::new(0, 45).duration_minutes(), Some(45));
        assert_eq!(TimerSetting::new(0, 0).duration_minutes(), None);
        assert!(!TimerSetting::new(0, 0).active);
    }

    #[test]
    fn test_cleared_timer_is_inactive() {
        let timer = TimerSetting::clear();
        assert!(!timer.active);
        assert_eq!(timer.duration_minutes(), None);
        assert_eq!(TimerSetting::new(2, 15).duration_minutes(), Some(135));
    }
}
