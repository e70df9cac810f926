use std::sync::Arc;

use greenlink_api::{Actuator, ControlMode, DeviceCommand, SwitchState, TimerSetting};

use crate::errors::ChannelError;
use crate::services::state::MonitorState;
use crate::services::transport::DeviceChannel;

/// Dispatches control commands through whichever channel is currently
/// available and keeps the local snapshot in step with accepted sends.
///
/// While the device runs in automatic mode it overrides every actuator
/// except the lights, so callers should gate their controls on
/// [`Actuator::controllable_in_auto`] before dispatching.
pub struct CommandService {
    channel: Arc<dyn DeviceChannel>,
    state: Arc<MonitorState>,
}

impl CommandService {
    pub fn new(channel: Arc<dyn DeviceChannel>, state: Arc<MonitorState>) -> Self {
        Self { channel, state }
    }

    /// Switch an actuator. The snapshot is updated optimistically only after
    /// the channel accepted the command; a failed send leaves it untouched
    /// and the error goes back to the caller, no automatic retries.
    pub async fn send_control(
        &self,
        actuator: Actuator,
        action: SwitchState,
        duration: Option<u32>,
    ) -> Result<(), ChannelError> {
        let command = DeviceCommand::Control {
            device: actuator,
            action,
            duration,
        };
        self.channel.send_command(&command).await?;

        self.state.apply_control(actuator, action, duration).await;
        tracing::info!("Sent {} -> {:?}", actuator, action);
        Ok(())
    }

    /// Switch an actuator on for the window carried by `timer`.
    pub async fn send_timed_control(
        &self,
        actuator: Actuator,
        timer: &TimerSetting,
    ) -> Result<(), ChannelError> {
        self.send_control(actuator, SwitchState::On, timer.duration_minutes())
            .await
    }

    /// Ask the device to change between automatic and manual mode. The
    /// authoritative mode arrives with the next telemetry payload, so the
    /// snapshot is not touched here.
    pub async fn send_mode_change(&self, mode: ControlMode) -> Result<(), ChannelError> {
        self.channel
            .send_command(&DeviceCommand::SetMode { mode })
            .await?;

        tracing::info!("Requested control mode {:?}", mode);
        Ok(())
    }
}
