//! Failsafe output table (§4.4 "Failsafe policy").
//!
//! Every code path that exits the steady loop early — input starvation,
//! interlock stop, unknown channel type — must commit these values
//! before yielding (§9 "Scoped failsafe acquisition").

use crate::consts::NCHAN;
use crate::settings::ActuatorSettings;
use crate::types::ChannelType;

/// Compute the failsafe pulse for every channel: Motor → `min`,
/// Servo → `neutral`, Disabled → normalized `-1` (calibrated), Camera
/// axes → centered (normalized `0`, calibrated).
pub fn failsafe_pulses(
    channel_type: &[ChannelType; NCHAN],
    settings: &ActuatorSettings,
) -> [f32; NCHAN] {
    let mut pulses = [0.0f32; NCHAN];
    for r in 0..NCHAN {
        pulses[r] = match channel_type[r] {
            ChannelType::Motor => settings.channel_min[r],
            ChannelType::Servo => settings.channel_neutral[r],
            ChannelType::Disabled => {
                crate::postprocess::scale_channel(-1.0, settings.channel_min[r], settings.channel_neutral[r], settings.channel_max[r])
            }
            ChannelType::CameraPitch | ChannelType::CameraRoll | ChannelType::CameraYaw => {
                crate::postprocess::scale_channel(0.0, settings.channel_min[r], settings.channel_neutral[r], settings.channel_max[r])
            }
        };
    }
    pulses
}
