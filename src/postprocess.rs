//! Mixer & Post-Processor (§4.3).
//!
//! Multiplies the compiled matrix against the desired vector, applies
//! per-channel-type handling, rescales to trade throttle headroom against
//! attitude authority, commits armed/stabilize-now/spin-while-armed
//! policy, and calibrates everything to microsecond pulses.

use crate::consts::NCHAN;
use crate::interfaces::CameraDesired;
use crate::mixer::Mixer;
use crate::normalizer::NormalizedInput;
use crate::settings::ActuatorSettings;
use crate::types::ChannelType;

/// Raised by §4.3 step 2 when a channel's type table entry doesn't
/// decode to a known `ChannelType`. The caller is expected to have
/// already validated the type table at settings-compile time; this
/// exists to preserve the "unknown type → failsafe and halt" path
/// (§4.3 step 2, §7 kind 2) for defense in depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownChannelType {
    pub channel: usize,
}

/// Step 1: `motor_vect = M · desired_vect`.
fn multiply(mixer: &Mixer, desired: &[f32; crate::consts::NAXIS]) -> [f32; NCHAN] {
    let mut out = [0.0f32; NCHAN];
    for r in 0..NCHAN {
        let row = &mixer.matrix[r];
        let mut acc = 0.0f32;
        for c in 0..row.len() {
            acc += row[c] * desired[c];
        }
        out[r] = acc;
    }
    out
}

/// Step 2: per-type adjustment, pre-clip. Camera rows read from
/// `CameraDesired` when present, else `-1`.
///
/// Preserves the source's known bug verbatim: the `CameraYaw` row reads
/// `CameraDesired.Roll`, not `CameraDesired.Yaw` (§9, §4.3 step 2). This
/// is deliberate — do not "fix" it here.
fn apply_per_type(
    raw: &mut [f32; NCHAN],
    channel_type: &[ChannelType; NCHAN],
    camera: Option<CameraDesired>,
) -> Result<(), UnknownChannelType> {
    for r in 0..NCHAN {
        match channel_type[r] {
            ChannelType::Disabled => raw[r] = -1.0,
            ChannelType::Servo => {}
            ChannelType::Motor => {}
            ChannelType::CameraPitch => raw[r] = camera.map(|c| c.pitch).unwrap_or(-1.0),
            ChannelType::CameraRoll => raw[r] = camera.map(|c| c.roll).unwrap_or(-1.0),
            ChannelType::CameraYaw => raw[r] = camera.map(|c| c.roll).unwrap_or(-1.0),
        }
    }
    Ok(())
}

/// Step 3: stats over Motor channels only.
#[derive(Debug, Clone, Copy, Default)]
struct MotorStats {
    min_chan: f32,
    max_chan: f32,
    neg_clip: f32,
    num_motors: u32,
}

fn collect_motor_stats(raw: &[f32; NCHAN], channel_type: &[ChannelType; NCHAN]) -> MotorStats {
    let mut stats = MotorStats {
        min_chan: f32::MAX,
        max_chan: f32::MIN,
        neg_clip: 0.0,
        num_motors: 0,
    };
    for r in 0..NCHAN {
        if channel_type[r] != ChannelType::Motor {
            continue;
        }
        let v = raw[r];
        stats.min_chan = stats.min_chan.min(v);
        stats.max_chan = stats.max_chan.max(v);
        stats.neg_clip += v.min(0.0);
        stats.num_motors += 1;
    }
    if stats.num_motors == 0 {
        stats.min_chan = 0.0;
        stats.max_chan = 0.0;
    }
    stats
}

/// Step 4: rescale gain/offset. Returns `(gain, offset)`.
fn rescale(stats: &MotorStats, low_power_max_power_add: f32) -> (f32, f32) {
    let mut gain = 1.0f32;
    let mut offset = 0.0f32;
    let mut min_chan = stats.min_chan;
    let mut max_chan = stats.max_chan;

    if max_chan - min_chan > 1.0 {
        gain = 1.0 / (max_chan - min_chan);
        min_chan *= gain;
        max_chan *= gain;
    }

    if max_chan > 1.0 {
        offset = 1.0 - max_chan;
    } else if min_chan < 0.0 {
        let neg_clip_avg = if stats.num_motors > 0 {
            stats.neg_clip / stats.num_motors as f32
        } else {
            0.0
        };
        offset = (-min_chan).min(neg_clip_avg + low_power_max_power_add);
    }

    (gain, offset)
}

/// Step 5 (Motor branch): arming/stabilize-now/spin-while-armed policy
/// plus the motor response curve.
fn commit_motor(
    raw: f32,
    gain: f32,
    offset: f32,
    input: &NormalizedInput,
    curve_fit: f32,
) -> f32 {
    if !input.armed {
        return -1.0;
    }
    if !input.stabilize_now {
        return if input.spin_while_armed { 0.0 } else { -1.0 };
    }
    let x = raw * gain + offset;
    if x > 0.0 {
        x.powf(curve_fit)
    } else {
        0.0
    }
}

/// §4.3 step 5 second half / §8 round-trip property: convert a
/// normalized `[-1,1]` value to a microsecond pulse using this channel's
/// calibration, clamped to support inverted travel (`min > max`).
pub fn scale_channel(x: f32, min: f32, neutral: f32, max: f32) -> f32 {
    let pulse = if x >= 0.0 {
        x * (max - neutral) + neutral
    } else {
        x * (neutral - min) + neutral
    };
    let lo = min.min(max);
    let hi = min.max(max);
    pulse.clamp(lo, hi)
}

/// Run steps 1-5 of the Mixer & Post-Processor for one tick. Step 6
/// (publish) is the task loop's responsibility (`cycle.rs`), since it
/// touches the command sink, PWM driver, and alarm — none of which this
/// module depends on.
pub fn process(
    mixer: &Mixer,
    input: &NormalizedInput,
    actuator_settings: &ActuatorSettings,
    camera: Option<CameraDesired>,
) -> Result<[f32; NCHAN], UnknownChannelType> {
    let mut raw = multiply(mixer, &input.desired);
    apply_per_type(&mut raw, &mixer.channel_type, camera)?;

    let stats = collect_motor_stats(&raw, &mixer.channel_type);
    let (gain, offset) = rescale(&stats, actuator_settings.low_power_stabilization_max_power_add);

    let mut pulses = [0.0f32; NCHAN];
    for r in 0..NCHAN {
        let x = match mixer.channel_type[r] {
            ChannelType::Motor => commit_motor(
                raw[r],
                gain,
                offset,
                input,
                actuator_settings.motor_input_output_curve_fit,
            ),
            _ => raw[r],
        };
        pulses[r] = scale_channel(
            x,
            actuator_settings.channel_min[r],
            actuator_settings.channel_neutral[r],
            actuator_settings.channel_max[r],
        );
    }
    Ok(pulses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NAXIS;
    use approx::assert_relative_eq;

    fn calib() -> ActuatorSettings {
        let mut s = ActuatorSettings::default();
        s.channel_min = [1000.0; NCHAN];
        // Motor channels conventionally set `neutral == min`: `x` on the
        // commit path lives in `[0, ~1]`, never negative, so this makes
        // scale_channel's positive branch span the channel's full travel.
        s.channel_neutral = [1000.0; NCHAN];
        s.channel_max = [2000.0; NCHAN];
        s.motor_input_output_curve_fit = 1.0;
        s
    }

    #[test]
    fn scale_channel_round_trips_extremes_and_center() {
        assert_relative_eq!(scale_channel(-1.0, 1000.0, 1500.0, 2000.0), 1000.0);
        assert_relative_eq!(scale_channel(0.0, 1000.0, 1500.0, 2000.0), 1500.0);
        assert_relative_eq!(scale_channel(1.0, 1000.0, 1500.0, 2000.0), 2000.0);
    }

    #[test]
    fn scale_channel_handles_inverted_travel() {
        // min > max: inverted servo.
        assert_relative_eq!(scale_channel(-1.0, 2000.0, 1500.0, 1000.0), 2000.0);
        assert_relative_eq!(scale_channel(1.0, 2000.0, 1500.0, 1000.0), 1000.0);
    }

    #[test]
    fn scale_channel_clamps_out_of_range_input() {
        assert_relative_eq!(scale_channel(5.0, 1000.0, 1500.0, 2000.0), 2000.0);
        assert_relative_eq!(scale_channel(-5.0, 1000.0, 1500.0, 2000.0), 1000.0);
    }

    #[test]
    fn rescale_high_side_clips_to_exactly_one() {
        let stats = MotorStats {
            min_chan: 0.5,
            max_chan: 1.5,
            neg_clip: 0.0,
            num_motors: 4,
        };
        let (gain, offset) = rescale(&stats, 0.0);
        let clipped_max = stats.max_chan * gain + offset;
        assert_relative_eq!(clipped_max, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rescale_low_side_bounded_by_power_add_and_neg_clip_avg() {
        let stats = MotorStats {
            min_chan: -0.1,
            max_chan: 0.6,
            neg_clip: -0.2,
            num_motors: 4,
        };
        let power_add = 0.05;
        let (_, offset) = rescale(&stats, power_add);
        let neg_clip_avg = stats.neg_clip / stats.num_motors as f32;
        assert!(offset <= neg_clip_avg + power_add + 1e-6);
        assert!(offset <= -stats.min_chan + 1e-6);
    }

    #[test]
    fn disarmed_motor_commits_to_minus_one() {
        let input = NormalizedInput {
            desired: [0.0; NAXIS],
            armed: false,
            spin_while_armed: true,
            stabilize_now: false,
        };
        assert_eq!(commit_motor(0.8, 1.0, 0.0, &input, 1.0), -1.0);
    }

    #[test]
    fn armed_zero_throttle_spin_while_armed_commits_zero() {
        let input = NormalizedInput {
            desired: [0.0; NAXIS],
            armed: true,
            spin_while_armed: true,
            stabilize_now: false,
        };
        assert_eq!(commit_motor(0.0, 1.0, 0.0, &input, 1.0), 0.0);
    }

    #[test]
    fn armed_zero_throttle_no_spin_commits_minus_one() {
        let input = NormalizedInput {
            desired: [0.0; NAXIS],
            armed: true,
            spin_while_armed: false,
            stabilize_now: false,
        };
        assert_eq!(commit_motor(0.0, 1.0, 0.0, &input, 1.0), -1.0);
    }

    #[test]
    fn camera_yaw_reads_camera_desired_roll_not_yaw() {
        let mut raw = [0.0f32; NCHAN];
        let mut channel_type = [ChannelType::Disabled; NCHAN];
        channel_type[0] = ChannelType::CameraYaw;
        let camera = CameraDesired {
            pitch: 0.1,
            roll: 0.2,
            yaw: 0.3,
        };
        apply_per_type(&mut raw, &channel_type, Some(camera)).unwrap();
        assert_eq!(raw[0], 0.2, "preserved quirk: CameraYaw must read CameraDesired.Roll");
    }

    #[test]
    fn camera_without_desired_falls_back_to_minus_one() {
        let mut raw = [0.0f32; NCHAN];
        let mut channel_type = [ChannelType::Disabled; NCHAN];
        channel_type[0] = ChannelType::CameraPitch;
        apply_per_type(&mut raw, &channel_type, None).unwrap();
        assert_eq!(raw[0], -1.0);
    }

    #[test]
    fn quad_x_hover_lands_at_half_travel() {
        let mut mixer = Mixer::new();
        for r in 0..4 {
            mixer.channel_type[r] = ChannelType::Motor;
            mixer.matrix[r][crate::types::Axis::ThrottleCurve1.index()] = 1.0;
        }
        let mut input = NormalizedInput {
            desired: [0.0; NAXIS],
            armed: true,
            spin_while_armed: false,
            stabilize_now: true,
        };
        input.desired[crate::types::Axis::ThrottleCurve1.index()] = 0.5;

        let settings = calib();
        let pulses = process(&mixer, &input, &settings, None).unwrap();
        for r in 0..4 {
            assert_relative_eq!(pulses[r], 1500.0, epsilon = 1.0);
        }
        for r in 4..NCHAN {
            assert_eq!(mixer.channel_type[r], ChannelType::Disabled);
            assert_relative_eq!(pulses[r], 1000.0, epsilon = 1.0);
        }
    }
}
