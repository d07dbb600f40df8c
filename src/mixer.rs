//! Settings Cache & Mixer Compiler (§4.1).
//!
//! Owns the compiled mixer matrix `M`, the per-channel type table, and the
//! curve tables. Rebuilt only when a dirty flag says the backing settings
//! changed; every other tick reads the cached state without touching
//! settings objects at all.

use nalgebra::{Rotation3, Vector3};

use crate::consts::{K1, K2, NAXIS, NCHAN};
use crate::interfaces::PwmDriver;
use crate::settings::{ActuatorSettings, MixerSettings, SystemSettings};
use crate::types::{AirframeType, Axis, ChannelType, Curve2Source};

/// Compiled mixer state: matrix, channel types, curves, airframe. This is
/// the "global mutable state" of §9, narrowed to what the compiler owns;
/// it lives entirely inside the task (no locks needed, per §9).
#[derive(Debug, Clone)]
pub struct Mixer {
    pub matrix: [[f32; NAXIS]; NCHAN],
    pub channel_type: [ChannelType; NCHAN],
    /// Geometric tilt per Motor row, radians. Reserved hook (§4.1): no
    /// settings field currently feeds this, so every row is `0.0` and the
    /// transform is a no-op in practice.
    pub tilt_angle: [f32; NCHAN],
    pub curve1: [f32; K1],
    pub curve2: [f32; K2],
    pub curve2_source: Curve2Source,
    pub airframe_type: AirframeType,
}

impl Default for Mixer {
    fn default() -> Self {
        Self {
            matrix: [[0.0; NAXIS]; NCHAN],
            channel_type: [ChannelType::Disabled; NCHAN],
            tilt_angle: [0.0; NCHAN],
            curve1: [0.0; K1],
            curve2: [0.0; K2],
            curve2_source: Curve2Source::default(),
            airframe_type: AirframeType::default(),
        }
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a fresh `MixerSettings`/`SystemSettings` pair
    /// (§4.1 "Build matrix M", "Curve rebuild", "Refresh the airframe-type
    /// snapshot"). Never fails: shape mismatches are impossible once the
    /// settings have passed `MixerSettings::validate`, which the caller is
    /// expected to have already run (§4.1 "Failure" keeps the previous
    /// cache on invalid input, i.e. this function is simply not called).
    pub fn rebuild(&mut self, mixer: &MixerSettings, system: &SystemSettings) {
        for r in 0..NCHAN {
            let row = &mixer.rows[r];
            let ctype: ChannelType = row.channel_type.into();
            self.channel_type[r] = ctype;

            if !ctype.is_mixed() {
                self.matrix[r] = [0.0; NAXIS];
                continue;
            }
            for c in 0..NAXIS {
                self.matrix[r][c] = row.vector[c] as f32 / 128.0;
            }
            if ctype == ChannelType::Motor && self.tilt_angle[r] != 0.0 {
                apply_tilt_transform(&mut self.matrix[r], self.tilt_angle[r]);
            }
        }

        self.curve1 = mixer.throttle_curve1;
        self.curve2 = mixer.throttle_curve2;
        self.curve2_source = mixer.curve2_source;
        self.airframe_type = system.airframe_type;
    }
}

/// Rewrite a Motor row for a rotor tilted by `theta` about the body Y
/// axis (§4.1 "Tilt transform"). Skipped by the caller whenever
/// `theta == 0`; also undefined (and must be skipped) when the row's
/// curve-1 coefficient is zero, since `d` divides by it (§9 open question).
fn apply_tilt_transform(row: &mut [f32; NAXIS], theta: f32) {
    let c1 = -row[Axis::ThrottleCurve1.index()];
    if c1 == 0.0 {
        return;
    }
    let ro = row[Axis::Roll.index()];
    let pi = row[Axis::Pitch.index()];
    let ya = row[Axis::Yaw.index()];

    let force = Vector3::new(0.0, 0.0, -c1);
    let torque = Vector3::new(0.0, 0.0, ya);
    let d = Vector3::new(pi / c1, -ro / c1, 0.0);

    let r_y = Rotation3::from_axis_angle(&Vector3::y_axis(), theta);
    let force_rot = r_y * force;
    let torque_rot = r_y * torque;
    let m_rot = d.cross(&force_rot) + torque_rot;

    row[Axis::ThrottleCurve1.index()] = force_rot.z;
    row[Axis::Roll.index()] = m_rot.x;
    row[Axis::Pitch.index()] = m_rot.y;
    row[Axis::Yaw.index()] = m_rot.z;
}

/// Program the PWM driver with per-bank frequencies and per-channel
/// range on an actuator-settings change (§4.1 "PWM bank setup").
pub fn program_pwm_banks(driver: &mut impl PwmDriver, settings: &ActuatorSettings) {
    driver.servo_set_mode(
        &settings.timer_update_freq,
        &settings.channel_min,
        &settings.channel_max,
    );
}
