//! Input Normalizer (§4.2).
//!
//! Turns the raw `ActuatorDesired`/`ManualControlCommand`/`FlightStatus`
//! objects into the `[f32; NAXIS]` desired column vector the mixer
//! multiplies against. Owns the latched state that survives across ticks:
//! cached flight status, latched manual throttle, and the hang-time timer.

use crate::consts::{NACCESSORY, NAXIS};
use crate::curves::piecewise_linear;
use crate::interfaces::{ActuatorDesired, FlightStatus, InputSource, ManualControlCommand};
use crate::mixer::Mixer;
use crate::settings::ActuatorSettings;
use crate::types::{Axis, ArmedState, AirframeType, Curve2Source, FlightMode};

/// State latched across ticks by the normalizer (§3 "Global state").
#[derive(Debug, Clone, Default)]
pub struct NormalizerState {
    pub flight_status: FlightStatus,
    pub manual_control: ManualControlCommand,
    /// System time [ms] of the last tick where `stabilize_now` was true
    /// from positive throttle, or `None` once the hang-time window has
    /// elapsed and been cleared (§4.2 step 6).
    pub last_pos_throttle_time_ms: Option<u64>,
}

/// Result handed to the post-processor: the desired vector plus the
/// arming facts it needs for per-channel commit (§4.3 step 5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedInput {
    pub desired: [f32; NAXIS],
    pub armed: bool,
    pub spin_while_armed: bool,
    pub stabilize_now: bool,
}

/// Run one tick of the Input Normalizer (§4.2, steps 1-8).
pub fn normalize(
    state: &mut NormalizerState,
    source: &mut dyn InputSource,
    mixer: &Mixer,
    actuator_settings: &ActuatorSettings,
    now_ms: u64,
) -> NormalizedInput {
    let desired_in: ActuatorDesired = source.actuator_desired();

    if source.take_flight_status_dirty() {
        state.flight_status = source.flight_status();
    }
    let mut acc = [0.0f32; NACCESSORY];
    if source.take_manual_control_dirty() {
        state.manual_control = source.manual_control();
    }
    acc.copy_from_slice(&state.manual_control.accessory);

    let mut throttle = select_throttle(mixer.airframe_type, &state.flight_status, &state.manual_control, &desired_in);

    let armed = state.flight_status.armed == ArmedState::Armed;
    let spin_while_armed = actuator_settings.motors_spin_while_armed;
    let mut stabilize_now = armed && throttle > 0.0;

    apply_hang_time(state, actuator_settings, &mut stabilize_now, &mut throttle, now_ms);

    let v1 = piecewise_linear(throttle, &mixer.curve1, (0.0, 1.0));
    let curve2_input = select_curve2_source(mixer.curve2_source, mixer.airframe_type, &state.manual_control, &desired_in);
    let v2 = piecewise_linear(curve2_input, &mixer.curve2, (-1.0, 1.0));

    let mut desired = [0.0f32; NAXIS];
    desired[Axis::ThrottleCurve1.index()] = v1;
    desired[Axis::ThrottleCurve2.index()] = v2;
    desired[Axis::Roll.index()] = desired_in.roll;
    desired[Axis::Pitch.index()] = desired_in.pitch;
    desired[Axis::Yaw.index()] = desired_in.yaw;
    desired[Axis::Accessory0.index()] = acc[0];
    desired[Axis::Accessory1.index()] = acc[1];
    desired[Axis::Accessory2.index()] = acc[2];

    NormalizedInput {
        desired,
        armed,
        spin_while_armed,
        stabilize_now,
    }
}

/// §4.2 step 4: throttle source selection, with the HeliCP special case.
fn select_throttle(
    airframe: AirframeType,
    flight_status: &FlightStatus,
    manual: &ManualControlCommand,
    desired: &ActuatorDesired,
) -> f32 {
    match airframe {
        AirframeType::HeliCP => {
            if flight_status.flight_mode == FlightMode::Failsafe {
                -1.0
            } else {
                manual.throttle
            }
        }
        AirframeType::Generic => desired.thrust,
    }
}

/// §3 "Curves": HeliCP swaps `Throttle`/`Collective` sources versus every
/// other airframe.
fn select_curve2_source(
    source: Curve2Source,
    airframe: AirframeType,
    manual: &ManualControlCommand,
    desired: &ActuatorDesired,
) -> f32 {
    let raw = match source {
        Curve2Source::Throttle => {
            if airframe == AirframeType::HeliCP {
                manual.throttle
            } else {
                desired.thrust
            }
        }
        Curve2Source::Collective => {
            if airframe == AirframeType::HeliCP {
                desired.thrust
            } else {
                manual.collective
            }
        }
        Curve2Source::Roll => desired.roll,
        Curve2Source::Pitch => desired.pitch,
        Curve2Source::Yaw => desired.yaw,
        Curve2Source::Accessory0 => manual.accessory[0],
        Curve2Source::Accessory1 => manual.accessory[1],
        Curve2Source::Accessory2 => manual.accessory[2],
    };
    raw.clamp(-1.0, 1.0)
}

/// §4.2 step 6: low-power hang-time. Continues stabilizing for a
/// configured window after commanded throttle returns to zero.
fn apply_hang_time(
    state: &mut NormalizerState,
    settings: &ActuatorSettings,
    stabilize_now: &mut bool,
    throttle: &mut f32,
    now_ms: u64,
) {
    if settings.low_power_stabilization_max_time <= 0.0 {
        return;
    }
    if *stabilize_now {
        state.last_pos_throttle_time_ms = Some(now_ms);
        return;
    }
    let window_ms = (1000.0 * settings.low_power_stabilization_max_time) as u64;
    match state.last_pos_throttle_time_ms {
        Some(t) if now_ms.saturating_sub(t) < window_ms => {
            *stabilize_now = true;
            *throttle = 0.0;
        }
        Some(_) => {
            state.last_pos_throttle_time_ms = None;
        }
        None => {}
    }
}
