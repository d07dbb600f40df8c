//! External object shapes and driver traits the core consumes (§6).
//!
//! The transport that delivers these objects — the publish/subscribe
//! broker, the PWM/DShot peripheral driver, the watchdog, and the alarm
//! subsystem — is out of scope (§1). This module only defines the shapes
//! and the narrow trait boundaries the task loop calls through, so the
//! core can be exercised and tested without any of that machinery.

use crate::consts::{NACCESSORY, NBANK, NCHAN};
use crate::types::{ArmedState, FlightMode};

/// Torque/thrust command from the stabilization layer (§6).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    /// `[0,1]`.
    pub thrust: f32,
}

/// Arming and mode snapshot (§6).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlightStatus {
    pub armed: ArmedState,
    pub flight_mode: FlightMode,
}

/// Manual stick/collective input, used directly by HeliCP airframes and
/// for accessory pass-through (§4.2 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManualControlCommand {
    pub throttle: f32,
    pub collective: f32,
    pub accessory: [f32; NACCESSORY],
}

/// Gimbal command, optional — absent means camera channels fall back to
/// `-1` (§4.3 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraDesired {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Per-channel committed output plus jitter bookkeeping (§6, §4.3 step 6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    pub channel: [f32; NCHAN],
    /// This tick's cycle time [ms].
    pub update_time: f32,
    /// Largest `update_time` ever observed (§9: peak, not last-if-worse).
    pub max_update_time: f32,
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        Self {
            channel: [0.0; NCHAN],
            update_time: 0.0,
            max_update_time: 0.0,
        }
    }
}

/// Severity passed to `alarm_set` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSeverity {
    Clear,
    Warning,
    Critical,
}

/// The single alarm group this core owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmGroup {
    Actuator,
}

/// Alarm subsystem boundary (§6). A real implementation publishes an
/// alarm object; tests use an in-memory recorder.
pub trait AlarmSink {
    fn set(&mut self, group: AlarmGroup, severity: AlarmSeverity);
}

/// Watchdog boundary (§6): periodic proof-of-life kick.
pub trait Watchdog {
    fn kick(&mut self);
}

/// PWM/DShot peripheral driver boundary (§6, §4.1 "PWM bank setup").
///
/// `servo_set_mode` reconfigures bank frequencies and per-channel
/// range/idle on an actuator-settings change; `servo_set` stages one
/// channel's pulse; `servo_update` latches the staged batch.
pub trait PwmDriver {
    fn servo_set_mode(&mut self, freqs: &[u16; NBANK], min: &[f32; NCHAN], max: &[f32; NCHAN]);
    fn servo_set(&mut self, channel: usize, pulse_us: f32);
    fn servo_update(&mut self);
}

/// Input-queue boundary (§4.4 step 4, §5). The queue carries only "an
/// `ActuatorDesired` arrived," not the payload itself (§9 "Queue of
/// events → single cadence anchor"); the payload is pulled separately via
/// `InputSource`. `recv_timeout` returns `false` on timeout.
pub trait InputQueue {
    fn recv_timeout(&mut self, timeout_ms: u64) -> bool;
}

/// Pull-side source for the shared objects the normalizer reads each
/// tick, plus the dirty-flag polling the settings compiler uses (§4.1,
/// §4.2, §5). All reads are non-blocking snapshots of shared state.
pub trait InputSource {
    fn actuator_desired(&self) -> ActuatorDesired;
    fn flight_status(&self) -> FlightStatus;
    fn manual_control(&self) -> ManualControlCommand;
    fn camera_desired(&self) -> Option<CameraDesired>;

    /// The operator interlock word (§4.4 step 6, §6 "Operator interlock").
    /// Written by a second agent through the same atomic-word mechanism as
    /// the dirty flags below; read once per tick by `CycleRunner`.
    fn interlock_word(&self) -> crate::types::InterlockState;

    fn take_flight_status_dirty(&mut self) -> bool;
    fn take_manual_control_dirty(&mut self) -> bool;
    fn take_actuator_settings_dirty(&mut self) -> bool;
    fn take_mixer_settings_dirty(&mut self) -> bool;
}

/// Output-side sink for `ActuatorCommand`. `is_writable` models the "GCS
/// servo configuration override" case (§4.3 step 6, §7 kind 5): when an
/// external owner has taken over the object, the core must read back its
/// externally-set values instead of publishing its own.
pub trait CommandSink {
    fn is_writable(&self) -> bool;
    fn publish(&mut self, command: ActuatorCommand);
    fn read_back(&self) -> ActuatorCommand;
}
