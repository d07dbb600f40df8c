//! Channel, axis, and state enums shared across the mixer core.
//!
//! All enums use `#[repr(u8)]` for compact storage in the settings cache and
//! for straightforward wire transport if a caller chooses to serialize them.

use serde::{Deserialize, Serialize};

/// One output channel's function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelType {
    /// Channel is not wired to anything; always commanded to `-1`.
    Disabled = 0,
    /// Spinning ESC/motor output.
    Motor = 1,
    /// Plain servo output.
    Servo = 2,
    /// Gimbal pitch axis, sourced from `CameraDesired`.
    CameraPitch = 3,
    /// Gimbal roll axis, sourced from `CameraDesired`.
    CameraRoll = 4,
    /// Gimbal yaw axis, sourced from `CameraDesired`.
    CameraYaw = 5,
}

impl ChannelType {
    /// Convert from raw `u8`. Returns `None` for an out-of-range value so
    /// callers can route it through the "unknown channel type" failsafe path
    /// instead of panicking (§4.3 step 2).
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Motor),
            2 => Some(Self::Servo),
            3 => Some(Self::CameraPitch),
            4 => Some(Self::CameraRoll),
            5 => Some(Self::CameraYaw),
            _ => None,
        }
    }

    /// Motor and Servo are the only types that read the mixer matrix;
    /// every other row is zero-filled (invariant in spec §3).
    #[inline]
    pub const fn is_mixed(&self) -> bool {
        matches!(self, Self::Motor | Self::Servo)
    }

    #[inline]
    pub const fn is_camera(&self) -> bool {
        matches!(self, Self::CameraPitch | Self::CameraRoll | Self::CameraYaw)
    }
}

impl Default for ChannelType {
    fn default() -> Self {
        Self::Disabled
    }
}

/// One column of the mixer matrix, in the canonical order used everywhere
/// a `[f32; NAXIS]` row is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    ThrottleCurve1 = 0,
    ThrottleCurve2 = 1,
    Roll = 2,
    Pitch = 3,
    Yaw = 4,
    Accessory0 = 5,
    Accessory1 = 6,
    Accessory2 = 7,
}

impl Axis {
    pub const ALL: [Axis; crate::consts::NAXIS] = [
        Axis::ThrottleCurve1,
        Axis::ThrottleCurve2,
        Axis::Roll,
        Axis::Pitch,
        Axis::Yaw,
        Axis::Accessory0,
        Axis::Accessory1,
        Axis::Accessory2,
    ];

    #[inline]
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

/// Source feeding curve 2 (the auxiliary/collective curve), selectable per
/// `MixerSettings::Curve2Source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Curve2Source {
    Throttle = 0,
    Roll = 1,
    Pitch = 2,
    Yaw = 3,
    Collective = 4,
    Accessory0 = 5,
    Accessory1 = 6,
    Accessory2 = 7,
}

impl Default for Curve2Source {
    fn default() -> Self {
        Self::Throttle
    }
}

/// Airframe category. Only `HeliCP` changes the Input Normalizer's
/// throttle/collective source selection (§3 Curves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum AirframeType {
    #[default]
    Generic = 0,
    HeliCP = 1,
}

/// Mirrors `FlightStatus::Armed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ArmedState {
    #[default]
    Disarmed = 0,
    Arming = 1,
    Armed = 2,
}

/// Mirrors `FlightStatus::FlightMode`; the core only cares whether the
/// current mode is `Failsafe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum FlightMode {
    #[default]
    Manual = 0,
    Stabilized = 1,
    Auto = 2,
    Failsafe = 3,
}

/// The operator interlock word (§4.4). A second agent drives this from
/// `Ok` to `StopRequest` and waits for `Stopped` before performing an
/// intrusive operation such as reconfiguring timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum InterlockState {
    #[default]
    Ok = 0,
    StopRequest = 1,
    Stopped = 2,
}

impl InterlockState {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::StopRequest,
            2 => Self::Stopped,
            _ => Self::Ok,
        }
    }
}
