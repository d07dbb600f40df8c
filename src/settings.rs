//! Settings structures consumed by the Settings Cache & Mixer Compiler (§4.1, §6).
//!
//! These mirror the three externally-owned objects the core observes:
//! `ActuatorSettings`, `MixerSettings`, `SystemSettings`. The object-broker
//! transport that delivers them is out of scope (§1); this module only
//! defines their shape, TOML loading for local testing/simulation, and the
//! bounds validation the compiler runs before accepting a new snapshot.

use serde::{Deserialize, Serialize};

use crate::consts::{K1, K2, NACCESSORY, NAXIS, NBANK, NCHAN};
use crate::error::ConfigError;
use crate::types::{AirframeType, ChannelType, Curve2Source};

// ─── ActuatorSettings ───────────────────────────────────────────────

/// Per-channel calibration and motor behavior (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorSettings {
    /// Minimum pulse per channel [µs]. May exceed `channel_max` (inverted travel).
    #[serde(default = "default_channel_min")]
    pub channel_min: [f32; NCHAN],
    /// Maximum pulse per channel [µs].
    #[serde(default = "default_channel_max")]
    pub channel_max: [f32; NCHAN],
    /// Neutral/center pulse per channel [µs].
    #[serde(default = "default_channel_neutral")]
    pub channel_neutral: [f32; NCHAN],
    /// Update frequency per PWM/DShot bank [Hz].
    #[serde(default = "default_timer_update_freq")]
    pub timer_update_freq: [u16; NBANK],
    /// If true, armed motors with zero throttle idle at `neutral` instead of `min`.
    #[serde(default)]
    pub motors_spin_while_armed: bool,
    /// Hang-time window after throttle returns to zero [s]. `0` disables it.
    #[serde(default)]
    pub low_power_stabilization_max_time: f32,
    /// Extra throttle the rescale step may synthesize to recover from
    /// low-side clipping, on top of the average negative clip.
    #[serde(default)]
    pub low_power_stabilization_max_power_add: f32,
    /// Exponent `k` in the motor response curve `x ← x^k`.
    #[serde(default = "default_curve_fit")]
    pub motor_input_output_curve_fit: f32,
}

fn default_channel_min() -> [f32; NCHAN] {
    [1000.0; NCHAN]
}
fn default_channel_max() -> [f32; NCHAN] {
    [2000.0; NCHAN]
}
fn default_channel_neutral() -> [f32; NCHAN] {
    [1500.0; NCHAN]
}
fn default_timer_update_freq() -> [u16; NBANK] {
    [400; NBANK]
}
fn default_curve_fit() -> f32 {
    1.0
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            channel_min: default_channel_min(),
            channel_max: default_channel_max(),
            channel_neutral: default_channel_neutral(),
            timer_update_freq: default_timer_update_freq(),
            motors_spin_while_armed: false,
            low_power_stabilization_max_time: 0.0,
            low_power_stabilization_max_power_add: 0.0,
            motor_input_output_curve_fit: default_curve_fit(),
        }
    }
}

impl ActuatorSettings {
    /// Bounds/shape checks run before the compiler accepts a new snapshot
    /// (§4.1 "Failure": invalid combinations keep the previous cache).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for r in 0..NCHAN {
            if self.channel_neutral[r].is_nan()
                || self.channel_min[r].is_nan()
                || self.channel_max[r].is_nan()
            {
                return Err(ConfigError::Validation(format!(
                    "channel {r} has a NaN calibration value"
                )));
            }
        }
        if self.motor_input_output_curve_fit < 1.0 {
            return Err(ConfigError::Validation(format!(
                "motor_input_output_curve_fit {} must be >= 1.0",
                self.motor_input_output_curve_fit
            )));
        }
        if self.low_power_stabilization_max_time < 0.0 {
            return Err(ConfigError::Validation(
                "low_power_stabilization_max_time must be >= 0".into(),
            ));
        }
        if self.low_power_stabilization_max_power_add < 0.0 {
            return Err(ConfigError::Validation(
                "low_power_stabilization_max_power_add must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

// ─── MixerSettings ──────────────────────────────────────────────────

/// One output channel's type and axis coefficient row (raw, pre-scale).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MixerRow {
    #[serde(rename = "type")]
    pub channel_type: ChannelTypeSetting,
    /// Raw int8 coefficients, scaled by 1/128 when the matrix is built (§4.1).
    pub vector: [i16; NAXIS],
}

impl Default for MixerRow {
    fn default() -> Self {
        Self {
            channel_type: ChannelTypeSetting::Disabled,
            vector: [0; NAXIS],
        }
    }
}

/// TOML-friendly mirror of `ChannelType` (string variants read better in
/// a settings file than raw integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChannelTypeSetting {
    Disabled,
    Motor,
    Servo,
    CameraPitch,
    CameraRoll,
    CameraYaw,
}

impl From<ChannelTypeSetting> for ChannelType {
    fn from(v: ChannelTypeSetting) -> Self {
        match v {
            ChannelTypeSetting::Disabled => ChannelType::Disabled,
            ChannelTypeSetting::Motor => ChannelType::Motor,
            ChannelTypeSetting::Servo => ChannelType::Servo,
            ChannelTypeSetting::CameraPitch => ChannelType::CameraPitch,
            ChannelTypeSetting::CameraRoll => ChannelType::CameraRoll,
            ChannelTypeSetting::CameraYaw => ChannelType::CameraYaw,
        }
    }
}

/// Mixer matrix source, curve tables, and curve-2 routing (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerSettings {
    /// One row per output channel, in channel order `0..NCHAN`.
    #[serde(default = "default_mixer_rows")]
    pub rows: [MixerRow; NCHAN],
    /// Curve 1 (thrust) knots, uniformly spaced over `[0,1]`.
    #[serde(default = "default_curve1")]
    pub throttle_curve1: [f32; K1],
    /// Curve 2 (auxiliary) knots, uniformly spaced over `[-1,1]`.
    #[serde(default = "default_curve2")]
    pub throttle_curve2: [f32; K2],
    /// Which axis feeds curve 2.
    #[serde(default)]
    pub curve2_source: Curve2Source,
    /// Number of accessory channels this mixer actually routes. Must be
    /// `<= NACCESSORY` and `>=` whatever `ManualControlCommand` provides
    /// (§6 compile-time invariant); checked at validation, not compile
    /// time, since it is data from a settings object rather than a type.
    #[serde(default = "default_accessory_count")]
    pub accessory_count: usize,
}

fn default_mixer_rows() -> [MixerRow; NCHAN] {
    [MixerRow::default(); NCHAN]
}
fn default_curve1() -> [f32; K1] {
    let mut c = [0.0f32; K1];
    for (i, v) in c.iter_mut().enumerate() {
        *v = i as f32 / (K1 - 1) as f32;
    }
    c
}
fn default_curve2() -> [f32; K2] {
    let mut c = [0.0f32; K2];
    for (i, v) in c.iter_mut().enumerate() {
        *v = -1.0 + 2.0 * i as f32 / (K2 - 1) as f32;
    }
    c
}
fn default_accessory_count() -> usize {
    NACCESSORY
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            rows: default_mixer_rows(),
            throttle_curve1: default_curve1(),
            throttle_curve2: default_curve2(),
            curve2_source: Curve2Source::default(),
            accessory_count: default_accessory_count(),
        }
    }
}

impl MixerSettings {
    /// §6 compile-time invariants that are actually data-dependent: row
    /// count is fixed by the array type, but accessory routing is not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accessory_count > NACCESSORY {
            return Err(ConfigError::Validation(format!(
                "accessory_count {} exceeds NACCESSORY {}",
                self.accessory_count, NACCESSORY
            )));
        }
        if self.throttle_curve1.is_empty() || self.throttle_curve2.is_empty() {
            return Err(ConfigError::Validation(
                "curve tables must have at least one knot".into(),
            ));
        }
        Ok(())
    }
}

// ─── SystemSettings ─────────────────────────────────────────────────

/// Airframe-level configuration (§6). Only `airframe_type` is consumed by
/// this core; other system-wide fields (if any, in a fuller vehicle
/// configuration) are out of scope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(default)]
    pub airframe_type: AirframeType,
}

// ─── Loading ────────────────────────────────────────────────────────

/// All three settings objects, as loaded for local simulation/testing.
/// In production these arrive from the object broker (§1); this bundle
/// exists so the core can be driven from a TOML file under test.
#[derive(Debug, Clone)]
pub struct SettingsBundle {
    pub actuator: ActuatorSettings,
    pub mixer: MixerSettings,
    pub system: SystemSettings,
}

impl Default for SettingsBundle {
    fn default() -> Self {
        Self {
            actuator: ActuatorSettings::default(),
            mixer: MixerSettings::default(),
            system: SystemSettings::default(),
        }
    }
}

/// Load and validate a settings bundle from a single TOML document with
/// `[actuator]`, `[mixer]`, and `[system]` tables.
pub fn load_bundle_from_str(text: &str) -> Result<SettingsBundle, ConfigError> {
    #[derive(Deserialize)]
    struct Raw {
        #[serde(default)]
        actuator: ActuatorSettings,
        #[serde(default)]
        mixer: MixerSettings,
        #[serde(default)]
        system: SystemSettings,
    }

    let raw: Raw = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: "<inline>".to_string(),
        source,
    })?;
    raw.actuator.validate()?;
    raw.mixer.validate()?;
    Ok(SettingsBundle {
        actuator: raw.actuator,
        mixer: raw.mixer,
        system: raw.system,
    })
}

/// Load and validate a settings bundle from a TOML file on disk.
pub fn load_bundle(path: &str) -> Result<SettingsBundle, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    load_bundle_from_str(&text)
}
