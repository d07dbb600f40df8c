//! System-wide constants for the actuator mixer core.
//!
//! Single source of truth for all compile-time array bounds. Everything here
//! is a `const` so the sizes are checked at build time (see the
//! `static_assertions` block at the bottom) rather than discovered at runtime.

/// Number of output channels the mixer drives.
pub const NCHAN: usize = 10;

/// Number of mixer axes: `ThrottleCurve1, ThrottleCurve2, Roll, Pitch, Yaw,
/// Accessory0, Accessory1, Accessory2`.
pub const NAXIS: usize = 8;

/// Number of accessory axes available to the manual control command.
pub const NACCESSORY: usize = 3;

/// Curve 1 (thrust) knot count.
pub const K1: usize = 5;

/// Curve 2 (auxiliary) knot count.
pub const K2: usize = 5;

/// Number of independently clocked PWM/DShot banks.
pub const NBANK: usize = 5;

/// Upper bound on `NBANK` enforced at compile time.
pub const MAX_SERVO_BANKS: usize = 8;

/// Input-queue receive timeout before the task declares failsafe [ms].
pub const FAILSAFE_TIMEOUT_MS: u64 = 100;

/// Minimum continuous time in `STOPREQUEST` before transitioning to `STOPPED` [ms].
pub const INTERLOCK_STOP_GRACE_MS: u64 = 100;

/// Poll interval while the interlock loop waits for `OK` [ms].
pub const INTERLOCK_POLL_MS: u64 = 3;

static_assertions::const_assert!(NBANK <= MAX_SERVO_BANKS);
static_assertions::const_assert!(NCHAN > 0);
static_assertions::const_assert!(NAXIS == 5 + NACCESSORY);
