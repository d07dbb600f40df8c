//! Error types for the actuator mixer core.
//!
//! Nothing here ever escapes the task loop (§7 "no error escapes the task").
//! These types exist so the loop can log a cause before falling back to
//! failsafe, not to propagate failure to a caller.

use thiserror::Error;

/// Settings/mixer configuration problems, surfaced at load time and on
/// dirty-flag reconciliation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("toml parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Errors the cycle loop can observe. All are handled by degrading to
/// failsafe; none propagate past `CycleRunner::run`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No `ActuatorDesired` within `FAILSAFE_TIMEOUT_MS` (§7 kind 1).
    #[error("input starvation: no actuator-desired event within {timeout_ms}ms")]
    InputStarvation { timeout_ms: u64 },

    /// A channel's type byte did not decode to a known `ChannelType`
    /// (§7 kind 2, §4.3 step 2 "any unknown type").
    #[error("invalid channel type {raw} at channel {channel}")]
    InvalidChannelType { channel: usize, raw: u8 },

    /// Settings failed validation and the rebuild was rejected; the task
    /// keeps running on the previous cache (§4.1 "Failure").
    #[error("settings rejected, keeping previous cache: {0}")]
    SettingsRejected(#[from] ConfigError),

    /// The RT setup sequence (mlockall / affinity / scheduler) failed.
    #[error("rt setup failed: {0}")]
    RtSetup(String),
}
