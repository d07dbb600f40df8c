//! Actuator Mixer Core — binary entry point.
//!
//! The publish/subscribe transport, PWM/DShot driver, watchdog, and
//! alarm subsystem are external collaborators this core does not own
//! (see crate-level docs). This binary wires the core against simple
//! stand-ins for local testing; a production build links real drivers
//! in their place.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use actuator_mixer_core::consts::{NBANK, NCHAN};
use actuator_mixer_core::cycle::{rt_setup, Clock, CycleRunner};
use actuator_mixer_core::interfaces::{
    ActuatorCommand, ActuatorDesired, AlarmGroup, AlarmSeverity, AlarmSink, CameraDesired,
    CommandSink, FlightStatus, InputQueue, InputSource, ManualControlCommand, PwmDriver,
    Watchdog,
};
use actuator_mixer_core::settings;
use actuator_mixer_core::types::InterlockState;

struct WallClock;
impl Clock for WallClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }
}

/// Always reports an event immediately available. A real deployment
/// blocks on the broker's queue primitive instead (§5).
struct AlwaysReadyQueue;
impl InputQueue for AlwaysReadyQueue {
    fn recv_timeout(&mut self, _timeout_ms: u64) -> bool {
        true
    }
}

/// Static, disarmed input. Exercises the failsafe/disarmed-hold path
/// until a real object-broker source is wired in.
struct StaticSource;
impl InputSource for StaticSource {
    fn actuator_desired(&self) -> ActuatorDesired {
        ActuatorDesired::default()
    }
    fn flight_status(&self) -> FlightStatus {
        FlightStatus::default()
    }
    fn manual_control(&self) -> ManualControlCommand {
        ManualControlCommand::default()
    }
    fn camera_desired(&self) -> Option<CameraDesired> {
        None
    }
    fn interlock_word(&self) -> InterlockState {
        InterlockState::Ok
    }
    fn take_flight_status_dirty(&mut self) -> bool {
        false
    }
    fn take_manual_control_dirty(&mut self) -> bool {
        false
    }
    fn take_actuator_settings_dirty(&mut self) -> bool {
        false
    }
    fn take_mixer_settings_dirty(&mut self) -> bool {
        false
    }
}

struct LoggingCommandSink;
impl CommandSink for LoggingCommandSink {
    fn is_writable(&self) -> bool {
        true
    }
    fn publish(&mut self, command: ActuatorCommand) {
        tracing::debug!(update_time = command.update_time, "actuator command published");
    }
    fn read_back(&self) -> ActuatorCommand {
        ActuatorCommand::default()
    }
}

struct LoggingPwm;
impl PwmDriver for LoggingPwm {
    fn servo_set_mode(&mut self, freqs: &[u16; NBANK], _min: &[f32; NCHAN], _max: &[f32; NCHAN]) {
        tracing::debug!(?freqs, "pwm banks reconfigured");
    }
    fn servo_set(&mut self, _channel: usize, _pulse_us: f32) {}
    fn servo_update(&mut self) {}
}

struct LoggingAlarm;
impl AlarmSink for LoggingAlarm {
    fn set(&mut self, group: AlarmGroup, severity: AlarmSeverity) {
        if severity == AlarmSeverity::Critical {
            tracing::warn!(?group, ?severity, "alarm raised");
        }
    }
}

struct NoopWatchdog;
impl Watchdog for NoopWatchdog {
    fn kick(&mut self) {}
}

fn main() {
    tracing_subscriber::fmt::init();
    info!("actuator mixer core starting");

    if let Err(e) = rt_setup(0, 80) {
        tracing::error!(error = %e, "rt setup failed, continuing without realtime scheduling");
    }

    let settings_path = std::env::args().nth(1);
    let bundle = match settings_path {
        Some(path) => settings::load_bundle(&path).unwrap_or_else(|e| {
            tracing::error!(error = %e, path, "failed to load settings, using defaults");
            settings::SettingsBundle::default()
        }),
        None => {
            info!("no settings path given, using defaults");
            settings::SettingsBundle::default()
        }
    };

    let mut runner: CycleRunner<_, _, _, _, _, _, _> = CycleRunner::new(
        AlwaysReadyQueue,
        StaticSource,
        LoggingCommandSink,
        LoggingPwm,
        LoggingAlarm,
        NoopWatchdog,
        WallClock,
        bundle.actuator,
        bundle.mixer,
        bundle.system,
    );
    runner.start();
    runner.run();
}
