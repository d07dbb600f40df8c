//! Task Loop & Safety State Machine (§4.4).
//!
//! The single dedicated task: blocks on the input queue with a fixed
//! timeout, services dirty flags, runs the interlock check, then drives
//! the Input Normalizer and Mixer & Post-Processor. Nothing here
//! allocates after startup (§5 "Resources").
//!
//! ## RT Setup
//! `rt_setup()` locks memory, prefaults the stack, pins the task to a
//! CPU core, and raises it to `SCHED_FIFO`. All four are no-ops unless
//! built with the `rt` feature — unit tests and desktop simulation run
//! with the scheduler left alone.

use tracing::{info, warn};

use crate::consts::{FAILSAFE_TIMEOUT_MS, INTERLOCK_POLL_MS, NCHAN};
use crate::error::CoreError;
use crate::interfaces::{
    AlarmGroup, AlarmSeverity, AlarmSink, CommandSink, InputQueue, InputSource, PwmDriver,
    Watchdog,
};
use crate::mixer::{self, Mixer};
use crate::normalizer::{self, NormalizerState};
use crate::safety::failsafe::failsafe_pulses;
use crate::safety::interlock::{InterlockAction, InterlockTracker};
use crate::settings::{ActuatorSettings, MixerSettings, SystemSettings};
use crate::interfaces::ActuatorCommand;

/// Millisecond clock boundary. A thin seam so tests can drive the loop
/// with a fake clock instead of `CLOCK_MONOTONIC` (§5 "the core tolerates
/// one extra stale-read cycle" — likewise the clock is read, never owned).
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Lock all current and future memory pages. No-op without `rt`.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CoreError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CoreError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CoreError> {
    Ok(())
}

/// Touch a stack allocation to force page-in before the RT loop starts.
fn prefault_stack() {
    let mut buf = [0u8; 64 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CoreError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CoreError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CoreError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CoreError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CoreError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CoreError> {
    Ok(())
}

/// Full RT setup sequence. Call once before entering `CycleRunner::run`.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CoreError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

/// Owns every piece of task-local state (§3 "Global state (owned by
/// task)"): the compiled mixer, the normalizer's latched inputs, the
/// cached settings, the interlock tracker, and the clock bookkeeping
/// needed for `dT` and timer-wrap handling.
pub struct CycleRunner<Q, S, C, P, A, W, Clk> {
    queue: Q,
    source: S,
    command_sink: C,
    pwm: P,
    alarm: A,
    watchdog: W,
    clock: Clk,

    mixer: Mixer,
    normalizer_state: NormalizerState,
    actuator_settings: ActuatorSettings,
    mixer_settings: MixerSettings,
    system_settings: SystemSettings,
    interlock: InterlockTracker,

    last_systime_ms: Option<u64>,
    last_dt_s: f32,
    max_update_time_ms: f32,
}

impl<Q, S, C, P, A, W, Clk> CycleRunner<Q, S, C, P, A, W, Clk>
where
    Q: InputQueue,
    S: InputSource,
    C: CommandSink,
    P: PwmDriver,
    A: AlarmSink,
    W: Watchdog,
    Clk: Clock,
{
    pub fn new(
        queue: Q,
        source: S,
        command_sink: C,
        pwm: P,
        alarm: A,
        watchdog: W,
        clock: Clk,
        actuator_settings: ActuatorSettings,
        mixer_settings: MixerSettings,
        system_settings: SystemSettings,
    ) -> Self {
        let mut mixer = Mixer::new();
        mixer.rebuild(&mixer_settings, &system_settings);

        Self {
            queue,
            source,
            command_sink,
            pwm,
            alarm,
            watchdog,
            clock,
            mixer,
            normalizer_state: NormalizerState::default(),
            actuator_settings,
            mixer_settings,
            system_settings,
            interlock: InterlockTracker::new(),
            last_systime_ms: None,
            last_dt_s: 0.0,
            max_update_time_ms: 0.0,
        }
    }

    /// Start-up: program PWM from the initial settings and enter
    /// failsafe (§4.4 "Start-up").
    pub fn start(&mut self) {
        mixer::program_pwm_banks(&mut self.pwm, &self.actuator_settings);
        self.commit_failsafe();
    }

    /// Run the steady loop forever. Never returns under normal operation;
    /// every early exit path commits failsafe first (§9 "Scoped failsafe
    /// acquisition").
    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    /// One iteration of the steady loop body (§4.4 steps 1-8). Exposed
    /// separately from `run` so tests can drive the loop deterministically.
    pub fn tick(&mut self) {
        self.watchdog.kick();

        if self.source.take_actuator_settings_dirty() {
            mixer::program_pwm_banks(&mut self.pwm, &self.actuator_settings);
        }
        if self.source.take_mixer_settings_dirty() {
            self.mixer.rebuild(&self.mixer_settings, &self.system_settings);
        }

        if !self.queue.recv_timeout(FAILSAFE_TIMEOUT_MS) {
            warn!(timeout_ms = FAILSAFE_TIMEOUT_MS, "input starvation, entering failsafe");
            self.commit_failsafe();
            return;
        }

        let now_ms = self.clock.now_ms();
        let dt_s = self.compute_dt(now_ms);

        if !self.service_interlock(now_ms) {
            return;
        }

        self.run_normalize_and_commit(now_ms, dt_s);
    }

    /// §4.4 step 5: `dT` with timer-wrap handling.
    fn compute_dt(&mut self, now_ms: u64) -> f32 {
        let dt_s = match self.last_systime_ms {
            Some(last) if now_ms > last => (now_ms - last) as f32 / 1000.0,
            Some(_) => self.last_dt_s,
            None => 0.0,
        };
        self.last_systime_ms = Some(now_ms);
        self.last_dt_s = dt_s;
        dt_s
    }

    /// §4.4 step 6: the interlock check and its inner wait loop. Returns
    /// `true` if the caller should proceed to normalize-and-commit this
    /// tick (the interlock was already `Ok`), or `false` if the loop just
    /// spent time holding failsafe and waiting it out — in which case the
    /// steady loop restarts fresh on the next `tick()` call rather than
    /// running the rest of this one (§4.4 step 6 "restart the loop body").
    fn service_interlock(&mut self, now_ms: u64) -> bool {
        let raw = self.source.interlock_word();
        let (action, _reported) = self.interlock.observe(raw, now_ms);
        if action == InterlockAction::Resume {
            return true;
        }

        loop {
            self.commit_failsafe();
            std::thread::sleep(std::time::Duration::from_millis(INTERLOCK_POLL_MS));
            self.watchdog.kick();

            let now_ms = self.clock.now_ms();
            let raw = self.source.interlock_word();
            let (action, _reported) = self.interlock.observe(raw, now_ms);
            if action == InterlockAction::Resume {
                break;
            }
        }

        mixer::program_pwm_banks(&mut self.pwm, &self.actuator_settings);
        false
    }

    fn run_normalize_and_commit(&mut self, now_ms: u64, dt_s: f32) {
        let normalized = normalizer::normalize(
            &mut self.normalizer_state,
            &mut self.source,
            &self.mixer,
            &self.actuator_settings,
            now_ms,
        );
        let camera = self.source.camera_desired();

        match crate::postprocess::process(&self.mixer, &normalized, &self.actuator_settings, camera) {
            Ok(pulses) => self.publish(pulses, dt_s),
            Err(e) => {
                warn!(channel = e.channel, "unknown channel type, entering failsafe");
                self.commit_failsafe();
            }
        }
    }

    /// §4.3 step 6: publish, program PWM, clear the alarm.
    fn publish(&mut self, pulses: [f32; NCHAN], dt_s: f32) {
        let update_time_ms = dt_s * 1000.0;
        if update_time_ms > self.max_update_time_ms {
            self.max_update_time_ms = update_time_ms;
        }

        let command = ActuatorCommand {
            channel: pulses,
            update_time: update_time_ms,
            max_update_time: self.max_update_time_ms,
        };

        let effective = if self.command_sink.is_writable() {
            self.command_sink.publish(command);
            command
        } else {
            self.command_sink.read_back()
        };

        for (ch, &pulse) in effective.channel.iter().enumerate() {
            self.pwm.servo_set(ch, pulse);
        }
        self.pwm.servo_update();
        self.alarm.set(AlarmGroup::Actuator, AlarmSeverity::Clear);
    }

    /// Commit the failsafe table and raise the alarm (§4.4 "Failsafe
    /// policy", invoked from every early-exit path).
    fn commit_failsafe(&mut self) {
        let pulses = failsafe_pulses(&self.mixer.channel_type, &self.actuator_settings);
        for (ch, &pulse) in pulses.iter().enumerate() {
            self.pwm.servo_set(ch, pulse);
        }
        self.pwm.servo_update();
        self.alarm.set(AlarmGroup::Actuator, AlarmSeverity::Critical);
        info!("failsafe committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{CameraDesired, ActuatorDesired, FlightStatus, ManualControlCommand};
    use crate::types::{ArmedState, FlightMode, InterlockState};
    use std::cell::Cell;

    struct FakeClock(Cell<u64>);
    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    struct FakeQueue {
        deliver: bool,
    }
    impl InputQueue for FakeQueue {
        fn recv_timeout(&mut self, _timeout_ms: u64) -> bool {
            self.deliver
        }
    }

    #[derive(Default)]
    struct FakeSource {
        armed: bool,
        thrust: f32,
        /// Number of leading `interlock_word()` calls that report
        /// `StopRequest` before the word settles to `Ok`.
        interlock_stop_calls: u32,
        interlock_calls: Cell<u32>,
    }
    impl InputSource for FakeSource {
        fn actuator_desired(&self) -> ActuatorDesired {
            ActuatorDesired {
                roll: 0.0,
                pitch: 0.0,
                yaw: 0.0,
                thrust: self.thrust,
            }
        }
        fn flight_status(&self) -> FlightStatus {
            FlightStatus {
                armed: if self.armed { ArmedState::Armed } else { ArmedState::Disarmed },
                flight_mode: FlightMode::Stabilized,
            }
        }
        fn manual_control(&self) -> ManualControlCommand {
            ManualControlCommand::default()
        }
        fn camera_desired(&self) -> Option<CameraDesired> {
            None
        }
        fn interlock_word(&self) -> InterlockState {
            let n = self.interlock_calls.get();
            self.interlock_calls.set(n + 1);
            if n < self.interlock_stop_calls {
                InterlockState::StopRequest
            } else {
                InterlockState::Ok
            }
        }
        fn take_flight_status_dirty(&mut self) -> bool {
            true
        }
        fn take_manual_control_dirty(&mut self) -> bool {
            true
        }
        fn take_actuator_settings_dirty(&mut self) -> bool {
            false
        }
        fn take_mixer_settings_dirty(&mut self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct FakeSink {
        published: Option<ActuatorCommand>,
    }
    impl CommandSink for FakeSink {
        fn is_writable(&self) -> bool {
            true
        }
        fn publish(&mut self, command: ActuatorCommand) {
            self.published = Some(command);
        }
        fn read_back(&self) -> ActuatorCommand {
            self.published.unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct FakePwm {
        channels: [f32; NCHAN],
        updates: u32,
    }
    impl PwmDriver for FakePwm {
        fn servo_set_mode(&mut self, _freqs: &[u16; crate::consts::NBANK], _min: &[f32; NCHAN], _max: &[f32; NCHAN]) {}
        fn servo_set(&mut self, channel: usize, pulse_us: f32) {
            self.channels[channel] = pulse_us;
        }
        fn servo_update(&mut self) {
            self.updates += 1;
        }
    }

    #[derive(Default)]
    struct FakeAlarm {
        last: Option<AlarmSeverity>,
    }
    impl AlarmSink for FakeAlarm {
        fn set(&mut self, _group: AlarmGroup, severity: AlarmSeverity) {
            self.last = Some(severity);
        }
    }

    #[derive(Default)]
    struct FakeWatchdog {
        kicks: u32,
    }
    impl Watchdog for FakeWatchdog {
        fn kick(&mut self) {
            self.kicks += 1;
        }
    }

    fn quad_x_motor_settings() -> (ActuatorSettings, MixerSettings) {
        use crate::settings::{ChannelTypeSetting, MixerRow};
        let mut actuator = ActuatorSettings::default();
        actuator.channel_min = [1000.0; NCHAN];
        actuator.channel_neutral = [1000.0; NCHAN];
        actuator.channel_max = [2000.0; NCHAN];

        let mut rows = [MixerRow::default(); NCHAN];
        for row in rows.iter_mut().take(4) {
            *row = MixerRow {
                channel_type: ChannelTypeSetting::Motor,
                vector: [128, 0, 0, 0, 0, 0, 0, 0],
            };
        }
        let mixer = MixerSettings {
            rows,
            ..MixerSettings::default()
        };
        (actuator, mixer)
    }

    fn build_runner(
        armed: bool,
        thrust: f32,
        deliver: bool,
    ) -> CycleRunner<FakeQueue, FakeSource, FakeSink, FakePwm, FakeAlarm, FakeWatchdog, FakeClock> {
        build_runner_with_interlock(armed, thrust, deliver, 0)
    }

    fn build_runner_with_interlock(
        armed: bool,
        thrust: f32,
        deliver: bool,
        interlock_stop_calls: u32,
    ) -> CycleRunner<FakeQueue, FakeSource, FakeSink, FakePwm, FakeAlarm, FakeWatchdog, FakeClock> {
        let (actuator, mixer) = quad_x_motor_settings();
        CycleRunner::new(
            FakeQueue { deliver },
            FakeSource {
                armed,
                thrust,
                interlock_stop_calls,
                interlock_calls: Cell::new(0),
            },
            FakeSink::default(),
            FakePwm::default(),
            FakeAlarm::default(),
            FakeWatchdog::default(),
            FakeClock(Cell::new(0)),
            actuator,
            mixer,
            SystemSettings::default(),
        )
    }

    #[test]
    fn input_starvation_commits_failsafe_and_raises_critical() {
        let mut runner = build_runner(true, 0.5, false);
        runner.start();
        runner.tick();
        assert_eq!(runner.alarm.last, Some(AlarmSeverity::Critical));
        assert_eq!(runner.pwm.channels[0], 1000.0);
    }

    #[test]
    fn disarmed_hold_commands_every_motor_to_min() {
        let mut runner = build_runner(false, 0.8, true);
        runner.tick();
        for ch in 0..4 {
            assert_eq!(runner.pwm.channels[ch], 1000.0);
        }
        assert_eq!(runner.alarm.last, Some(AlarmSeverity::Clear));
    }

    #[test]
    fn armed_hover_clears_alarm_and_kicks_watchdog() {
        let mut runner = build_runner(true, 0.5, true);
        runner.tick();
        assert_eq!(runner.alarm.last, Some(AlarmSeverity::Clear));
        assert_eq!(runner.watchdog.kicks, 1);
        assert_eq!(runner.pwm.updates, 1);
    }

    #[test]
    fn timer_wrap_reuses_previous_dt() {
        let mut runner = build_runner(true, 0.5, true);
        runner.clock.0.set(100);
        runner.tick();
        runner.clock.0.set(150);
        runner.tick();
        let dt_before_wrap = runner.last_dt_s;
        assert!(dt_before_wrap > 0.0);

        runner.clock.0.set(120); // wrap: now <= last_systime
        runner.tick();
        assert_eq!(runner.last_dt_s, dt_before_wrap, "timer wrap must reuse the previous dT");
    }

    #[test]
    fn rt_setup_is_a_noop_without_the_rt_feature() {
        assert!(rt_setup(0, 80).is_ok());
    }

    #[test]
    fn stop_request_on_the_source_holds_failsafe_through_tick() {
        // A single StopRequest call before the word settles to Ok: the
        // inner wait loop runs exactly once (one 3ms sleep) and tick()
        // returns without normalizing this cycle.
        let mut runner = build_runner_with_interlock(true, 0.5, true, 1);
        runner.tick();
        assert_eq!(runner.alarm.last, Some(AlarmSeverity::Critical));
        assert_eq!(runner.pwm.channels[0], 1000.0, "failsafe pulse, not a mixed hover pulse");
    }

    #[test]
    fn interlock_exit_reprograms_pwm_before_the_next_tick_normalizes() {
        let mut runner = build_runner_with_interlock(true, 0.5, true, 1);
        runner.tick();
        assert_eq!(runner.pwm.updates, 1, "commit_failsafe updates once before the wait loop exits");

        // The word is already Ok by the second tick; normal hover proceeds.
        runner.tick();
        assert_eq!(runner.alarm.last, Some(AlarmSeverity::Clear));
        assert!(runner.pwm.channels[0] > 1000.0, "armed hover should command above the failsafe floor");
    }

    #[test]
    fn interlock_word_ok_never_enters_the_wait_loop() {
        let mut runner = build_runner_with_interlock(true, 0.5, true, 0);
        runner.tick();
        assert_eq!(runner.source.interlock_calls.get(), 1, "a clean Ok reads the word exactly once");
        assert_eq!(runner.alarm.last, Some(AlarmSeverity::Clear));
    }
}
