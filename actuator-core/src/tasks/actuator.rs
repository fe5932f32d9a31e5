//! Actuator task: converts desired roll/pitch/yaw/thrust into servo and ESC
//! pulse widths through the mixer matrix.
//!
//! Universal matrix mixer for multirotors, helis and fixed wings. Driven by
//! ActuatorDesired arrivals; a missed arrival within the failsafe window
//! forces safe outputs. Throttle ranges 0..1, so the motors do too.

use core::sync::atomic::Ordering;

use embassy_time::{with_timeout, Duration, Instant, Timer};
use heapless::Vec;
use micromath::F32Ext;

use crate::curves::{collective_curve, throttle_curve};
use crate::interlock::InterlockState;
use crate::messaging as msg;
use crate::mixer::MixerCache;
use crate::output::{
    channel_failsafe_value, clip_gain_offset, scale_channel, ServoOutput, Watchdog,
};
use crate::settings::{
    axis, ActuatorSettings, AirframeType, Curve2Source, MixerSettings, MixerType,
    SystemSettings, ACTUATOR_CHANNELS, MAX_CURVE_POINTS, MAX_MIX_ACTUATORS,
    MIXER_VECTOR_LEN, NUM_ACCESSORIES,
};
use crate::state::{
    ActuatorCommand, ActuatorDesired, AlarmLevel, Armed, CameraDesired, FlightMode,
    FlightStatus, ManualControlCommand,
};

/// No ActuatorDesired for this long means the upstream pipeline stalled.
pub const FAILSAFE_TIMEOUT: Duration = Duration::from_millis(100);

/// How long the task keeps failsafing before acknowledging a stop request.
/// At 50 Hz output this spans 4-6 timer updates.
const INTERLOCK_HOLD_MS: u64 = 100;
const INTERLOCK_POLL_MS: u64 = 3;

/// Arming-derived gates for the current tick.
struct ArmState {
    armed: bool,
    spin_while_armed: bool,
    stabilize_now: bool,
}

/// State cached across ticks; refreshed from the bus only between ticks so
/// one tick never mixes two generations of configuration.
struct ActuatorTask {
    actuator_settings: ActuatorSettings,
    airframe_type: AirframeType,
    mixer: MixerCache,
    curve1: Vec<f32, MAX_CURVE_POINTS>,
    curve2: Vec<f32, MAX_CURVE_POINTS>,
    curve2_source: Curve2Source,
    desired_vect: [f32; MIXER_VECTOR_LEN],
    manual_control: ManualControlCommand,
    flight_status: FlightStatus,
    camera: Option<CameraDesired>,
    /// Systime of the last tick with positive throttle; drives the
    /// low-power stabilization hang-time window.
    last_pos_throttle_ms: Option<u32>,
    last_systime_ms: u32,
    dt_s: f32,
}

impl ActuatorTask {
    fn new(actuator_settings: ActuatorSettings, now_ms: u32) -> Self {
        Self {
            actuator_settings,
            airframe_type: AirframeType::Multirotor,
            mixer: MixerCache::new(),
            curve1: Vec::new(),
            curve2: Vec::new(),
            curve2_source: Curve2Source::Throttle,
            desired_vect: [0.0; MIXER_VECTOR_LEN],
            manual_control: ManualControlCommand {
                // Idle until the manual-control pipeline reports in.
                throttle: -1.0,
                ..Default::default()
            },
            flight_status: FlightStatus::default(),
            camera: None,
            last_pos_throttle_ms: None,
            last_systime_ms: now_ms,
            dt_s: 0.0,
        }
    }

    /// Snapshot mixer-dependent configuration and rebuild the cache.
    fn refresh_mixer(&mut self, mixer_settings: &MixerSettings, system: &SystemSettings) {
        self.airframe_type = system.airframe_type;
        self.mixer = MixerCache::compute(mixer_settings);
        self.curve1 = mixer_settings.throttle_curve1.clone();
        self.curve2 = mixer_settings.throttle_curve2.clone();
        self.curve2_source = mixer_settings.curve2_source;
    }

    /// Record the accepted-tick time. On a wrapped or equal timestamp the
    /// previous dT is reused rather than recomputed.
    fn update_systime(&mut self, now_ms: u32) {
        if now_ms > self.last_systime_ms {
            self.dt_s = (now_ms - self.last_systime_ms) as f32 / 1000.0;
        }
        self.last_systime_ms = now_ms;
    }

    fn curve2_input(&self, desired: &ActuatorDesired) -> f32 {
        match self.curve2_source {
            Curve2Source::Throttle => {
                if self.airframe_type == AirframeType::HeliCp {
                    self.manual_control.throttle
                } else {
                    desired.thrust
                }
            }
            Curve2Source::Roll => desired.roll,
            Curve2Source::Pitch => desired.pitch,
            Curve2Source::Yaw => desired.yaw,
            Curve2Source::Collective => {
                if self.airframe_type == AirframeType::HeliCp {
                    desired.thrust
                } else {
                    self.manual_control.collective
                }
            }
            Curve2Source::Accessory0 | Curve2Source::Accessory1 | Curve2Source::Accessory2 => {
                let idx = match self.curve2_source {
                    Curve2Source::Accessory1 => 1,
                    Curve2Source::Accessory2 => 2,
                    _ => 0,
                };
                self.manual_control.accessory.get(idx).copied().unwrap_or(0.0)
            }
        }
    }

    /// Refresh cached manual/status inputs, derive the arming gates and the
    /// hang-time window, and assemble the desired vector.
    fn normalize_input(
        &mut self,
        now_ms: u32,
        desired: &ActuatorDesired,
        manual: Option<ManualControlCommand>,
        status: Option<FlightStatus>,
    ) -> ArmState {
        if let Some(status) = status {
            self.flight_status = status;
        }
        if let Some(manual) = manual {
            self.manual_control = manual;
            self.desired_vect[axis::ACCESSORY0..axis::ACCESSORY0 + NUM_ACCESSORIES]
                .copy_from_slice(&manual.accessory);
        }

        let mut throttle_val = -1.0;
        if self.airframe_type == AirframeType::HeliCp {
            // Helis take throttle from the pilot's stick, except in
            // failsafe where it stays at the -1 neutral.
            if self.flight_status.flight_mode != FlightMode::Failsafe {
                throttle_val = self.manual_control.throttle;
            }
        } else {
            throttle_val = desired.thrust;
        }

        let armed = self.flight_status.armed == Armed::Armed;
        let spin_while_armed = self.actuator_settings.motors_spin_while_armed;
        let mut stabilize_now = armed && throttle_val > 0.0;

        if stabilize_now {
            if self.actuator_settings.low_power_stabilization_max_time > 0.0 {
                self.last_pos_throttle_ms = Some(now_ms);
            }
        } else if let Some(last) = self.last_pos_throttle_ms {
            let window_ms = 1000.0 * self.actuator_settings.low_power_stabilization_max_time;
            if (now_ms.wrapping_sub(last) as f32) < window_ms {
                // Keep stabilizing through a brief throttle-idle moment,
                // but at zero throttle rather than motors-off.
                stabilize_now = true;
                throttle_val = 0.0;
            } else {
                self.last_pos_throttle_ms = None;
            }
        }

        let val1 = throttle_curve(throttle_val, &self.curve1);
        let val2 = collective_curve(self.curve2_input(desired), &self.curve2);

        self.desired_vect[axis::CURVE1] = val1;
        self.desired_vect[axis::CURVE2] = val2;
        self.desired_vect[axis::ROLL] = desired.roll;
        self.desired_vect[axis::PITCH] = desired.pitch;
        self.desired_vect[axis::YAW] = desired.yaw;
        // Accessory slots were filled on the last manual-control change.

        ArmState {
            armed,
            spin_while_armed,
            stabilize_now,
        }
    }

    /// Clip management and arming protection over the mixed vector.
    fn post_process(&self, motor_vect: &mut [f32; MAX_MIX_ACTUATORS], arm: &ArmState) {
        let mut min_chan = f32::INFINITY;
        let mut max_chan = f32::NEG_INFINITY;
        let mut neg_clip = 0.0;
        let mut num_motors = 0u32;

        for (ct, value) in motor_vect.iter_mut().enumerate() {
            match self.mixer.mixer_type(ct) {
                // Pulled to the channel minimum once scaled; not the same
                // as a 0 us pulse.
                MixerType::Disabled => *value = -1.0,
                MixerType::Servo => {}
                MixerType::Motor => {
                    min_chan = min_chan.min(*value);
                    max_chan = max_chan.max(*value);
                    if *value < 0.0 {
                        neg_clip += *value;
                    }
                    num_motors += 1;
                }
                MixerType::CameraRoll => {
                    *value = self.camera.map(|c| c.roll).unwrap_or(-1.0);
                }
                MixerType::CameraPitch => {
                    *value = self.camera.map(|c| c.pitch).unwrap_or(-1.0);
                }
                MixerType::CameraYaw => {
                    *value = self.camera.map(|c| c.yaw).unwrap_or(-1.0);
                }
            }
        }

        let (gain, offset) = clip_gain_offset(
            min_chan,
            max_chan,
            neg_clip,
            num_motors,
            self.actuator_settings.low_power_stabilization_max_power_add,
        );

        for (ct, value) in motor_vect.iter_mut().enumerate() {
            // Motors have additional protection for when to be on.
            if self.mixer.mixer_type(ct) != MixerType::Motor {
                continue;
            }
            if !arm.armed {
                *value = -1.0; // force min throttle
            } else if !arm.stabilize_now {
                *value = if arm.spin_while_armed { 0.0 } else { -1.0 };
            } else {
                let v = *value * gain + offset;
                *value = if v > 0.0 {
                    // Map mixer output to propeller output.
                    v.powf(self.actuator_settings.motor_input_output_curve_fit)
                } else {
                    0.0
                };
            }
        }
    }

    fn scale_channels(&self, motor_vect: &[f32; MAX_MIX_ACTUATORS]) -> [u16; ACTUATOR_CHANNELS] {
        let mut channel = [0u16; ACTUATOR_CHANNELS];
        for (ct, value) in motor_vect.iter().enumerate() {
            channel[ct] = scale_channel(
                *value,
                self.actuator_settings.channel_min[ct],
                self.actuator_settings.channel_neutral[ct],
                self.actuator_settings.channel_max[ct],
            );
        }
        channel
    }

    /// Publish the command (unless an external tool holds the override) and
    /// program the servo timers from the same tick's data.
    fn scale_and_commit<S: ServoOutput>(
        &self,
        motor_vect: &[f32; MAX_MIX_ACTUATORS],
        servo: &mut S,
    ) {
        let mut command = ActuatorCommand::new();
        command.channel = self.scale_channels(motor_vect);
        command.update_time = 1000.0 * self.dt_s;

        msg::ACTUATOR_COMMAND.lock(|cell| {
            let mut current = cell.borrow_mut();

            command.max_update_time = current.max_update_time;
            if command.update_time > command.max_update_time {
                command.max_update_time = command.update_time;
            }

            if msg::COMMAND_OVERRIDE.load(Ordering::Relaxed) {
                // Servo configuration in progress: the external tool's
                // values take precedence over ours.
                command = *current;
            } else {
                *current = command;
            }
        });

        for (ct, width) in command.channel.iter().enumerate() {
            servo.set(ct, *width);
        }
        servo.update();
    }

    /// Drive every channel to its failsafe pulse and flag the alarm.
    fn set_failsafe<S: ServoOutput>(&self, servo: &mut S) {
        msg::ACTUATOR_ALARM.set(AlarmLevel::Critical);

        let mut channel = [0u16; ACTUATOR_CHANNELS];
        for ct in 0..MAX_MIX_ACTUATORS {
            let width = channel_failsafe_value(
                self.mixer.mixer_type(ct),
                &self.actuator_settings,
                ct,
            );
            channel[ct] = width;
            servo.set(ct, width);
        }
        servo.update();

        // Only the channels change; update-time bookkeeping is left alone.
        msg::ACTUATOR_COMMAND.lock(|cell| cell.borrow_mut().channel = channel);
    }

    /// Hold in failsafe while the interlock is raised. Acknowledges the
    /// stop request after [`INTERLOCK_HOLD_MS`]; the release back to Ok is
    /// the requester's move alone.
    async fn hold_interlock<S: ServoOutput, W: Watchdog>(&self, servo: &mut S, watchdog: &mut W) {
        let exp = Instant::now() + Duration::from_millis(INTERLOCK_HOLD_MS);

        while msg::INTERLOCK.get() != InterlockState::Ok {
            if msg::INTERLOCK.get() == InterlockState::StopRequest {
                self.set_failsafe(servo);

                // The requester waits for Stopped before releasing, so a
                // torn observation of this edge is harmless.
                if Instant::now() >= exp {
                    msg::INTERLOCK.acknowledge_stop();
                    info!("actuator: interlock stopped");
                }
            }

            Timer::after(Duration::from_millis(INTERLOCK_POLL_MS)).await;
            watchdog.feed();
        }

        info!("actuator: interlock released");
    }
}

/// Actuator task main loop.
pub async fn run<S: ServoOutput, W: Watchdog>(mut servo: S, mut watchdog: W) -> ! {
    let desired_rx = msg::ACTUATOR_DESIRED.receiver();
    let mut manual_rx = msg::MANUAL_CONTROL.receiver().unwrap();
    let mut status_rx = msg::FLIGHT_STATUS.receiver().unwrap();
    let mut camera_rx = msg::CAMERA_DESIRED.receiver().unwrap();
    let mut actuator_settings_rx = msg::ACTUATOR_SETTINGS.receiver().unwrap();
    let mut mixer_settings_rx = msg::MIXER_SETTINGS.receiver().unwrap();
    let mut system_settings_rx = msg::SYSTEM_SETTINGS.receiver().unwrap();

    let settings = actuator_settings_rx.try_get().unwrap_or_default();
    let mut task = ActuatorTask::new(settings, Instant::now().as_millis() as u32);

    // Ensure the initial state of the actuators is safe.
    servo.set_mode(
        &task.actuator_settings.timer_update_freq,
        &task.actuator_settings.channel_max,
        &task.actuator_settings.channel_min,
    );
    task.set_failsafe(&mut servo);
    info!("actuator: started, outputs held at failsafe");

    let mut in_failsafe = true;

    loop {
        // Fold any pending configuration changes into the caches before
        // waiting for data, so a tick never straddles a settings update.
        if let Some(settings) = actuator_settings_rx.try_changed() {
            task.actuator_settings = settings;
            servo.set_mode(
                &task.actuator_settings.timer_update_freq,
                &task.actuator_settings.channel_max,
                &task.actuator_settings.channel_min,
            );
        }

        if let Some(mixer_settings) = mixer_settings_rx.try_changed() {
            // The airframe type is snapshotted together with the rows it
            // re-interprets.
            let system = system_settings_rx.try_get().unwrap_or_default();
            task.refresh_mixer(&mixer_settings, &system);
            debug!("actuator: mixer cache rebuilt");
        }

        watchdog.feed();

        let desired = match with_timeout(FAILSAFE_TIMEOUT, desired_rx.receive()).await {
            Ok(desired) => desired,
            Err(_) => {
                if !in_failsafe {
                    warn!("actuator: no desired input, failsafing outputs");
                    in_failsafe = true;
                }
                task.set_failsafe(&mut servo);
                continue;
            }
        };

        let now_ms = Instant::now().as_millis() as u32;
        task.update_systime(now_ms);

        if msg::INTERLOCK.get() != InterlockState::Ok {
            task.hold_interlock(&mut servo, &mut watchdog).await;
            // Timer mode may have been disturbed by the calibration tool.
            servo.set_mode(
                &task.actuator_settings.timer_update_freq,
                &task.actuator_settings.channel_max,
                &task.actuator_settings.channel_min,
            );
            in_failsafe = true;
            continue;
        }

        if let Some(camera) = camera_rx.try_changed() {
            task.camera = Some(camera);
        }

        let arm = task.normalize_input(
            now_ms,
            &desired,
            manual_rx.try_changed(),
            status_rx.try_changed(),
        );

        let mut motor_vect = task.mixer.mix(&task.desired_vect);

        #[cfg(feature = "mixer-status")]
        msg::MIXER_STATUS.sender().send(crate::state::MixerStatus {
            desired: task.desired_vect,
            outputs: motor_vect,
        });

        task.post_process(&mut motor_vect, &arm);
        task.scale_and_commit(&motor_vect, &mut servo);

        // If we got this far, everything is OK.
        msg::ACTUATOR_ALARM.set(AlarmLevel::Cleared);
        in_failsafe = false;
    }
}
