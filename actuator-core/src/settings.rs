//! Configuration snapshots consumed by the actuator task.
//!
//! External configuration writes whole objects onto the bus; the task caches
//! them between ticks and rebuilds the mixer cache when mixer settings
//! change, so the hot path never reads half-updated configuration.

use heapless::Vec;

/// Output channels driven by the servo timers.
pub const ACTUATOR_CHANNELS: usize = 10;
/// Mixer rows; one per actuator channel.
pub const MAX_MIX_ACTUATORS: usize = 10;
/// Width of a mixer row / the desired vector.
pub const MIXER_VECTOR_LEN: usize = 8;
/// Fixed divisor turning integer row coefficients into floats.
pub const MIXER_SCALE: i16 = 128;
/// PWM timer banks with independently configurable update rates.
pub const NUM_TIMER_BANKS: usize = 2;
/// Capacity of a throttle-curve table.
pub const MAX_CURVE_POINTS: usize = 8;
/// Accessory pass-through channels from manual control.
pub const NUM_ACCESSORIES: usize = 3;

const _: () = assert!(MAX_MIX_ACTUATORS <= ACTUATOR_CHANNELS);
const _: () = assert!(MIXER_VECTOR_LEN - axis::ACCESSORY0 >= NUM_ACCESSORIES);

/// Column indices into a mixer row / the desired vector.
pub mod axis {
    pub const CURVE1: usize = 0;
    pub const CURVE2: usize = 1;
    pub const ROLL: usize = 2;
    pub const PITCH: usize = 3;
    pub const YAW: usize = 4;
    pub const ACCESSORY0: usize = 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixerType {
    Disabled,
    Motor,
    Servo,
    CameraRoll,
    CameraPitch,
    CameraYaw,
}

/// One mixer row: an output type plus integer coefficients per axis,
/// rescaled by 1/[`MIXER_SCALE`] when the cache is built.
#[derive(Clone, Copy)]
pub struct Mixer {
    pub mixer_type: MixerType,
    pub vector: [i16; MIXER_VECTOR_LEN],
}

impl Mixer {
    pub const fn disabled() -> Self {
        Self {
            mixer_type: MixerType::Disabled,
            vector: [0; MIXER_VECTOR_LEN],
        }
    }
}

/// Signal feeding the second throttle curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Curve2Source {
    Throttle,
    Roll,
    Pitch,
    Yaw,
    Collective,
    Accessory0,
    Accessory1,
    Accessory2,
}

#[derive(Clone)]
pub struct MixerSettings {
    pub mixers: [Mixer; MAX_MIX_ACTUATORS],
    /// Curve over throttle, points evenly spaced across [0, 1].
    pub throttle_curve1: Vec<f32, MAX_CURVE_POINTS>,
    /// Curve over the selectable second source, spaced across [-1, 1].
    pub throttle_curve2: Vec<f32, MAX_CURVE_POINTS>,
    pub curve2_source: Curve2Source,
    /// Rotor tilt applied to motor rows at cache build, degrees about the
    /// body Y axis. 0 leaves every row untouched.
    pub rotor_tilt_deg: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            mixers: [Mixer::disabled(); MAX_MIX_ACTUATORS],
            throttle_curve1: Vec::from_slice(&[0.0, 1.0]).unwrap(),
            throttle_curve2: Vec::from_slice(&[-1.0, 1.0]).unwrap(),
            curve2_source: Curve2Source::Throttle,
            rotor_tilt_deg: 0.0,
        }
    }
}

impl MixerSettings {
    /// Canonical quad-X table: four motors, full thrust authority, half
    /// authority on each attitude axis.
    pub fn quad_x() -> Self {
        let mut settings = Self::default();
        let rows: [[i16; 3]; 4] = [
            // [roll, pitch, yaw] for motors NW, NE, SE, SW
            [64, 64, -64],
            [-64, 64, 64],
            [-64, -64, -64],
            [64, -64, 64],
        ];
        for (mixer, row) in settings.mixers.iter_mut().zip(rows) {
            mixer.mixer_type = MixerType::Motor;
            mixer.vector[axis::CURVE1] = MIXER_SCALE;
            mixer.vector[axis::ROLL] = row[0];
            mixer.vector[axis::PITCH] = row[1];
            mixer.vector[axis::YAW] = row[2];
        }
        settings
    }
}

#[derive(Clone, Copy)]
pub struct ActuatorSettings {
    /// Channel endpoints and neutral, microseconds. `min > max` marks a
    /// reversed output and is preserved as-is.
    pub channel_min: [u16; ACTUATOR_CHANNELS],
    pub channel_neutral: [u16; ACTUATOR_CHANNELS],
    pub channel_max: [u16; ACTUATOR_CHANNELS],
    /// Update rate per timer bank, Hz.
    pub timer_update_freq: [u16; NUM_TIMER_BANKS],
    /// Keep motors at idle (0) rather than off (-1) while armed with the
    /// throttle low.
    pub motors_spin_while_armed: bool,
    /// Exponent mapping mixer output to ESC input, compensating the
    /// propeller's thrust curve.
    pub motor_input_output_curve_fit: f32,
    /// Extra throttle fraction the clip manager may add to rescue attitude
    /// authority when motors clip low.
    pub low_power_stabilization_max_power_add: f32,
    /// How long stabilization keeps running after throttle drops to zero,
    /// seconds. 0 disables the hang-time window.
    pub low_power_stabilization_max_time: f32,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            channel_min: [1000; ACTUATOR_CHANNELS],
            channel_neutral: [1000; ACTUATOR_CHANNELS],
            channel_max: [2000; ACTUATOR_CHANNELS],
            timer_update_freq: [50; NUM_TIMER_BANKS],
            motors_spin_while_armed: false,
            motor_input_output_curve_fit: 1.0,
            low_power_stabilization_max_power_add: 0.0,
            low_power_stabilization_max_time: 0.0,
        }
    }
}

/// Only `HeliCp` changes behavior in this module (throttle and curve2
/// sourcing); everything else mixes identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AirframeType {
    Multirotor,
    FixedWing,
    HeliCp,
    Custom,
}

#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemSettings {
    pub airframe_type: AirframeType,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            airframe_type: AirframeType::Multirotor,
        }
    }
}
