/// Shared object types carried over the message bus between the actuator
/// task and its producers.
///
/// All types are `Copy` to minimise overhead when sent through channels.
use crate::settings::{ACTUATOR_CHANNELS, NUM_ACCESSORIES};

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Desired axis commands from the stabilization pipeline.
/// Roll/pitch/yaw in [-1, 1]; thrust in [-1, 1] (commonly [0, 1]).
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActuatorDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
}

/// Pilot stick state, as normalized by the manual-control pipeline.
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManualControlCommand {
    /// Throttle stick in [-1, 1]; -1 is the failsafe/idle position.
    pub throttle: f32,
    /// Collective pitch in [-1, 1] (helicopters).
    pub collective: f32,
    pub accessory: [f32; NUM_ACCESSORIES],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Armed {
    Disarmed,
    Arming,
    Armed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightMode {
    Manual,
    Stabilized,
    Auto,
    Failsafe,
}

#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightStatus {
    pub armed: Armed,
    pub flight_mode: FlightMode,
}

impl Default for FlightStatus {
    fn default() -> Self {
        Self {
            armed: Armed::Disarmed,
            flight_mode: FlightMode::Manual,
        }
    }
}

/// Gimbal targets, published only on builds that carry a camera. The bus
/// value may never appear; camera mixer rows output -1 until it does.
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CameraDesired {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// Per-channel pulse widths as programmed into the servo timers.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActuatorCommand {
    /// Pulse width per channel, microseconds.
    pub channel: [u16; ACTUATOR_CHANNELS],
    /// Time between the last two accepted ticks, milliseconds.
    pub update_time: f32,
    /// High-water mark of `update_time`; only an external writer resets it.
    pub max_update_time: f32,
}

impl ActuatorCommand {
    pub const fn new() -> Self {
        Self {
            channel: [0; ACTUATOR_CHANNELS],
            update_time: 0.0,
            max_update_time: 0.0,
        }
    }
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmLevel {
    Cleared,
    Critical,
}

/// Per-tick mixer internals, for bench debugging only.
#[cfg(feature = "mixer-status")]
#[derive(Clone, Copy)]
pub struct MixerStatus {
    pub desired: [f32; crate::settings::MIXER_VECTOR_LEN],
    pub outputs: [f32; ACTUATOR_CHANNELS],
}
