//! Static message bus connecting the actuator task to its producers.
//!
//! Producers only ever publish whole objects here; the task snapshots them
//! between ticks. `Watch::try_changed()` gives the same single-writer /
//! single-reader update semantics as a change-notification flag, without
//! the task ever reading a half-written object.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::watch::Watch;

use crate::interlock::Interlock;
use crate::settings::{ActuatorSettings, MixerSettings, SystemSettings};
use crate::state::{
    ActuatorCommand, ActuatorDesired, AlarmLevel, CameraDesired, FlightStatus,
    ManualControlCommand,
};

/// Primary trigger for the actuator task. Queued (depth 2) so a fresh
/// update arriving while one is being processed is not lost.
pub static ACTUATOR_DESIRED: Channel<CriticalSectionRawMutex, ActuatorDesired, 2> = Channel::new();

pub static MANUAL_CONTROL: Watch<CriticalSectionRawMutex, ManualControlCommand, 2> = Watch::new();
pub static FLIGHT_STATUS: Watch<CriticalSectionRawMutex, FlightStatus, 2> = Watch::new();
pub static CAMERA_DESIRED: Watch<CriticalSectionRawMutex, CameraDesired, 2> = Watch::new();

pub static ACTUATOR_SETTINGS: Watch<CriticalSectionRawMutex, ActuatorSettings, 2> = Watch::new();
pub static MIXER_SETTINGS: Watch<CriticalSectionRawMutex, MixerSettings, 2> = Watch::new();
pub static SYSTEM_SETTINGS: Watch<CriticalSectionRawMutex, SystemSettings, 2> = Watch::new();

/// Published output. A cell rather than a channel because external tooling
/// reads it back (jitter analysis, `max_update_time` reset) and may take it
/// over entirely via [`COMMAND_OVERRIDE`].
pub static ACTUATOR_COMMAND: Mutex<CriticalSectionRawMutex, RefCell<ActuatorCommand>> =
    Mutex::new(RefCell::new(ActuatorCommand::new()));

/// While set, the actuator task stops publishing and instead programs the
/// hardware from whatever the external tool wrote into
/// [`ACTUATOR_COMMAND`].
pub static COMMAND_OVERRIDE: AtomicBool = AtomicBool::new(false);

pub static INTERLOCK: Interlock = Interlock::new();

pub static ACTUATOR_ALARM: AlarmCell = AlarmCell::new();

#[cfg(feature = "mixer-status")]
pub static MIXER_STATUS: Watch<CriticalSectionRawMutex, crate::state::MixerStatus, 2> =
    Watch::new();

/// Single alarm slot: Critical whenever outputs are in failsafe, Cleared on
/// every successful tick.
pub struct AlarmCell(AtomicU8);

impl AlarmCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn set(&self, level: AlarmLevel) {
        self.0.store(level as u8, Ordering::Release);
    }

    pub fn get(&self) -> AlarmLevel {
        match self.0.load(Ordering::Acquire) {
            0 => AlarmLevel::Cleared,
            _ => AlarmLevel::Critical,
        }
    }
}
