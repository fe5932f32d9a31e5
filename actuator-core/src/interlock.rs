//! Output interlock: lets external code (e.g. a servo-calibration tool)
//! halt the actuator task's outputs through a three-state handshake.
//!
//! External side: `request_stop()`, await `wait_stopped()`, do the work,
//! then `release()`. The task answers a stop request by holding failsafe
//! for the interlock window and acknowledging; it never releases on its
//! own.

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_time::{Duration, Timer};

const STATE_OK: u8 = 0;
const STATE_STOP_REQUEST: u8 = 1;
const STATE_STOPPED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterlockState {
    Ok,
    StopRequest,
    Stopped,
}

pub struct Interlock(AtomicU8);

impl Interlock {
    pub const fn new() -> Self {
        Self(AtomicU8::new(STATE_OK))
    }

    pub fn get(&self) -> InterlockState {
        match self.0.load(Ordering::Acquire) {
            STATE_STOP_REQUEST => InterlockState::StopRequest,
            STATE_STOPPED => InterlockState::Stopped,
            _ => InterlockState::Ok,
        }
    }

    /// External: ask the actuator task to stop driving outputs.
    pub fn request_stop(&self) {
        self.0.store(STATE_STOP_REQUEST, Ordering::Release);
    }

    /// External: hand the outputs back after observing `Stopped`.
    pub fn release(&self) {
        self.0.store(STATE_OK, Ordering::Release);
    }

    /// External: block until the task has acknowledged the stop request.
    /// Must be awaited before `release()`.
    pub async fn wait_stopped(&self) {
        while self.get() != InterlockState::Stopped {
            Timer::after(Duration::from_millis(3)).await;
        }
    }

    /// Task side: acknowledge a stop request. Only the StopRequest ->
    /// Stopped edge is taken; any other state is left alone.
    pub(crate) fn acknowledge_stop(&self) {
        let _ = self.0.compare_exchange(
            STATE_STOP_REQUEST,
            STATE_STOPPED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for Interlock {
    fn default() -> Self {
        Self::new()
    }
}
