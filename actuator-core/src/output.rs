//! Channel scaling, motor clip management and the hardware output boundary.

use crate::settings::{ActuatorSettings, MixerType, ACTUATOR_CHANNELS, NUM_TIMER_BANKS};

/// Servo/PWM timer boundary. One implementation drives the real timer
/// banks; tests substitute a recorder.
pub trait ServoOutput {
    /// Reconfigure bank update rates and per-channel pulse limits.
    fn set_mode(
        &mut self,
        update_freq: &[u16; NUM_TIMER_BANKS],
        channel_max: &[u16; ACTUATOR_CHANNELS],
        channel_min: &[u16; ACTUATOR_CHANNELS],
    );
    /// Stage one channel's pulse width, microseconds.
    fn set(&mut self, channel: usize, width_us: u16);
    /// Commit all staged channels for this tick.
    fn update(&mut self);
}

/// Watchdog feed handle; the actuator task kicks it once per loop iteration
/// and while holding in the interlock.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Convert a normalized channel value in [-1, 1] to a pulse width in
/// microseconds using the channel's min/neutral/max.
///
/// `min > max` marks a reversed output; the clamp then runs in the inverted
/// sense so full scale still lands exactly on the configured endpoints.
pub fn scale_channel(value: f32, min: u16, neutral: u16, max: u16) -> u16 {
    let (min, neutral, max) = (min as f32, neutral as f32, max as f32);

    let scaled = if value >= 0.0 {
        value * (max - neutral) + neutral
    } else {
        value * (neutral - min) + neutral
    };

    let clamped = if max > min {
        scaled.clamp(min, max)
    } else {
        scaled.clamp(max, min)
    };

    clamped as u16
}

/// Motor clip management: derive a common gain and offset from the motor
/// population so saturated commands compress instead of clipping
/// asymmetrically.
///
/// - Range wider than full scale: compress it. Costs some cross-axis
///   coupling, generally less than letting it clip.
/// - High-side clip: sacrifice throttle.
/// - Low-side clip: add back at most `max_power_add` of throttle beyond
///   what clipping already added on average, to preserve attitude
///   authority.
///
/// `neg_clip` is the sum of negative motor values before compression; it is
/// rescaled along with the range so low-side accounting happens in
/// post-gain space.
pub fn clip_gain_offset(
    mut min_chan: f32,
    mut max_chan: f32,
    mut neg_clip: f32,
    num_motors: u32,
    max_power_add: f32,
) -> (f32, f32) {
    let mut gain = 1.0;
    let mut offset = 0.0;

    if max_chan - min_chan > 1.0 {
        gain = 1.0 / (max_chan - min_chan);

        max_chan *= gain;
        min_chan *= gain;
        neg_clip *= gain;
    }

    if max_chan > 1.0 {
        offset = 1.0 - max_chan;
    } else if min_chan < 0.0 {
        // neg_clip / num_motors is throttle "already added" by clipping;
        // top it up to at most max_power_add, but never push the lowest
        // channel past zero.
        let avg_neg = neg_clip / num_motors as f32;
        offset = (avg_neg + max_power_add).min(-min_chan);
    }

    (gain, offset)
}

/// Failsafe pulse for one channel: motors off, servos centered, camera
/// channels centered, disabled channels at the low end.
pub fn channel_failsafe_value(
    mixer_type: MixerType,
    settings: &ActuatorSettings,
    channel: usize,
) -> u16 {
    let min = settings.channel_min[channel];
    let neutral = settings.channel_neutral[channel];
    let max = settings.channel_max[channel];

    match mixer_type {
        MixerType::Motor => min,
        MixerType::Servo => neutral,
        MixerType::Disabled => scale_channel(-1.0, min, neutral, max),
        MixerType::CameraRoll | MixerType::CameraPitch | MixerType::CameraYaw => {
            scale_channel(0.0, min, neutral, max)
        }
    }
}
