//! Servo/PWM output banks and the watchdog handle.
//!
//! Two 4-channel timer banks: TIM3 carries the motor outputs, TIM4 the
//! servo outputs, each with its own update rate.

use embassy_stm32::gpio::OutputType;
use embassy_stm32::peripherals::{IWDG, PA6, PA7, PB0, PB1, PB6, PB7, PB8, PB9, TIM3, TIM4};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::{Channel as TimerChannel, CountingMode};
use embassy_stm32::wdg::IndependentWatchdog;

use actuator_core::output::{ServoOutput, Watchdog};
use actuator_core::settings::{ACTUATOR_CHANNELS, NUM_TIMER_BANKS};

const CHANNELS_PER_BANK: usize = 4;

// The core's bank/channel model must fit this board's timer layout.
const _: () = assert!(NUM_TIMER_BANKS == 2);
const _: () = assert!(NUM_TIMER_BANKS * CHANNELS_PER_BANK <= ACTUATOR_CHANNELS);

/// The actuator task feeds this at every loop iteration; a hung loop
/// resets the MCU well before a motor can run away.
const WATCHDOG_TIMEOUT_US: u32 = 250_000;

const BANK_CHANNELS: [TimerChannel; CHANNELS_PER_BANK] = [
    TimerChannel::Ch1,
    TimerChannel::Ch2,
    TimerChannel::Ch3,
    TimerChannel::Ch4,
];

pub struct PwmBanks {
    motors: SimplePwm<'static, TIM3>,
    servos: SimplePwm<'static, TIM4>,
    update_freq: [u16; NUM_TIMER_BANKS],
}

impl PwmBanks {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tim3: TIM3,
        m1: PA6,
        m2: PA7,
        m3: PB0,
        m4: PB1,
        tim4: TIM4,
        s1: PB6,
        s2: PB7,
        s3: PB8,
        s4: PB9,
    ) -> Self {
        let motors = SimplePwm::new(
            tim3,
            Some(PwmPin::new_ch1(m1, OutputType::PushPull)),
            Some(PwmPin::new_ch2(m2, OutputType::PushPull)),
            Some(PwmPin::new_ch3(m3, OutputType::PushPull)),
            Some(PwmPin::new_ch4(m4, OutputType::PushPull)),
            Hertz(50),
            CountingMode::EdgeAlignedUp,
        );
        let servos = SimplePwm::new(
            tim4,
            Some(PwmPin::new_ch1(s1, OutputType::PushPull)),
            Some(PwmPin::new_ch2(s2, OutputType::PushPull)),
            Some(PwmPin::new_ch3(s3, OutputType::PushPull)),
            Some(PwmPin::new_ch4(s4, OutputType::PushPull)),
            Hertz(50),
            CountingMode::EdgeAlignedUp,
        );

        let mut banks = Self {
            motors,
            servos,
            update_freq: [50; NUM_TIMER_BANKS],
        };
        for ch in BANK_CHANNELS {
            banks.motors.enable(ch);
            banks.servos.enable(ch);
        }
        banks
    }
}

/// Pulse width to compare counts at the bank's current rate, rounded.
fn duty_from_us(width_us: u16, freq_hz: u16, max_duty: u32) -> u32 {
    let counts =
        (width_us as u64 * freq_hz as u64 * max_duty as u64 + 500_000) / 1_000_000;
    counts.min(max_duty as u64) as u32
}

impl ServoOutput for PwmBanks {
    fn set_mode(
        &mut self,
        update_freq: &[u16; NUM_TIMER_BANKS],
        _channel_max: &[u16; ACTUATOR_CHANNELS],
        _channel_min: &[u16; ACTUATOR_CHANNELS],
    ) {
        // Pulse limits are enforced during scaling; only the rates matter
        // to the timers.
        self.update_freq = *update_freq;
        self.motors.set_frequency(Hertz(update_freq[0] as u32));
        self.servos.set_frequency(Hertz(update_freq[1] as u32));
    }

    fn set(&mut self, channel: usize, width_us: u16) {
        let (bank, freq, ch) = match channel {
            0..=3 => (&mut self.motors, self.update_freq[0], BANK_CHANNELS[channel]),
            4..=7 => {
                let servo_ch = channel - CHANNELS_PER_BANK;
                (&mut self.servos, self.update_freq[1], BANK_CHANNELS[servo_ch])
            }
            // Channels beyond the timer banks are not wired on this board.
            _ => return,
        };

        let max_duty = bank.get_max_duty();
        bank.set_duty(ch, duty_from_us(width_us, freq, max_duty));
    }

    fn update(&mut self) {
        // Compare registers are preloaded; the new duties latch together at
        // each bank's next update event.
    }
}

pub struct Iwdg(IndependentWatchdog<'static, IWDG>);

impl Iwdg {
    pub fn new(iwdg: IWDG) -> Self {
        let mut watchdog = IndependentWatchdog::new(iwdg, WATCHDOG_TIMEOUT_US);
        watchdog.unleash();
        Self(watchdog)
    }
}

impl Watchdog for Iwdg {
    fn feed(&mut self) {
        self.0.pet();
    }
}
