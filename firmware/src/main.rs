#![no_std]
#![no_main]

mod board;
mod pwm;

use embassy_executor::Spawner;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use actuator_core::messaging as msg;
use actuator_core::settings::{ActuatorSettings, MixerSettings, SystemSettings};

use crate::board::Board;
use crate::pwm::{Iwdg, PwmBanks};

#[embassy_executor::task]
async fn actuator_task(servo: PwmBanks, watchdog: Iwdg) -> ! {
    actuator_core::tasks::actuator::run(servo, watchdog).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;

    // 2. Servo banks: TIM3 motors (PA6 PA7 PB0 PB1), TIM4 servos (PB6-PB9)
    let servo = PwmBanks::new(
        p.TIM3, p.PA6, p.PA7, p.PB0, p.PB1, p.TIM4, p.PB6, p.PB7, p.PB8, p.PB9,
    );

    // 3. Watchdog must be armed before the task starts
    let watchdog = Iwdg::new(p.IWDG);

    // 4. Seed the bus so the task's first tick sees coherent configuration.
    //    The GCS link replaces these with the persisted settings once up.
    msg::ACTUATOR_SETTINGS.sender().send(ActuatorSettings::default());
    msg::MIXER_SETTINGS.sender().send(MixerSettings::quad_x());
    msg::SYSTEM_SETTINGS.sender().send(SystemSettings::default());

    // 5. Actuator task
    spawner.spawn(actuator_task(servo, watchdog)).unwrap();
    defmt::info!("actuator firmware up, outputs in failsafe until input flows");

    // 6. Main task: LED heartbeat @ 1 Hz
    let mut led = Output::new(p.PC13, Level::High, Speed::Low);
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}
