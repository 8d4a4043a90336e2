//! Board adapters implementing the `ranger-core` capability traits.
//!
//! Pin map (STM32G0B1KE):
//!
//! | signal          | pin  | peripheral        |
//! |-----------------|------|-------------------|
//! | sensor trigger  | PA0  | GPIO out          |
//! | sensor echo     | PA1  | EXTI1             |
//! | console TX / RX | PA2 / PA3 | USART2       |
//! | battery sense   | PA4  | ADC1 IN4 (1:2 divider) |
//! | power latch     | PA5  | GPIO out, high holds power |
//! | backlight       | PA6  | TIM3 CH1 PWM      |

#![cfg(target_os = "none")]

use embassy_stm32::gpio::Output;
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_time::{Duration, block_for};
use ranger_core::battery::PowerSwitch;
use ranger_core::ranging::TriggerDriver;

use crate::console::Backlight;

pub mod flash;
pub mod power;

pub use flash::FlashStore;
pub use power::BatteryAdc;

/// Settle time with the trigger held low before the pulse.
const TRIGGER_SETTLE: Duration = Duration::from_micros(2);
/// HC-SR04 trigger pulse width.
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Reads the embassy clock as a core timestamp.
pub fn now() -> ranger_core::Instant {
    ranger_core::Instant::from_micros(embassy_time::Instant::now().as_micros())
}

/// Sensor trigger line.
pub struct TriggerPin<'d> {
    pin: Output<'d>,
}

impl<'d> TriggerPin<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl TriggerDriver for TriggerPin<'_> {
    fn fire(&mut self) {
        self.pin.set_low();
        block_for(TRIGGER_SETTLE);
        self.pin.set_high();
        block_for(TRIGGER_PULSE);
        self.pin.set_low();
    }
}

/// Self-holding power latch: releasing it cuts the regulator enable.
pub struct PowerLatch<'d> {
    pin: Output<'d>,
}

impl<'d> PowerLatch<'d> {
    /// Takes over a latch pin that was driven high at boot.
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl PowerSwitch for PowerLatch<'_> {
    fn power_off(&mut self) {
        defmt::warn!("power: releasing latch");
        self.pin.set_low();
        // The rail collapses within a few milliseconds; returning means USB or a
        // bench supply is keeping the MCU alive.
        block_for(Duration::from_millis(50));
    }
}

/// Backlight driven from TIM3 channel 1.
pub struct PwmBacklight<'d> {
    pwm: SimplePwm<'d, TIM3>,
}

impl<'d> PwmBacklight<'d> {
    pub fn new(mut pwm: SimplePwm<'d, TIM3>) -> Self {
        pwm.ch1().enable();
        Self { pwm }
    }
}

impl Backlight for PwmBacklight<'_> {
    fn set_level(&mut self, level: u8) {
        self.pwm
            .ch1()
            .set_duty_cycle_fraction(u16::from(level), u16::from(u8::MAX));
    }
}
