//! Calibrated battery voltage sampling.
//!
//! The battery is sensed through a 1:2 divider on an ADC input. Each sample
//! also reads the internal voltage reference so the conversion tracks the
//! actual VDDA instead of assuming a 3.3 V rail.

use core::ptr;

use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime, VrefInt};
use embassy_stm32::peripherals::ADC1;
use ranger_core::battery::{BatterySource, percent_from_millivolts};

/// Factory-programmed calibration constant sampled at 3.0 V.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;
const VREFINT_CAL_MILLIVOLTS: u32 = 3_000;
const FULL_SCALE: u32 = 4_095;
/// Divider ratio between the battery and the ADC pin.
const DIVIDER: u32 = 2;

/// Single-cell Li-ion window mapped onto 0..=100 %.
pub const EMPTY_MILLIVOLTS: u32 = 3_300;
pub const FULL_MILLIVOLTS: u32 = 4_200;

/// Reads the factory-trimmed VREFINT calibration constant.
pub fn read_vrefint_calibration() -> u16 {
    unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) }
}

/// ADC wrapper producing battery percentages.
pub struct BatteryAdc<'d> {
    adc: Adc<'d, ADC1>,
    vrefint: VrefInt,
    sense: AnyAdcChannel<ADC1>,
    calibration: u32,
    discard_next: bool,
    last_percent: u8,
}

impl<'d> BatteryAdc<'d> {
    /// Constructs the sampler and enables the internal voltage reference.
    pub fn new(mut adc: Adc<'d, ADC1>, sense: AnyAdcChannel<ADC1>) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let vrefint = adc.enable_vrefint();
        Self {
            adc,
            vrefint,
            sense,
            calibration: u32::from(read_vrefint_calibration()),
            discard_next: true,
            last_percent: 100,
        }
    }

    /// Battery voltage in millivolts, or `None` if the reference read back as zero.
    pub fn read_millivolts(&mut self) -> Option<u32> {
        if self.discard_next {
            let _ = self.adc.blocking_read(&mut self.vrefint);
            self.discard_next = false;
        }

        let reference = u32::from(self.adc.blocking_read(&mut self.vrefint));
        if reference == 0 {
            return None;
        }
        let vdda = VREFINT_CAL_MILLIVOLTS * self.calibration / reference;
        let raw = u32::from(self.adc.blocking_read(&mut self.sense));
        Some(raw * vdda / FULL_SCALE * DIVIDER)
    }
}

impl BatterySource for BatteryAdc<'_> {
    fn read_percent(&mut self) -> i32 {
        match self.read_millivolts() {
            Some(millivolts) => {
                let percent =
                    percent_from_millivolts(millivolts, EMPTY_MILLIVOLTS, FULL_MILLIVOLTS);
                defmt::debug!("battery: {=u32}mV {=u8}%", millivolts, percent);
                self.last_percent = percent;
                i32::from(percent)
            }
            None => {
                defmt::warn!("battery: VREFINT read back zero, repeating last level");
                i32::from(self.last_percent)
            }
        }
    }
}
