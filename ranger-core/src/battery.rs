//! Periodic battery sampling, flicker suppression and the low-battery shutdown.
//!
//! Each sample goes through two independent paths. The alarm path counts
//! consecutive readings under the user threshold and powers the device off
//! once the count reaches the cap. The display path rejects jumps larger than
//! the fluctuation tolerance as noise, then skips redraws of the value that is
//! already on screen.

use core::time::Duration;

use crate::display::{Display, layout};
use crate::time::Instant;

/// Default sampling period. Deliberately not a round number so it does not
/// beat against the one second ranging cadence.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(1_993);
/// Largest accepted jump between consecutive raw samples.
pub const DEFAULT_FLUCTUATION_TOLERANCE: u8 = 5;
/// Consecutive low samples that trigger the shutdown.
pub const DEFAULT_LOW_READING_CAP: u8 = 5;

pub const MAX_LEVEL: u8 = 100;

/// Raw battery gauge.
pub trait BatterySource {
    /// Charge level in percent. May fall outside `0..=100`.
    fn read_percent(&mut self) -> i32;
}

/// Cuts power to the device.
pub trait PowerSwitch {
    /// Expected not to return. If it does, the monitor halts.
    fn power_off(&mut self);
}

/// Linear charge estimate between `empty_mv` and `full_mv`, clamped to `0..=100`.
#[must_use]
pub fn percent_from_millivolts(millivolts: u32, empty_mv: u32, full_mv: u32) -> u8 {
    if full_mv <= empty_mv || millivolts <= empty_mv {
        return 0;
    }
    let span = full_mv - empty_mv;
    let above = (millivolts - empty_mv).min(span);
    u8::try_from(above * u32::from(MAX_LEVEL) / span).unwrap_or(MAX_LEVEL)
}

/// Clamps a raw gauge value into `0..=100`.
#[must_use]
pub fn clamp_level(raw: i32) -> u8 {
    u8::try_from(raw.clamp(0, i32::from(MAX_LEVEL))).unwrap_or(MAX_LEVEL)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BatteryConfig {
    pub sample_interval: Duration,
    pub fluctuation_tolerance: u8,
    pub low_reading_cap: u8,
}

impl BatteryConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            fluctuation_tolerance: DEFAULT_FLUCTUATION_TOLERANCE,
            low_reading_cap: DEFAULT_LOW_READING_CAP,
        }
    }

    #[must_use]
    pub const fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// State reported by [`LowBatteryAlarm::observe`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlarmState {
    Clear,
    Counting(u8),
    Tripped,
}

/// Saturating counter of consecutive samples below the threshold.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LowBatteryAlarm {
    consecutive_low: u8,
    cap: u8,
}

impl LowBatteryAlarm {
    #[must_use]
    pub const fn new(cap: u8) -> Self {
        Self {
            consecutive_low: 0,
            cap,
        }
    }

    #[must_use]
    pub const fn consecutive_low(&self) -> u8 {
        self.consecutive_low
    }

    pub fn observe(&mut self, level: u8, threshold: u8) -> AlarmState {
        if level >= threshold {
            self.consecutive_low = 0;
            return AlarmState::Clear;
        }

        if self.consecutive_low < self.cap {
            self.consecutive_low += 1;
        }
        if self.consecutive_low >= self.cap {
            AlarmState::Tripped
        } else {
            AlarmState::Counting(self.consecutive_low)
        }
    }
}

/// How a sample was treated by the display path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleDisplay {
    /// Drawn and flushed.
    Redrawn,
    /// Same value already on screen.
    Unchanged,
    /// Jump above the tolerance; remembered but not drawn.
    Noise,
}

/// Something the monitor did during a poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatteryEvent {
    Sampled {
        level: u8,
        alarm: AlarmState,
        display: SampleDisplay,
    },
    /// Sustained low battery: warning drawn and power-off requested.
    Shutdown { level: u8, consecutive_low: u8 },
}

pub struct BatteryMonitor<B> {
    source: B,
    config: BatteryConfig,
    alarm: LowBatteryAlarm,
    last_sample_at: Option<Instant>,
    previous_raw: Option<u8>,
    displayed: Option<u8>,
    halted: bool,
}

impl<B> BatteryMonitor<B>
where
    B: BatterySource,
{
    pub fn new(source: B, config: BatteryConfig) -> Self {
        Self {
            source,
            alarm: LowBatteryAlarm::new(config.low_reading_cap),
            config,
            last_sample_at: None,
            previous_raw: None,
            displayed: None,
            halted: false,
        }
    }

    pub fn alarm(&self) -> &LowBatteryAlarm {
        &self.alarm
    }

    /// Level currently on screen.
    pub fn displayed(&self) -> Option<u8> {
        self.displayed
    }

    /// `true` once the shutdown ran and power-off returned control.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn source_mut(&mut self) -> &mut B {
        &mut self.source
    }

    /// Counts `now` as the previous sample, so the first reading waits a full interval.
    pub fn start_at(&mut self, now: Instant) {
        self.last_sample_at = Some(now);
    }

    /// Takes a sample when the interval has elapsed. Without [`Self::start_at`] the first poll
    /// samples immediately.
    pub fn poll<D, P>(
        &mut self,
        now: Instant,
        threshold: u8,
        display: &mut D,
        power: &mut P,
    ) -> Option<BatteryEvent>
    where
        D: Display + ?Sized,
        P: PowerSwitch + ?Sized,
    {
        if self.halted {
            return None;
        }
        if let Some(last) = self.last_sample_at
            && now.saturating_duration_since(last) < self.config.sample_interval
        {
            return None;
        }
        self.last_sample_at = Some(now);

        let level = clamp_level(self.source.read_percent());

        let alarm = self.alarm.observe(level, threshold);
        if alarm == AlarmState::Tripped {
            layout::draw_low_battery_warning(display);
            display.flush();
            power.power_off();
            self.halted = true;
            return Some(BatteryEvent::Shutdown {
                level,
                consecutive_low: self.alarm.consecutive_low(),
            });
        }

        let display_outcome = self.show(level, display);
        Some(BatteryEvent::Sampled {
            level,
            alarm,
            display: display_outcome,
        })
    }

    fn show<D: Display + ?Sized>(&mut self, level: u8, display: &mut D) -> SampleDisplay {
        let previous = self.previous_raw.replace(level);
        if let Some(previous) = previous
            && previous.abs_diff(level) > self.config.fluctuation_tolerance
        {
            return SampleDisplay::Noise;
        }

        if self.displayed == Some(level) {
            return SampleDisplay::Unchanged;
        }
        self.displayed = Some(level);
        layout::draw_battery_level(display, level);
        display.flush();
        SampleDisplay::Redrawn
    }
}
