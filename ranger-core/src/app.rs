//! The cooperative main loop tying ranging, battery and settings together.
//!
//! [`MainLoop::step`] performs one bounded pass: it advances the ranging
//! engine, then the battery monitor, then dispatches at most one key press.
//! Callers sleep for [`RangerConfig::idle_yield`] between steps.

use core::time::Duration;

use crate::battery::{BatteryConfig, BatteryEvent, BatteryMonitor, BatterySource, PowerSwitch};
use crate::display::{Display, layout};
use crate::echo::EchoCapture;
use crate::input::KeySource;
use crate::ranging::{RangingConfig, RangingEngine, RangingEvent, TriggerDriver};
use crate::settings::{SettingsController, SettingsStore};
use crate::telemetry::TelemetryRecorder;
use crate::time::Instant;

/// Pause between loop iterations.
pub const DEFAULT_IDLE_YIELD: Duration = Duration::from_millis(1);

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RangerConfig {
    pub ranging: RangingConfig,
    pub battery: BatteryConfig,
    pub idle_yield: Duration,
}

impl RangerConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ranging: RangingConfig::new(),
            battery: BatteryConfig::new(),
            idle_yield: DEFAULT_IDLE_YIELD,
        }
    }

    #[must_use]
    pub const fn with_ranging(mut self, ranging: RangingConfig) -> Self {
        self.ranging = ranging;
        self
    }

    #[must_use]
    pub const fn with_battery(mut self, battery: BatteryConfig) -> Self {
        self.battery = battery;
        self
    }
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopStatus {
    Running,
    /// The low-battery shutdown ran and power-off returned control.
    Halted,
}

pub struct MainLoop<'a, T, B, P, S, D, K> {
    ranging: RangingEngine<'a, T>,
    battery: BatteryMonitor<B>,
    settings: SettingsController<S>,
    power: P,
    display: D,
    keys: K,
    telemetry: TelemetryRecorder,
    config: RangerConfig,
    halted: bool,
}

impl<'a, T, B, P, S, D, K> MainLoop<'a, T, B, P, S, D, K>
where
    T: TriggerDriver,
    B: BatterySource,
    P: PowerSwitch,
    S: SettingsStore,
    D: Display,
    K: KeySource,
{
    /// Wires the components together and loads the persisted settings.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        echo: &'a EchoCapture,
        trigger: T,
        battery: B,
        power: P,
        store: S,
        display: D,
        keys: K,
        config: RangerConfig,
    ) -> Self {
        Self {
            ranging: RangingEngine::new(echo, trigger, config.ranging),
            battery: BatteryMonitor::new(battery, config.battery),
            settings: SettingsController::load(store),
            power,
            display,
            keys,
            telemetry: TelemetryRecorder::new(),
            config,
            halted: false,
        }
    }

    /// Applies the stored brightness and paints the initial screen.
    ///
    /// `now` counts as the previous trigger and battery sample, so the first
    /// ping and the first battery reading each wait one full interval.
    pub fn start(&mut self, now: Instant) {
        self.ranging.start_at(now);
        self.battery.start_at(now);
        self.settings.apply_startup(&mut self.display);
        layout::draw_initial_screen(&mut self.display, self.settings.language());
        self.display.flush();
    }

    /// One non-blocking pass over every component.
    pub fn step(&mut self, now: Instant) -> LoopStatus {
        if self.halted {
            return LoopStatus::Halted;
        }

        match self.ranging.poll(now, &mut self.display) {
            Some(RangingEvent::Triggered) => {
                self.telemetry.record_trigger(now);
            }
            Some(RangingEvent::Measured(measurement)) => {
                self.telemetry.record_measurement(&measurement, now);
            }
            None => {}
        }

        let threshold = self.settings.low_battery_threshold();
        if let Some(event) =
            self.battery
                .poll(now, threshold, &mut self.display, &mut self.power)
        {
            self.telemetry.record_battery(&event, now);
            if matches!(event, BatteryEvent::Shutdown { .. }) {
                self.halted = true;
                return LoopStatus::Halted;
            }
        }

        if let Some(key) = self.keys.poll_key() {
            let outcome = self.settings.handle_key(key, &mut self.display);
            self.telemetry.record_key(&outcome, now);
        }

        LoopStatus::Running
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn config(&self) -> &RangerConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn ranging(&self) -> &RangingEngine<'a, T> {
        &self.ranging
    }

    pub fn ranging_mut(&mut self) -> &mut RangingEngine<'a, T> {
        &mut self.ranging
    }

    pub fn battery(&self) -> &BatteryMonitor<B> {
        &self.battery
    }

    pub fn battery_mut(&mut self) -> &mut BatteryMonitor<B> {
        &mut self.battery
    }

    pub fn settings(&self) -> &SettingsController<S> {
        &self.settings
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }
}
