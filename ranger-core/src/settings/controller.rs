//! Modal settings editor driven by key presses.

use core::fmt::Write;

use super::{Language, Setting, Settings, SettingsMode, SettingsStore};
use crate::display::{Display, layout};
use crate::input::{Direction, Key};

/// Result of dispatching one key press.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyOutcome {
    /// Nothing happened: the mode was already active, or no setting is being edited.
    Ignored,
    /// A different mode became active.
    ModeChanged(SettingsMode),
    /// A directional key was applied to the setting of the active mode.
    Adjusted {
        setting: Setting,
        value: u8,
        changed: bool,
        persisted: bool,
    },
}

/// Owns the settings, the active mode and the backing store.
pub struct SettingsController<S> {
    store: S,
    settings: Settings,
    mode: SettingsMode,
}

impl<S> SettingsController<S>
where
    S: SettingsStore,
{
    /// Loads every setting from `store` and starts in [`SettingsMode::Escaped`].
    pub fn load(mut store: S) -> Self {
        let settings = Settings::load(&mut store);
        Self {
            store,
            settings,
            mode: SettingsMode::Escaped,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mode(&self) -> SettingsMode {
        self.mode
    }

    pub fn language(&self) -> Language {
        self.settings.language
    }

    pub fn low_battery_threshold(&self) -> u8 {
        self.settings.low_battery_threshold
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pushes the loaded brightness to the display.
    pub fn apply_startup<D: Display + ?Sized>(&self, display: &mut D) {
        display.set_brightness(self.settings.brightness);
    }

    pub fn handle_key<D: Display + ?Sized>(&mut self, key: Key, display: &mut D) -> KeyOutcome {
        match key {
            Key::Adjust(direction) => self.adjust(direction, display),
            Key::Escape => self.select_mode(SettingsMode::Escaped, display),
            Key::SelectBrightness => self.select_mode(SettingsMode::EditingBrightness, display),
            Key::SelectLowBattery => {
                self.select_mode(SettingsMode::EditingLowBatteryThreshold, display)
            }
            Key::SelectLanguage => self.select_mode(SettingsMode::EditingLanguage, display),
        }
    }

    fn select_mode<D: Display + ?Sized>(
        &mut self,
        mode: SettingsMode,
        display: &mut D,
    ) -> KeyOutcome {
        if mode == self.mode {
            return KeyOutcome::Ignored;
        }

        self.mode = mode;
        match mode.setting() {
            Some(setting) => self.draw_status(setting, display),
            None => layout::clear_status_line(display),
        }
        display.flush();
        KeyOutcome::ModeChanged(mode)
    }

    fn adjust<D: Display + ?Sized>(&mut self, direction: Direction, display: &mut D) -> KeyOutcome {
        let Some(setting) = self.mode.setting() else {
            return KeyOutcome::Ignored;
        };

        let previous = self.settings.value(setting);
        let value = match setting {
            Setting::Language => self.settings.language.next().index(),
            Setting::Brightness | Setting::LowBatteryThreshold => setting
                .bounds()
                .clamp(i16::from(previous) + direction.delta()),
        };

        let changed = value != previous;
        let mut persisted = true;
        if changed {
            self.assign(setting, value);
            self.apply_side_effect(setting, display);
            persisted = self.store.save(setting.bounds().key, value).is_ok();
        }

        self.draw_status(setting, display);
        display.flush();

        KeyOutcome::Adjusted {
            setting,
            value,
            changed,
            persisted,
        }
    }

    fn assign(&mut self, setting: Setting, value: u8) {
        match setting {
            Setting::Brightness => self.settings.brightness = value,
            Setting::LowBatteryThreshold => self.settings.low_battery_threshold = value,
            Setting::Language => {
                self.settings.language = Language::from_index(value).unwrap_or_default();
            }
        }
    }

    fn apply_side_effect<D: Display + ?Sized>(&self, setting: Setting, display: &mut D) {
        match setting {
            Setting::Brightness => display.set_brightness(self.settings.brightness),
            Setting::LowBatteryThreshold => {}
            Setting::Language => {
                layout::draw_measure_label(display, self.settings.language);
                layout::draw_battery_label(display, self.settings.language);
            }
        }
    }

    fn draw_status<D: Display + ?Sized>(&self, setting: Setting, display: &mut D) {
        let line = status_line(setting, &self.settings);
        layout::draw_status_line(display, &line);
    }
}

/// Formats `"<label> = <value>"` for the status line.
#[must_use]
pub fn status_line(setting: Setting, settings: &Settings) -> layout::StatusLine {
    let mut line = layout::StatusLine::new();
    // Longest label plus a language name fits the capacity.
    let _ = match setting {
        Setting::Language => write!(line, "{} = {}", setting.label(), settings.language.name()),
        Setting::Brightness | Setting::LowBatteryThreshold => {
            write!(line, "{} = {:>3}", setting.label(), settings.value(setting))
        }
    };
    line
}
