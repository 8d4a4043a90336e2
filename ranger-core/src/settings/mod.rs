//! User settings: three bounded scalars persisted through a key-value store.

use core::fmt;

use heapless::String;
use heapless::index_map::FnvIndexMap;

pub mod controller;

pub use controller::{KeyOutcome, SettingsController};

/// Declared range and persistence key of one setting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoundedSetting {
    pub key: &'static str,
    pub min: u8,
    pub max: u8,
    pub init: u8,
}

impl BoundedSetting {
    /// Clamps `value` into `[min, max]`.
    #[must_use]
    pub fn clamp(&self, value: i16) -> u8 {
        let clamped = value.clamp(i16::from(self.min), i16::from(self.max));
        // Within u8 range after the clamp.
        u8::try_from(clamped).unwrap_or(self.init)
    }

    #[must_use]
    pub const fn contains(&self, value: u8) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const BRIGHTNESS: BoundedSetting = BoundedSetting {
    key: "brt",
    min: 0,
    max: 255,
    init: 30,
};

pub const LOW_BATTERY_THRESHOLD: BoundedSetting = BoundedSetting {
    key: "lbat",
    min: 5,
    max: 95,
    init: 10,
};

pub const LANGUAGE: BoundedSetting = BoundedSetting {
    key: "lang",
    min: 0,
    max: 1,
    init: 0,
};

/// Identifies one of the persisted settings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Setting {
    Brightness,
    LowBatteryThreshold,
    Language,
}

impl Setting {
    pub const ALL: [Setting; 3] = [
        Setting::Brightness,
        Setting::LowBatteryThreshold,
        Setting::Language,
    ];

    #[must_use]
    pub const fn bounds(self) -> BoundedSetting {
        match self {
            Setting::Brightness => BRIGHTNESS,
            Setting::LowBatteryThreshold => LOW_BATTERY_THRESHOLD,
            Setting::Language => LANGUAGE,
        }
    }

    /// Label used on the status line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Setting::Brightness => "bright",
            Setting::LowBatteryThreshold => "lowBattery threshold",
            Setting::Language => "lang",
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bounds().key)
    }
}

/// Supported user interface languages.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Language {
    #[default]
    English,
    Japanese,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Japanese];

    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Language::English => 0,
            Language::Japanese => 1,
        }
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Language::English),
            1 => Some(Language::Japanese),
            _ => None,
        }
    }

    /// Next language, wrapping around.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Language::English => Language::Japanese,
            Language::Japanese => Language::English,
        }
    }

    /// Name of the language written in that language.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Japanese => "日本語",
        }
    }
}

/// Current values of every setting. Each field stays within its declared range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    pub brightness: u8,
    pub low_battery_threshold: u8,
    pub language: Language,
}

impl Settings {
    /// Loads every setting, falling back to init values and clamping stored ones.
    pub fn load<S: SettingsStore + ?Sized>(store: &mut S) -> Self {
        Self {
            brightness: load_bounded(store, BRIGHTNESS),
            low_battery_threshold: load_bounded(store, LOW_BATTERY_THRESHOLD),
            language: Language::from_index(load_bounded(store, LANGUAGE)).unwrap_or_default(),
        }
    }

    #[must_use]
    pub const fn value(&self, setting: Setting) -> u8 {
        match setting {
            Setting::Brightness => self.brightness,
            Setting::LowBatteryThreshold => self.low_battery_threshold,
            Setting::Language => self.language.index(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            brightness: BRIGHTNESS.init,
            low_battery_threshold: LOW_BATTERY_THRESHOLD.init,
            language: Language::default(),
        }
    }
}

fn load_bounded<S: SettingsStore + ?Sized>(store: &mut S, bounds: BoundedSetting) -> u8 {
    store
        .load(bounds.key)
        .map_or(bounds.init, |value| bounds.clamp(i16::from(value)))
}

/// Persistent key-value store provided by the host platform.
pub trait SettingsStore {
    type Error: fmt::Debug;

    /// Returns the stored value for `key`, if any.
    fn load(&mut self, key: &str) -> Option<u8>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns the platform error when the value could not be written.
    fn save(&mut self, key: &str, value: u8) -> Result<(), Self::Error>;
}

/// Maximum key length accepted by [`MemoryStore`].
pub const MEMORY_STORE_KEY_LEN: usize = 8;

/// Errors reported by [`MemoryStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryStoreError {
    KeyTooLong,
    Full,
}

impl fmt::Display for MemoryStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryStoreError::KeyTooLong => f.write_str("key too long"),
            MemoryStoreError::Full => f.write_str("store full"),
        }
    }
}

/// RAM-backed store for tests and targets without persistent memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: FnvIndexMap<String<MEMORY_STORE_KEY_LEN>, u8, 8>,
    writes: u32,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with `entries`; oversized keys are skipped.
    #[must_use]
    pub fn with_entries(entries: &[(&str, u8)]) -> Self {
        let mut store = Self::new();
        for &(key, value) in entries {
            let _ = store.insert(key, value);
        }
        store
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub const fn write_count(&self) -> u32 {
        self.writes
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<u8> {
        self.values
            .iter()
            .find(|(stored, _)| stored.as_str() == key)
            .map(|(_, value)| *value)
    }

    fn insert(&mut self, key: &str, value: u8) -> Result<(), MemoryStoreError> {
        let key: String<MEMORY_STORE_KEY_LEN> =
            String::try_from(key).map_err(|_| MemoryStoreError::KeyTooLong)?;
        self.values
            .insert(key, value)
            .map(|_| ())
            .map_err(|_| MemoryStoreError::Full)
    }
}

impl SettingsStore for MemoryStore {
    type Error = MemoryStoreError;

    fn load(&mut self, key: &str) -> Option<u8> {
        self.get(key)
    }

    fn save(&mut self, key: &str, value: u8) -> Result<(), Self::Error> {
        self.insert(key, value)?;
        self.writes = self.writes.wrapping_add(1);
        Ok(())
    }
}

/// Which setting, if any, the directional keys currently edit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SettingsMode {
    #[default]
    Escaped,
    EditingBrightness,
    EditingLowBatteryThreshold,
    EditingLanguage,
}

impl SettingsMode {
    /// Setting edited in this mode.
    #[must_use]
    pub const fn setting(self) -> Option<Setting> {
        match self {
            SettingsMode::Escaped => None,
            SettingsMode::EditingBrightness => Some(Setting::Brightness),
            SettingsMode::EditingLowBatteryThreshold => Some(Setting::LowBatteryThreshold),
            SettingsMode::EditingLanguage => Some(Setting::Language),
        }
    }
}

impl fmt::Display for SettingsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.setting() {
            Some(setting) => write!(f, "edit {setting}"),
            None => f.write_str("escaped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_keys_fall_back_to_init_values() {
        let mut store = MemoryStore::new();
        let settings = Settings::load(&mut store);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.brightness, 30);
        assert_eq!(settings.low_battery_threshold, 10);
        assert_eq!(settings.language, Language::English);
    }

    #[test]
    fn stored_values_are_clamped_on_load() {
        let mut store = MemoryStore::with_entries(&[("brt", 200), ("lbat", 2), ("lang", 7)]);
        let settings = Settings::load(&mut store);

        assert_eq!(settings.brightness, 200);
        assert_eq!(settings.low_battery_threshold, 5);
        assert_eq!(settings.language, Language::Japanese);
    }

    #[test]
    fn memory_store_rejects_long_keys() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.save("much-too-long-key", 1),
            Err(MemoryStoreError::KeyTooLong)
        );
        assert_eq!(store.write_count(), 0);
        store.save("brt", 40).expect("short key is accepted");
        assert_eq!(store.get("brt"), Some(40));
    }

    #[test]
    fn clamp_respects_declared_range() {
        assert_eq!(LOW_BATTERY_THRESHOLD.clamp(100), 95);
        assert_eq!(LOW_BATTERY_THRESHOLD.clamp(-3), 5);
        assert_eq!(BRIGHTNESS.clamp(260), 255);
        assert!(LANGUAGE.contains(1));
        assert!(!LANGUAGE.contains(2));
    }
}
