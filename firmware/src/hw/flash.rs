//! Settings persistence on the last flash page.

use embassy_stm32::flash::{Blocking, Error as FlashError, Flash};
use ranger_core::settings::SettingsStore;

use crate::settings_page::{RECORD_LEN, RecordError, SettingsRecord};

/// Offset of the last 2 KiB page of the 512 KiB part.
pub const SETTINGS_PAGE_OFFSET: u32 = 0x0007_F800;
pub const PAGE_SIZE: u32 = 2_048;

#[derive(Copy, Clone, Debug, defmt::Format)]
pub enum FlashStoreError {
    UnknownKey,
    Erase,
    Program,
}

impl From<RecordError> for FlashStoreError {
    fn from(error: RecordError) -> Self {
        match error {
            RecordError::UnknownKey => FlashStoreError::UnknownKey,
        }
    }
}

/// [`SettingsStore`] keeping one cached [`SettingsRecord`] in sync with flash.
pub struct FlashStore<'d> {
    flash: Flash<'d, Blocking>,
    record: SettingsRecord,
}

impl<'d> FlashStore<'d> {
    /// Reads the stored record; an unreadable page starts empty.
    pub fn new(mut flash: Flash<'d, Blocking>) -> Self {
        let mut raw = [0xFF; RECORD_LEN];
        let record = match flash.blocking_read(SETTINGS_PAGE_OFFSET, &mut raw) {
            Ok(()) => SettingsRecord::decode(&raw),
            Err(error) => {
                defmt::warn!("settings: flash read failed: {}", defmt::Debug2Format(&error));
                SettingsRecord::empty()
            }
        };
        Self { flash, record }
    }

    fn write_record(&mut self) -> Result<(), FlashStoreError> {
        self.flash
            .blocking_erase(SETTINGS_PAGE_OFFSET, SETTINGS_PAGE_OFFSET + PAGE_SIZE)
            .map_err(|error: FlashError| {
                defmt::warn!("settings: erase failed: {}", defmt::Debug2Format(&error));
                FlashStoreError::Erase
            })?;
        self.flash
            .blocking_write(SETTINGS_PAGE_OFFSET, &self.record.encode())
            .map_err(|error: FlashError| {
                defmt::warn!("settings: program failed: {}", defmt::Debug2Format(&error));
                FlashStoreError::Program
            })
    }
}

impl SettingsStore for FlashStore<'_> {
    type Error = FlashStoreError;

    fn load(&mut self, key: &str) -> Option<u8> {
        self.record.get(key)
    }

    fn save(&mut self, key: &str, value: u8) -> Result<(), Self::Error> {
        if self.record.get(key) == Some(value) {
            return Ok(());
        }
        self.record.set(key, value)?;
        self.write_record()
    }
}
