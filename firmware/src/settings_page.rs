//! On-flash layout of the persisted settings.
//!
//! Settings live in a single 8-byte record at the start of the last flash
//! page, matching the G0's double-word program granularity:
//!
//! | byte | content                          |
//! |------|----------------------------------|
//! | 0    | magic `0xA5`                     |
//! | 1    | layout version                   |
//! | 2..5 | one slot per known key           |
//! | 5    | presence bitmask, bit `n` = slot `n` |
//! | 6    | XOR checksum of bytes 0..6       |
//! | 7    | `0xFF`                           |
//!
//! An erased or corrupt page decodes as an empty record, so every setting
//! falls back to its initial value.

pub const RECORD_LEN: usize = 8;

const MAGIC: u8 = 0xA5;
const VERSION: u8 = 1;
const SLOT_BASE: usize = 2;
const PRESENCE: usize = 5;
const CHECKSUM: usize = 6;

/// Store keys, in slot order.
pub const KEYS: [&str; 3] = ["brt", "lbat", "lang"];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordError {
    UnknownKey,
}

/// Decoded settings record.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SettingsRecord {
    slots: [Option<u8>; KEYS.len()],
}

fn slot_of(key: &str) -> Option<usize> {
    KEYS.iter().position(|&known| known == key)
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

impl SettingsRecord {
    pub const fn empty() -> Self {
        Self {
            slots: [None; KEYS.len()],
        }
    }

    pub fn get(&self, key: &str) -> Option<u8> {
        slot_of(key).and_then(|slot| self.slots[slot])
    }

    pub fn set(&mut self, key: &str, value: u8) -> Result<(), RecordError> {
        let slot = slot_of(key).ok_or(RecordError::UnknownKey)?;
        self.slots[slot] = Some(value);
        Ok(())
    }

    /// Parses a raw record; anything unrecognised yields an empty record.
    pub fn decode(raw: &[u8; RECORD_LEN]) -> Self {
        if raw[0] != MAGIC || raw[1] != VERSION || checksum(&raw[..CHECKSUM]) != raw[CHECKSUM] {
            return Self::empty();
        }

        let mut record = Self::empty();
        for (index, slot) in record.slots.iter_mut().enumerate() {
            if raw[PRESENCE] & (1 << index) != 0 {
                *slot = Some(raw[SLOT_BASE + index]);
            }
        }
        record
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut raw = [0xFF; RECORD_LEN];
        raw[0] = MAGIC;
        raw[1] = VERSION;
        raw[PRESENCE] = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(value) => {
                    raw[SLOT_BASE + index] = *value;
                    raw[PRESENCE] |= 1 << index;
                }
                None => raw[SLOT_BASE + index] = 0xFF,
            }
        }
        raw[CHECKSUM] = checksum(&raw[..CHECKSUM]);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_flash_is_an_empty_record() {
        let record = SettingsRecord::decode(&[0xFF; RECORD_LEN]);
        assert_eq!(record, SettingsRecord::empty());
        assert_eq!(record.get("brt"), None);
    }

    #[test]
    fn stored_values_survive_a_reload() {
        let mut record = SettingsRecord::empty();
        record.set("lbat", 35).expect("known key");
        record.set("lang", 1).expect("known key");

        let reloaded = SettingsRecord::decode(&record.encode());

        assert_eq!(reloaded.get("lbat"), Some(35));
        assert_eq!(reloaded.get("lang"), Some(1));
        assert_eq!(reloaded.get("brt"), None);
    }

    #[test]
    fn corrupt_record_is_ignored() {
        let mut record = SettingsRecord::empty();
        record.set("brt", 200).expect("known key");
        let mut raw = record.encode();
        raw[SLOT_BASE] ^= 0x01;

        assert_eq!(SettingsRecord::decode(&raw), SettingsRecord::empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut record = SettingsRecord::empty();
        assert_eq!(record.set("volume", 3), Err(RecordError::UnknownKey));
    }
}
