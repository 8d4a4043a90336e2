//! Logical keys and the input capability.

/// Adjustment direction. Left/Right step by one, Up/Down by ten.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const SMALL_STEP: i16 = 1;
    pub const LARGE_STEP: i16 = 10;

    /// Signed change applied to a numeric setting.
    #[must_use]
    pub const fn delta(self) -> i16 {
        match self {
            Direction::Up => Self::LARGE_STEP,
            Direction::Down => -Self::LARGE_STEP,
            Direction::Right => Self::SMALL_STEP,
            Direction::Left => -Self::SMALL_STEP,
        }
    }
}

/// Discrete key press understood by the settings controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Key {
    Escape,
    SelectBrightness,
    SelectLowBattery,
    SelectLanguage,
    Adjust(Direction),
}

impl Key {
    pub const UP: Key = Key::Adjust(Direction::Up);
    pub const DOWN: Key = Key::Adjust(Direction::Down);
    pub const LEFT: Key = Key::Adjust(Direction::Left);
    pub const RIGHT: Key = Key::Adjust(Direction::Right);

    /// Maps the device keyboard layout onto logical keys.
    #[must_use]
    pub const fn from_char(ch: char) -> Option<Self> {
        match ch {
            '`' => Some(Key::Escape),
            '1' => Some(Key::SelectBrightness),
            '2' => Some(Key::SelectLowBattery),
            '3' => Some(Key::SelectLanguage),
            ';' => Some(Key::UP),
            '.' => Some(Key::DOWN),
            ',' => Some(Key::LEFT),
            '/' => Some(Key::RIGHT),
            _ => None,
        }
    }
}

/// Source of key presses. Each physical press yields one event.
pub trait KeySource {
    fn poll_key(&mut self) -> Option<Key>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_layout_maps_to_keys() {
        assert_eq!(Key::from_char('`'), Some(Key::Escape));
        assert_eq!(Key::from_char('2'), Some(Key::SelectLowBattery));
        assert_eq!(Key::from_char(';'), Some(Key::UP));
        assert_eq!(Key::from_char('/'), Some(Key::RIGHT));
        assert_eq!(Key::from_char('q'), None);
    }

    #[test]
    fn vertical_keys_take_large_steps() {
        assert_eq!(Direction::Up.delta(), 10);
        assert_eq!(Direction::Down.delta(), -10);
        assert_eq!(Direction::Right.delta(), 1);
    }
}
