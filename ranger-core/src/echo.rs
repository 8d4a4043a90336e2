//! Echo edge capture shared between the interrupt context and the main loop.
//!
//! The echo line interrupt calls [`EchoCapture::on_edge`] on every transition.
//! The ranging engine is the only reader and goes through
//! [`EchoCapture::take`], which snapshots and clears the whole window inside a
//! critical section so a fresh rise can never be paired with a stale fall.

use core::cell::Cell;
use core::time::Duration;

use critical_section::Mutex;

use crate::time::Instant;

/// Logic level observed on the echo line after a transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EchoLevel {
    High,
    Low,
}

impl EchoLevel {
    #[must_use]
    pub const fn from_high(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

/// Rise/fall timestamp pair captured for one ping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EchoWindow {
    pub rise: Instant,
    pub fall: Instant,
    pub ready: bool,
}

impl EchoWindow {
    const EMPTY: Self = Self {
        rise: Instant::ZERO,
        fall: Instant::ZERO,
        ready: false,
    };
}

/// Completed echo pulse handed to the synchronous side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EchoPulse {
    pub rise: Instant,
    pub fall: Instant,
}

impl EchoPulse {
    /// Pulse width, or `None` when the fall precedes the rise.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.fall.checked_duration_since(self.rise)
    }

    /// Pulse width in microseconds, saturating at `u32::MAX`.
    #[must_use]
    pub fn duration_micros(&self) -> Option<u32> {
        self.duration()
            .map(|width| u32::try_from(width.as_micros()).unwrap_or(u32::MAX))
    }
}

/// Interrupt-safe holder for the current [`EchoWindow`].
pub struct EchoCapture {
    window: Mutex<Cell<EchoWindow>>,
}

impl EchoCapture {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window: Mutex::new(Cell::new(EchoWindow::EMPTY)),
        }
    }

    /// Records an edge. Called from the echo line interrupt.
    pub fn on_edge(&self, level: EchoLevel, now: Instant) {
        critical_section::with(|cs| {
            let cell = self.window.borrow(cs);
            let mut window = cell.get();
            match level {
                EchoLevel::High => window.rise = now,
                EchoLevel::Low => {
                    window.fall = now;
                    window.ready = true;
                }
            }
            cell.set(window);
        });
    }

    /// Drops any completed pulse so the next cycle starts clean.
    pub fn arm(&self) {
        critical_section::with(|cs| {
            let cell = self.window.borrow(cs);
            let mut window = cell.get();
            window.ready = false;
            cell.set(window);
        });
    }

    /// Takes the completed pulse, clearing the ready flag in the same critical section.
    pub fn take(&self) -> Option<EchoPulse> {
        critical_section::with(|cs| {
            let cell = self.window.borrow(cs);
            let window = cell.get();
            if !window.ready {
                return None;
            }
            cell.set(EchoWindow::EMPTY);
            Some(EchoPulse {
                rise: window.rise,
                fall: window.fall,
            })
        })
    }

    /// Copy of the current window, for diagnostics.
    pub fn snapshot(&self) -> EchoWindow {
        critical_section::with(|cs| self.window.borrow(cs).get())
    }
}

impl Default for EchoCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falling_edge_completes_the_window() {
        let capture = EchoCapture::new();
        capture.on_edge(EchoLevel::High, Instant::from_micros(1_000));
        assert_eq!(capture.take(), None);

        capture.on_edge(EchoLevel::Low, Instant::from_micros(2_000));
        let pulse = capture.take().expect("pulse should be ready");
        assert_eq!(pulse.duration_micros(), Some(1_000));
        assert_eq!(capture.take(), None, "take must clear the ready flag");
    }

    #[test]
    fn arm_discards_a_stale_pulse() {
        let capture = EchoCapture::new();
        capture.on_edge(EchoLevel::High, Instant::from_micros(10));
        capture.on_edge(EchoLevel::Low, Instant::from_micros(20));

        capture.arm();
        assert!(!capture.snapshot().ready);
        assert_eq!(capture.take(), None);
    }

    #[test]
    fn reversed_edges_have_no_duration() {
        let pulse = EchoPulse {
            rise: Instant::from_micros(50),
            fall: Instant::from_micros(40),
        };
        assert_eq!(pulse.duration_micros(), None);
    }
}
