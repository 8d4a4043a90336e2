//! Non-blocking ultrasonic ranging.
//!
//! The engine alternates between [`RangingState::Idle`] and
//! [`RangingState::AwaitingEcho`]. A trigger pulse is fired once per sample
//! interval; afterwards every poll either consumes the completed echo window
//! or gives up after the echo timeout. Nothing here waits: the echo edges are
//! timestamped by the interrupt handler through [`EchoCapture`].

use core::fmt::{self, Write};
use core::time::Duration;

use heapless::String;

use crate::display::{Display, layout};
use crate::echo::{EchoCapture, EchoPulse};
use crate::time::Instant;

/// Default time between trigger pulses.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
/// Default time to wait for an echo after a trigger.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(60);
/// Longest echo accepted as a measurement (about 6.5 m).
pub const DEFAULT_MAX_ECHO_MICROS: u16 = 38_000;
/// Speed of sound at roughly 20 °C.
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.034_35;

/// Emits the trigger pulse on the sensor's trigger line.
pub trait TriggerDriver {
    /// Drives low, then high for at least 10 µs, then low again.
    fn fire(&mut self);
}

/// Timing and conversion parameters of the ranging engine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RangingConfig {
    pub sample_interval: Duration,
    pub echo_timeout: Duration,
    pub max_echo_micros: u16,
    pub speed_of_sound_cm_per_us: f32,
}

impl RangingConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            max_echo_micros: DEFAULT_MAX_ECHO_MICROS,
            speed_of_sound_cm_per_us: SPEED_OF_SOUND_CM_PER_US,
        }
    }

    #[must_use]
    pub const fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One forwarded measurement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DistanceReading {
    /// Distance in centimetres.
    Valid(f32),
    /// Timeout or malformed echo.
    Invalid,
}

/// Displayed distance text (`123.4` or the placeholder).
pub type DistanceText = String<12>;

impl DistanceReading {
    #[must_use]
    pub const fn centimeters(self) -> Option<f32> {
        match self {
            DistanceReading::Valid(cm) => Some(cm),
            DistanceReading::Invalid => None,
        }
    }

    /// Text shown on screen: one decimal place, or the placeholder.
    #[must_use]
    pub fn to_text(self) -> DistanceText {
        let mut text = DistanceText::new();
        // Readings are below 1000 cm, so the capacity is never exceeded.
        let _ = match self {
            DistanceReading::Valid(cm) => write!(text, "{cm:3.1}"),
            DistanceReading::Invalid => text.write_str(layout::DISTANCE_PLACEHOLDER),
        };
        text
    }
}

/// Why a cycle produced [`DistanceReading::Invalid`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InvalidReason {
    /// No echo before the timeout.
    Timeout,
    /// Echo pulse of zero width.
    ZeroDuration,
    /// Echo pulse at or beyond the maximum range.
    OutOfRange,
    /// Falling edge timestamped before the rising edge.
    MalformedPulse,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvalidReason::Timeout => "timeout",
            InvalidReason::ZeroDuration => "zero-duration",
            InvalidReason::OutOfRange => "out-of-range",
            InvalidReason::MalformedPulse => "malformed-pulse",
        };
        f.write_str(label)
    }
}

/// Converts an echo pulse width into centimetres.
///
/// Valid iff `0 < duration < max_echo_micros`.
///
/// # Errors
///
/// Returns [`InvalidReason::ZeroDuration`] for an empty pulse and
/// [`InvalidReason::OutOfRange`] for one at or beyond `max_echo_micros`.
pub fn distance_from_echo(
    duration_micros: u32,
    config: &RangingConfig,
) -> Result<f32, InvalidReason> {
    if duration_micros == 0 {
        return Err(InvalidReason::ZeroDuration);
    }
    if duration_micros >= u32::from(config.max_echo_micros) {
        return Err(InvalidReason::OutOfRange);
    }
    let micros = u16::try_from(duration_micros).map_err(|_| InvalidReason::OutOfRange)?;
    Ok(f32::from(micros) * config.speed_of_sound_cm_per_us / 2.0)
}

/// Position in the trigger/measure cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RangingState {
    Idle,
    AwaitingEcho { triggered_at: Instant },
}

/// Result of a completed cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub reading: DistanceReading,
    pub reason: Option<InvalidReason>,
    pub echo_micros: Option<u32>,
    pub redrawn: bool,
}

/// Something the engine did during a poll.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RangingEvent {
    Triggered,
    Measured(Measurement),
}

/// Trigger/wait/timeout state machine for one sensor.
pub struct RangingEngine<'a, T> {
    echo: &'a EchoCapture,
    trigger: T,
    config: RangingConfig,
    state: RangingState,
    last_trigger: Option<Instant>,
    last_forwarded: Option<DistanceReading>,
}

impl<'a, T> RangingEngine<'a, T>
where
    T: TriggerDriver,
{
    pub fn new(echo: &'a EchoCapture, trigger: T, config: RangingConfig) -> Self {
        Self {
            echo,
            trigger,
            config,
            state: RangingState::Idle,
            last_trigger: None,
            last_forwarded: None,
        }
    }

    pub fn state(&self) -> RangingState {
        self.state
    }

    pub fn config(&self) -> &RangingConfig {
        &self.config
    }

    /// Most recent reading sent to the display.
    pub fn last_reading(&self) -> Option<DistanceReading> {
        self.last_forwarded
    }

    pub fn trigger(&self) -> &T {
        &self.trigger
    }

    pub fn trigger_mut(&mut self) -> &mut T {
        &mut self.trigger
    }

    /// Counts `now` as the previous trigger, so the first ping waits a full interval.
    pub fn start_at(&mut self, now: Instant) {
        self.last_trigger = Some(now);
    }

    /// Advances the state machine by one step.
    pub fn poll<D: Display + ?Sized>(
        &mut self,
        now: Instant,
        display: &mut D,
    ) -> Option<RangingEvent> {
        match self.state {
            RangingState::Idle => {
                if !self.trigger_due(now) {
                    return None;
                }
                self.start_cycle(now);
                Some(RangingEvent::Triggered)
            }
            RangingState::AwaitingEcho { triggered_at } => {
                if let Some(pulse) = self.echo.take() {
                    self.state = RangingState::Idle;
                    let measurement = self.evaluate(pulse, display);
                    return Some(RangingEvent::Measured(measurement));
                }

                if now.saturating_duration_since(triggered_at) > self.config.echo_timeout {
                    self.state = RangingState::Idle;
                    let redrawn = self.forward(DistanceReading::Invalid, display);
                    return Some(RangingEvent::Measured(Measurement {
                        reading: DistanceReading::Invalid,
                        reason: Some(InvalidReason::Timeout),
                        echo_micros: None,
                        redrawn,
                    }));
                }

                None
            }
        }
    }

    fn trigger_due(&self, now: Instant) -> bool {
        self.last_trigger
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.sample_interval)
    }

    fn start_cycle(&mut self, now: Instant) {
        self.last_trigger = Some(now);
        self.echo.arm();
        self.trigger.fire();
        self.state = RangingState::AwaitingEcho { triggered_at: now };
    }

    fn evaluate<D: Display + ?Sized>(&mut self, pulse: EchoPulse, display: &mut D) -> Measurement {
        let echo_micros = pulse.duration_micros();
        let result = match echo_micros {
            Some(micros) => distance_from_echo(micros, &self.config),
            None => Err(InvalidReason::MalformedPulse),
        };

        let (reading, reason) = match result {
            Ok(cm) => (DistanceReading::Valid(cm), None),
            Err(reason) => (DistanceReading::Invalid, Some(reason)),
        };
        let redrawn = self.forward(reading, display);

        Measurement {
            reading,
            reason,
            echo_micros,
            redrawn,
        }
    }

    /// Redraws and flushes only when `reading` differs from the previous one.
    fn forward<D: Display + ?Sized>(&mut self, reading: DistanceReading, display: &mut D) -> bool {
        if self.last_forwarded == Some(reading) {
            return false;
        }
        self.last_forwarded = Some(reading);
        layout::draw_distance(display, &reading.to_text());
        display.flush();
        true
    }
}
