//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The main loop records one entry for everything the components report:
//! trigger pulses, measurements, battery samples, settings changes and the
//! shutdown path. Targets mirror new records to their own log sink (defmt on
//! the MCU, the log pane in the emulator) through the [`fmt::Display`] impl
//! on [`TelemetryRecord`].

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::battery::{AlarmState, BatteryEvent, SampleDisplay};
use crate::ranging::{InvalidReason, Measurement};
use crate::settings::{KeyOutcome, Setting, SettingsMode};
use crate::time::Instant;

/// Identifier assigned to each record, wrapping on overflow.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    EchoTriggered,
    DistanceMeasured,
    DistanceInvalid(InvalidReason),
    BatterySampled,
    BatteryNoise,
    LowBatteryReading,
    LowBatteryShutdown,
    ModeChanged(SettingsMode),
    SettingChanged(Setting),
    SettingPersistFailed(Setting),
}

impl TelemetryEventKind {
    /// Severity used when mirroring to a log sink.
    #[must_use]
    pub const fn level(self) -> LogLevel {
        match self {
            TelemetryEventKind::EchoTriggered => LogLevel::Debug,
            TelemetryEventKind::DistanceMeasured
            | TelemetryEventKind::BatterySampled
            | TelemetryEventKind::ModeChanged(_)
            | TelemetryEventKind::SettingChanged(_) => LogLevel::Info,
            TelemetryEventKind::DistanceInvalid(_)
            | TelemetryEventKind::BatteryNoise
            | TelemetryEventKind::LowBatteryReading
            | TelemetryEventKind::SettingPersistFailed(_) => LogLevel::Warn,
            TelemetryEventKind::LowBatteryShutdown => LogLevel::Error,
        }
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::EchoTriggered => f.write_str("echo-triggered"),
            TelemetryEventKind::DistanceMeasured => f.write_str("distance"),
            TelemetryEventKind::DistanceInvalid(reason) => write!(f, "distance-invalid {reason}"),
            TelemetryEventKind::BatterySampled => f.write_str("battery"),
            TelemetryEventKind::BatteryNoise => f.write_str("battery-noise"),
            TelemetryEventKind::LowBatteryReading => f.write_str("battery-low"),
            TelemetryEventKind::LowBatteryShutdown => f.write_str("battery-shutdown"),
            TelemetryEventKind::ModeChanged(mode) => write!(f, "mode {mode}"),
            TelemetryEventKind::SettingChanged(setting) => write!(f, "setting {setting}"),
            TelemetryEventKind::SettingPersistFailed(setting) => {
                write!(f, "setting-persist-failed {setting}")
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryPayload {
    None,
    Distance(DistanceTelemetry),
    Battery(BatteryTelemetry),
    Setting(SettingTelemetry),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DistanceTelemetry {
    /// Distance in tenths of a centimetre; `None` for invalid readings.
    pub tenths_cm: Option<u32>,
    pub echo_micros: Option<u32>,
    pub redrawn: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BatteryTelemetry {
    pub level: u8,
    pub consecutive_low: u8,
    pub redrawn: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SettingTelemetry {
    pub value: u8,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Instant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}ms {}", self.timestamp.as_millis(), self.event)?;
        match self.details {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Distance(distance) => {
                if let Some(tenths) = distance.tenths_cm {
                    write!(f, " {}.{}cm", tenths / 10, tenths % 10)?;
                }
                if let Some(echo) = distance.echo_micros {
                    write!(f, " echo={echo}us")?;
                }
                if distance.redrawn {
                    f.write_str(" redraw")?;
                }
                Ok(())
            }
            TelemetryPayload::Battery(battery) => {
                write!(f, " {}%", battery.level)?;
                if battery.consecutive_low > 0 {
                    write!(f, " low={}", battery.consecutive_low)?;
                }
                if battery.redrawn {
                    f.write_str(" redraw")?;
                }
                Ok(())
            }
            TelemetryPayload::Setting(setting) => write!(f, " ={}", setting.value),
        }
    }
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Records with an id at or after `cursor`, oldest first.
    ///
    /// Log sinks keep the cursor at [`Self::next_event_id`] after each drain
    /// so every record is mirrored once.
    pub fn records_since(&self, cursor: EventId) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        let pending = self.next_event_id.wrapping_sub(cursor);
        self.ring
            .oldest_ordered()
            .filter(move |record| self.next_event_id.wrapping_sub(record.id) <= pending)
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Identifier the next record will receive.
    #[must_use]
    pub fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        details: TelemetryPayload,
        timestamp: Instant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details,
        });
        id
    }

    pub fn record_trigger(&mut self, timestamp: Instant) -> EventId {
        self.record(
            TelemetryEventKind::EchoTriggered,
            TelemetryPayload::None,
            timestamp,
        )
    }

    pub fn record_measurement(&mut self, measurement: &Measurement, timestamp: Instant) -> EventId {
        let event = match measurement.reason {
            Some(reason) => TelemetryEventKind::DistanceInvalid(reason),
            None => TelemetryEventKind::DistanceMeasured,
        };
        let payload = TelemetryPayload::Distance(DistanceTelemetry {
            tenths_cm: measurement.reading.centimeters().map(tenths),
            echo_micros: measurement.echo_micros,
            redrawn: measurement.redrawn,
        });
        self.record(event, payload, timestamp)
    }

    pub fn record_battery(&mut self, battery: &BatteryEvent, timestamp: Instant) -> EventId {
        match *battery {
            BatteryEvent::Sampled {
                level,
                alarm,
                display,
            } => {
                let consecutive_low = match alarm {
                    AlarmState::Clear => 0,
                    AlarmState::Counting(count) => count,
                    AlarmState::Tripped => u8::MAX,
                };
                let event = match (alarm, display) {
                    (AlarmState::Counting(_) | AlarmState::Tripped, _) => {
                        TelemetryEventKind::LowBatteryReading
                    }
                    (AlarmState::Clear, SampleDisplay::Noise) => TelemetryEventKind::BatteryNoise,
                    (AlarmState::Clear, SampleDisplay::Redrawn | SampleDisplay::Unchanged) => {
                        TelemetryEventKind::BatterySampled
                    }
                };
                let payload = TelemetryPayload::Battery(BatteryTelemetry {
                    level,
                    consecutive_low,
                    redrawn: display == SampleDisplay::Redrawn,
                });
                self.record(event, payload, timestamp)
            }
            BatteryEvent::Shutdown {
                level,
                consecutive_low,
            } => self.record(
                TelemetryEventKind::LowBatteryShutdown,
                TelemetryPayload::Battery(BatteryTelemetry {
                    level,
                    consecutive_low,
                    redrawn: true,
                }),
                timestamp,
            ),
        }
    }

    /// Records a key outcome; ignored keys leave no trace.
    pub fn record_key(&mut self, outcome: &KeyOutcome, timestamp: Instant) -> Option<EventId> {
        match *outcome {
            KeyOutcome::Ignored => None,
            KeyOutcome::ModeChanged(mode) => Some(self.record(
                TelemetryEventKind::ModeChanged(mode),
                TelemetryPayload::None,
                timestamp,
            )),
            KeyOutcome::Adjusted {
                setting,
                value,
                changed,
                persisted,
            } => {
                if !changed {
                    return None;
                }
                let event = if persisted {
                    TelemetryEventKind::SettingChanged(setting)
                } else {
                    TelemetryEventKind::SettingPersistFailed(setting)
                };
                Some(self.record(
                    event,
                    TelemetryPayload::Setting(SettingTelemetry { value }),
                    timestamp,
                ))
            }
        }
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tenths(cm: f32) -> u32 {
    // Readings are positive and below 1000 cm.
    (cm * 10.0 + 0.5) as u32
}
