//! Mirrors core telemetry records to defmt / the host console.
//!
//! The main loop owns the [`TelemetryRecorder`] ring. After every step the
//! runtime drains the records added since the previous drain and logs each one
//! at the severity attached to its event kind.

use core::fmt::Write as _;

use heapless::String;
use ranger_core::telemetry::{EventId, LogLevel, TelemetryRecord, TelemetryRecorder};

/// Longest rendered log line.
pub const LOG_LINE_CAPACITY: usize = 96;

pub type LogLine = String<LOG_LINE_CAPACITY>;

/// Tracks which telemetry records have already been logged.
#[derive(Clone, Debug, Default)]
pub struct LogMirror {
    cursor: EventId,
    truncated: u32,
}

impl LogMirror {
    pub const fn new() -> Self {
        Self {
            cursor: 0,
            truncated: 0,
        }
    }

    /// Logs every record added since the previous call. Returns how many were logged.
    pub fn drain<const CAPACITY: usize>(
        &mut self,
        recorder: &TelemetryRecorder<CAPACITY>,
    ) -> usize {
        let mut logged = 0;
        for record in recorder.records_since(self.cursor) {
            let (line, complete) = format_record(record);
            if !complete {
                self.truncated = self.truncated.wrapping_add(1);
            }
            emit_log(record.event.level(), &line);
            logged += 1;
        }
        self.cursor = recorder.next_event_id();
        logged
    }

    /// Lines cut short at [`LOG_LINE_CAPACITY`].
    pub fn truncated(&self) -> u32 {
        self.truncated
    }
}

/// Renders `record` as `telemetry:<id> <record>`; the flag is `false` when truncated.
pub fn format_record(record: &TelemetryRecord) -> (LogLine, bool) {
    let mut line = LogLine::new();
    let complete = write!(line, "telemetry:{} {}", record.id, record).is_ok();
    (line, complete)
}

#[cfg(target_os = "none")]
fn emit_log(level: LogLevel, line: &str) {
    match level {
        LogLevel::Debug => defmt::debug!("{=str}", line),
        LogLevel::Info => defmt::info!("{=str}", line),
        LogLevel::Warn => defmt::warn!("{=str}", line),
        LogLevel::Error => defmt::error!("{=str}", line),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(level: LogLevel, line: &str) {
    match level {
        LogLevel::Debug => println!("DEBUG {line}"),
        LogLevel::Info => println!("INFO  {line}"),
        LogLevel::Warn => println!("WARN  {line}"),
        LogLevel::Error => println!("ERROR {line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_core::Instant;
    use ranger_core::settings::{KeyOutcome, Setting};

    #[test]
    fn drain_logs_each_record_once() {
        let mut recorder = TelemetryRecorder::<8>::new();
        let mut mirror = LogMirror::new();

        recorder.record_trigger(Instant::from_millis(0));
        recorder.record_trigger(Instant::from_millis(1_000));
        assert_eq!(mirror.drain(&recorder), 2);
        assert_eq!(mirror.drain(&recorder), 0);

        recorder.record_trigger(Instant::from_millis(2_000));
        assert_eq!(mirror.drain(&recorder), 1);
        assert_eq!(mirror.truncated(), 0);
    }

    #[test]
    fn lines_carry_the_event_id_and_payload() {
        let mut recorder = TelemetryRecorder::<8>::new();
        recorder.record_trigger(Instant::ZERO);
        let outcome = KeyOutcome::Adjusted {
            setting: Setting::Brightness,
            value: 40,
            changed: true,
            persisted: false,
        };
        recorder.record_key(&outcome, Instant::from_millis(1_500));

        let record = recorder.latest().expect("recorded");
        let (line, complete) = format_record(record);

        assert!(complete);
        assert_eq!(line.as_str(), "telemetry:1 t=1500ms setting-persist-failed brt =40");
    }
}
