use core::time::Duration;

use heapless::Deque;
use ranger_core::battery::{BatterySource, PowerSwitch};
use ranger_core::display::{GridBuffer, layout};
use ranger_core::echo::{EchoCapture, EchoLevel};
use ranger_core::input::{Key, KeySource};
use ranger_core::ranging::{InvalidReason, TriggerDriver};
use ranger_core::settings::{MemoryStore, Setting, SettingsMode};
use ranger_core::telemetry::{TelemetryEventKind, TelemetryPayload};
use ranger_core::{Instant, LoopStatus, MainLoop, RangerConfig};

#[derive(Default)]
struct CountingTrigger {
    fired: u32,
}

impl TriggerDriver for CountingTrigger {
    fn fire(&mut self) {
        self.fired += 1;
    }
}

struct Gauge(i32);

impl BatterySource for Gauge {
    fn read_percent(&mut self) -> i32 {
        self.0
    }
}

#[derive(Default)]
struct RecordingPower {
    offs: u32,
}

impl PowerSwitch for RecordingPower {
    fn power_off(&mut self) {
        self.offs += 1;
    }
}

#[derive(Default)]
struct QueuedKeys {
    pending: Deque<Key, 16>,
}

impl QueuedKeys {
    fn press(&mut self, key: Key) {
        self.pending.push_back(key).expect("key queue has room");
    }
}

impl KeySource for QueuedKeys {
    fn poll_key(&mut self) -> Option<Key> {
        self.pending.pop_front()
    }
}

type Harness<'a> =
    MainLoop<'a, CountingTrigger, Gauge, RecordingPower, MemoryStore, GridBuffer, QueuedKeys>;

fn harness(echo: &EchoCapture, level: i32) -> Harness<'_> {
    let mut main = MainLoop::new(
        echo,
        CountingTrigger::default(),
        Gauge(level),
        RecordingPower::default(),
        MemoryStore::new(),
        GridBuffer::new(),
        QueuedKeys::default(),
        RangerConfig::default(),
    );
    main.start(Instant::ZERO);
    main
}

/// Steps the loop once per millisecond over `[from, to)`.
fn run_millis(main: &mut Harness<'_>, from: u64, to: u64) -> LoopStatus {
    let mut status = LoopStatus::Running;
    for millis in from..to {
        status = main.step(Instant::from_millis(millis));
        if status == LoopStatus::Halted {
            break;
        }
    }
    status
}

#[test]
fn first_ping_and_first_sample_wait_a_full_interval() {
    let echo = EchoCapture::new();
    let mut main = harness(&echo, 72);

    assert_eq!(main.step(Instant::ZERO), LoopStatus::Running);
    main.step(Instant::from_millis(999));
    assert_eq!(main.ranging().trigger().fired, 0);
    assert!(main.telemetry().is_empty());

    main.step(Instant::from_millis(1_000));
    assert_eq!(main.ranging().trigger().fired, 1);

    main.step(Instant::from_millis(1_992));
    assert!(!main.display().row_contains(layout::TITLE_ROW, " 72%"));
    main.step(Instant::from_millis(1_993));
    assert!(main.display().row_contains(layout::TITLE_ROW, " 72%"));

    let events: heapless::Vec<TelemetryEventKind, 4> = main
        .telemetry()
        .oldest_first()
        .map(|record| record.event)
        .collect();
    assert_eq!(
        events.as_slice(),
        &[
            TelemetryEventKind::EchoTriggered,
            TelemetryEventKind::DistanceInvalid(InvalidReason::Timeout),
            TelemetryEventKind::BatterySampled
        ]
    );
}

#[test]
fn echo_between_steps_is_measured_and_drawn() {
    let echo = EchoCapture::new();
    let mut main = harness(&echo, 72);
    main.step(Instant::from_millis(1_000));

    echo.on_edge(EchoLevel::High, Instant::from_micros(1_000_300));
    echo.on_edge(EchoLevel::Low, Instant::from_micros(1_000_300 + 5_822));
    main.step(Instant::from_millis(1_007));

    assert!(main.display().row_contains(layout::DISTANCE_ROW, "100.0"));
    let latest = main.telemetry().latest().copied().expect("measurement recorded");
    assert_eq!(latest.event, TelemetryEventKind::DistanceMeasured);
    assert!(matches!(
        latest.details,
        TelemetryPayload::Distance(distance) if distance.tenths_cm == Some(1_000)
    ));
}

#[test]
fn silent_sensor_shows_the_placeholder_once_per_run_of_timeouts() {
    let echo = EchoCapture::new();
    let mut main = harness(&echo, 72);

    assert_eq!(run_millis(&mut main, 0, 4_000), LoopStatus::Running);

    assert_eq!(main.ranging().trigger().fired, 3);
    assert!(
        main.display()
            .row_contains(layout::DISTANCE_ROW, layout::DISTANCE_PLACEHOLDER)
    );
    let timeouts = main
        .telemetry()
        .oldest_first()
        .filter(|record| {
            record.event == TelemetryEventKind::DistanceInvalid(InvalidReason::Timeout)
        })
        .count();
    assert_eq!(timeouts, 3);
    let redraws = main
        .telemetry()
        .oldest_first()
        .filter(|record| {
            matches!(record.details, TelemetryPayload::Distance(distance) if distance.redrawn)
        })
        .count();
    assert_eq!(redraws, 1);
}

#[test]
fn one_key_is_dispatched_per_step() {
    let echo = EchoCapture::new();
    let mut main = harness(&echo, 72);
    main.keys_mut().press(Key::SelectLowBattery);
    main.keys_mut().press(Key::UP);
    main.keys_mut().press(Key::UP);

    main.step(Instant::ZERO);
    assert_eq!(main.settings().mode(), SettingsMode::EditingLowBatteryThreshold);
    assert_eq!(main.settings().low_battery_threshold(), 10);

    main.step(Instant::from_millis(1));
    main.step(Instant::from_millis(2));
    assert_eq!(main.settings().low_battery_threshold(), 30);
    assert_eq!(main.settings().store().get("lbat"), Some(30));
    assert!(
        main.display()
            .row_contains(layout::STATUS_ROW, "lowBattery threshold =  30")
    );
    assert_eq!(
        main.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::SettingChanged(Setting::LowBatteryThreshold))
    );
}

#[test]
fn raised_threshold_feeds_the_battery_alarm() {
    let echo = EchoCapture::new();
    let mut main = harness(&echo, 25);
    main.keys_mut().press(Key::SelectLowBattery);
    main.keys_mut().press(Key::UP);
    main.keys_mut().press(Key::UP);

    // The keys are handled within the first interval, so every sample sees 30.
    let interval = main.config().battery.sample_interval;
    let status = run_millis(&mut main, 0, duration_millis(interval * 6) + 1);

    assert_eq!(status, LoopStatus::Halted);
    assert_eq!(main.power().offs, 1);
    assert!(main.is_halted());
    assert!(
        main.display()
            .row_contains(layout::DISTANCE_ROW, layout::LOW_BATTERY_WARNING)
    );
    assert_eq!(
        main.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::LowBatteryShutdown)
    );
}

#[test]
fn halted_loop_ignores_keys_and_sensors() {
    let echo = EchoCapture::new();
    let mut main = harness(&echo, 0);
    let interval = main.config().battery.sample_interval;
    let status = run_millis(&mut main, 0, duration_millis(interval * 5) + 1);
    assert_eq!(status, LoopStatus::Halted);

    let fired = main.ranging().trigger().fired;
    let recorded = main.telemetry().next_event_id();
    main.keys_mut().press(Key::SelectBrightness);

    assert_eq!(main.step(Instant::from_millis(60_000)), LoopStatus::Halted);
    assert_eq!(main.ranging().trigger().fired, fired);
    assert_eq!(main.telemetry().next_event_id(), recorded);
    assert_eq!(main.settings().mode(), SettingsMode::Escaped);
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).expect("short test duration")
}
