use core::time::Duration;

use ranger_core::display::{GridBuffer, layout};
use ranger_core::echo::{EchoCapture, EchoLevel};
use ranger_core::ranging::{
    DistanceReading, InvalidReason, Measurement, RangingConfig, RangingEngine, RangingEvent,
    RangingState, TriggerDriver,
};
use ranger_core::time::Instant;

#[derive(Default)]
struct CountingTrigger {
    fired: u32,
}

impl TriggerDriver for CountingTrigger {
    fn fire(&mut self) {
        self.fired += 1;
    }
}

fn engine(echo: &EchoCapture) -> RangingEngine<'_, CountingTrigger> {
    RangingEngine::new(echo, CountingTrigger::default(), RangingConfig::default())
}

/// Fires a cycle at `at` and feeds an echo of `width_us` starting 200 µs later.
fn ping(
    engine: &mut RangingEngine<'_, CountingTrigger>,
    echo: &EchoCapture,
    grid: &mut GridBuffer,
    at: Instant,
    width_us: u64,
) -> Measurement {
    assert_eq!(engine.poll(at, grid), Some(RangingEvent::Triggered));
    let rise = at + Duration::from_micros(200);
    echo.on_edge(EchoLevel::High, rise);
    echo.on_edge(EchoLevel::Low, rise + Duration::from_micros(width_us));

    match engine.poll(at + Duration::from_millis(40), grid) {
        Some(RangingEvent::Measured(measurement)) => measurement,
        other => panic!("expected a measurement, got {other:?}"),
    }
}

#[test]
fn valid_echo_converts_to_centimetres() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    let measurement = ping(&mut engine, &echo, &mut grid, Instant::ZERO, 1_000);

    let cm = measurement.reading.centimeters().expect("valid reading");
    assert!((cm - 17.175).abs() < 1e-3, "got {cm}");
    assert_eq!(measurement.echo_micros, Some(1_000));
    assert!(measurement.redrawn);
    assert!(grid.row_contains(layout::DISTANCE_ROW, "17.2"));
    assert_eq!(engine.state(), RangingState::Idle);
}

#[test]
fn conversion_is_linear_across_the_valid_range() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    for (cycle, width) in [1_u64, 580, 12_345, 37_999].into_iter().enumerate() {
        let at = Instant::from_millis(1_000 * cycle as u64);
        let measurement = ping(&mut engine, &echo, &mut grid, at, width);
        let expected = width as f32 * 0.034_35 / 2.0;
        let cm = measurement.reading.centimeters().expect("valid reading");
        assert!((cm - expected).abs() < 1e-3, "{width} us gave {cm}");
    }
}

#[test]
fn zero_and_overlong_echoes_are_invalid() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    let zero = ping(&mut engine, &echo, &mut grid, Instant::ZERO, 0);
    assert_eq!(zero.reading, DistanceReading::Invalid);
    assert_eq!(zero.reason, Some(InvalidReason::ZeroDuration));
    assert!(grid.row_contains(layout::DISTANCE_ROW, layout::DISTANCE_PLACEHOLDER));

    let far = ping(&mut engine, &echo, &mut grid, Instant::from_millis(1_000), 38_000);
    assert_eq!(far.reading, DistanceReading::Invalid);
    assert_eq!(far.reason, Some(InvalidReason::OutOfRange));
}

#[test]
fn missing_echo_times_out_after_the_window() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    assert_eq!(engine.poll(Instant::ZERO, &mut grid), Some(RangingEvent::Triggered));
    assert_eq!(engine.poll(Instant::from_millis(60), &mut grid), None);

    let event = engine.poll(Instant::from_millis(61), &mut grid);
    let Some(RangingEvent::Measured(measurement)) = event else {
        panic!("expected timeout, got {event:?}");
    };
    assert_eq!(measurement.reading, DistanceReading::Invalid);
    assert_eq!(measurement.reason, Some(InvalidReason::Timeout));
    assert_eq!(engine.last_reading(), Some(DistanceReading::Invalid));
    assert_eq!(engine.state(), RangingState::Idle);
}

#[test]
fn repeated_readings_do_not_redraw() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    ping(&mut engine, &echo, &mut grid, Instant::ZERO, 1_000);
    let flushes = grid.flush_count();
    let draws = grid.draw_count();

    let again = ping(&mut engine, &echo, &mut grid, Instant::from_millis(1_000), 1_000);
    assert!(!again.redrawn);
    assert_eq!(grid.flush_count(), flushes);
    assert_eq!(grid.draw_count(), draws);

    let first_invalid = ping(&mut engine, &echo, &mut grid, Instant::from_millis(2_000), 0);
    assert!(first_invalid.redrawn);
    let flushes = grid.flush_count();

    // A timeout after an invalid echo is still the same sentinel.
    assert_eq!(
        engine.poll(Instant::from_millis(3_000), &mut grid),
        Some(RangingEvent::Triggered)
    );
    let Some(RangingEvent::Measured(timeout)) = engine.poll(Instant::from_millis(3_061), &mut grid)
    else {
        panic!("expected timeout");
    };
    assert!(!timeout.redrawn);
    assert_eq!(grid.flush_count(), flushes);
}

#[test]
fn trigger_waits_for_the_sample_interval() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    ping(&mut engine, &echo, &mut grid, Instant::ZERO, 1_000);
    assert_eq!(engine.poll(Instant::from_millis(500), &mut grid), None);
    assert_eq!(engine.poll(Instant::from_millis(999), &mut grid), None);
    assert_eq!(engine.trigger().fired, 1);

    assert_eq!(
        engine.poll(Instant::from_millis(1_000), &mut grid),
        Some(RangingEvent::Triggered)
    );
    assert_eq!(engine.trigger().fired, 2);
}

#[test]
fn stale_echo_is_dropped_when_a_cycle_starts() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();

    echo.on_edge(EchoLevel::High, Instant::from_micros(10));
    echo.on_edge(EchoLevel::Low, Instant::from_micros(500));

    assert_eq!(engine.poll(Instant::from_millis(1), &mut grid), Some(RangingEvent::Triggered));
    assert_eq!(engine.poll(Instant::from_millis(2), &mut grid), None);
    assert!(matches!(engine.state(), RangingState::AwaitingEcho { .. }));
}

#[test]
fn started_engine_waits_one_interval_for_its_first_ping() {
    let echo = EchoCapture::new();
    let mut engine = engine(&echo);
    let mut grid = GridBuffer::new();
    engine.start_at(Instant::ZERO);

    assert_eq!(engine.poll(Instant::ZERO, &mut grid), None);
    assert_eq!(engine.poll(Instant::from_millis(999), &mut grid), None);
    assert_eq!(engine.trigger().fired, 0);

    assert_eq!(
        engine.poll(Instant::from_millis(1_000), &mut grid),
        Some(RangingEvent::Triggered)
    );
    assert_eq!(engine.trigger().fired, 1);
}
