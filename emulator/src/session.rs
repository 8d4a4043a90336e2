use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant as HostInstant};

use ranger_core::battery::{BatterySource, PowerSwitch};
use ranger_core::display::GridBuffer;
use ranger_core::echo::{EchoCapture, EchoLevel};
use ranger_core::input::{Key, KeySource};
use ranger_core::ranging::{SPEED_OF_SOUND_CM_PER_US, TriggerDriver};
use ranger_core::settings::SettingsStore;
use ranger_core::telemetry::EventId;
use ranger_core::{Instant, LoopStatus, MainLoop, RangerConfig};

/// Telemetry lines kept for the log pane.
pub const LOG_PANE_LINES: usize = 8;
/// Delay between the trigger and the echo rising edge on a real HC-SR04.
const ECHO_RISE_DELAY: Duration = Duration::from_micros(450);
/// Step used by the `+` / `-` keys.
pub const DISTANCE_STEP_CM: f32 = 5.0;

/// Options collected from the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    pub store_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub battery_percent: f32,
    pub drain_per_sample: f32,
    pub distance_cm: Option<f32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            store_path: None,
            log_path: None,
            battery_percent: 80.0,
            drain_per_sample: 0.0,
            distance_cm: Some(42.0),
        }
    }
}

/// Converts a host clock reading into a core timestamp relative to `origin`.
fn core_instant(origin: HostInstant, at: HostInstant) -> Instant {
    let micros = at.saturating_duration_since(origin).as_micros();
    Instant::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
}

/// Echo pulse width for an object `distance_cm` away.
pub fn echo_width(distance_cm: f32) -> Duration {
    Duration::from_secs_f32(distance_cm * 2.0 / SPEED_OF_SOUND_CM_PER_US / 1_000_000.0)
}

/// Ultrasonic sensor model. Each trigger spawns a thread that plays the echo
/// edges into the capture, standing in for the echo line interrupt.
pub struct SimulatedSensor {
    echo: &'static EchoCapture,
    origin: HostInstant,
    distance_cm: Arc<Mutex<Option<f32>>>,
    fired: u32,
}

impl SimulatedSensor {
    pub fn new(echo: &'static EchoCapture, origin: HostInstant, distance_cm: Option<f32>) -> Self {
        Self {
            echo,
            origin,
            distance_cm: Arc::new(Mutex::new(distance_cm)),
            fired: 0,
        }
    }

    /// Object distance, or `None` when nothing reflects the ping.
    pub fn distance_cm(&self) -> Option<f32> {
        *self
            .distance_cm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_distance_cm(&self, distance_cm: Option<f32>) {
        *self
            .distance_cm
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = distance_cm.map(|cm| cm.max(0.0));
    }

    pub fn fired(&self) -> u32 {
        self.fired
    }
}

impl TriggerDriver for SimulatedSensor {
    fn fire(&mut self) {
        self.fired += 1;
        let Some(distance) = self.distance_cm() else {
            return;
        };

        let echo = self.echo;
        let origin = self.origin;
        let width = echo_width(distance);
        thread::spawn(move || {
            thread::sleep(ECHO_RISE_DELAY);
            echo.on_edge(EchoLevel::High, core_instant(origin, HostInstant::now()));
            thread::sleep(width);
            echo.on_edge(EchoLevel::Low, core_instant(origin, HostInstant::now()));
        });
    }
}

/// Battery that loses `drain_per_sample` percent on every read.
pub struct SimulatedBattery {
    level: f32,
    drain_per_sample: f32,
}

impl SimulatedBattery {
    pub fn new(level: f32, drain_per_sample: f32) -> Self {
        Self {
            level,
            drain_per_sample,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn set_level(&mut self, level: f32) {
        self.level = level;
    }
}

impl BatterySource for SimulatedBattery {
    #[allow(clippy::cast_possible_truncation)]
    fn read_percent(&mut self) -> i32 {
        let reading = self.level.round() as i32;
        self.level -= self.drain_per_sample;
        reading
    }
}

/// Records the power-off request instead of exiting.
#[derive(Debug, Default)]
pub struct HostPower {
    requested: bool,
}

impl HostPower {
    pub fn requested(&self) -> bool {
        self.requested
    }
}

impl PowerSwitch for HostPower {
    fn power_off(&mut self) {
        self.requested = true;
    }
}

/// Keys typed into the terminal, one consumed per loop step.
#[derive(Debug, Default)]
pub struct HostKeys {
    pending: VecDeque<Key>,
}

impl HostKeys {
    pub fn push(&mut self, key: Key) {
        self.pending.push_back(key);
    }
}

impl KeySource for HostKeys {
    fn poll_key(&mut self) -> Option<Key> {
        self.pending.pop_front()
    }
}

/// Settings persisted as `key=value` lines, or kept in memory without a path.
#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, u8>,
}

impl FileStore {
    /// Opens `path`; a missing file starts empty and unparsable lines are skipped.
    pub fn open(path: Option<PathBuf>) -> io::Result<Self> {
        let mut values = BTreeMap::new();
        if let Some(path) = &path {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    for line in contents.lines() {
                        if let Some((key, value)) = line.split_once('=')
                            && let Ok(value) = value.trim().parse::<u8>()
                        {
                            values.insert(key.trim().to_string(), value);
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<u8> {
        self.values.get(key).copied()
    }

    fn persist(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut contents = String::new();
        for (key, value) in &self.values {
            contents.push_str(&format!("{key}={value}\n"));
        }
        fs::write(path, contents)
    }
}

impl SettingsStore for FileStore {
    type Error = io::Error;

    fn load(&mut self, key: &str) -> Option<u8> {
        self.get(key)
    }

    fn save(&mut self, key: &str, value: u8) -> Result<(), Self::Error> {
        self.values.insert(key.to_string(), value);
        self.persist()
    }
}

type HostLoop = MainLoop<
    'static,
    SimulatedSensor,
    SimulatedBattery,
    HostPower,
    FileStore,
    GridBuffer,
    HostKeys,
>;

/// One emulated device: the main loop wired to simulated hardware plus a
/// telemetry log pane.
pub struct Session {
    main_loop: HostLoop,
    started_at: HostInstant,
    cursor: EventId,
    log_pane: VecDeque<String>,
    log_file: Option<BufWriter<std::fs::File>>,
}

impl Session {
    pub fn new(options: &SessionOptions) -> io::Result<Self> {
        let started_at = HostInstant::now();
        // One capture per session, shared with the sensor threads for the process lifetime.
        let echo: &'static EchoCapture = Box::leak(Box::new(EchoCapture::new()));

        let store = FileStore::open(options.store_path.clone())?;
        let log_file = match &options.log_path {
            Some(path) => Some(open_log(path)?),
            None => None,
        };

        let mut main_loop = MainLoop::new(
            echo,
            SimulatedSensor::new(echo, started_at, options.distance_cm),
            SimulatedBattery::new(options.battery_percent, options.drain_per_sample),
            HostPower::default(),
            store,
            GridBuffer::new(),
            HostKeys::default(),
            RangerConfig::default(),
        );
        main_loop.start(Instant::ZERO);

        Ok(Self {
            main_loop,
            started_at,
            cursor: 0,
            log_pane: VecDeque::with_capacity(LOG_PANE_LINES),
            log_file,
        })
    }

    /// Current time on the session clock.
    pub fn now(&self) -> Instant {
        core_instant(self.started_at, HostInstant::now())
    }

    /// Runs one loop step at the current time and drains new telemetry.
    pub fn step(&mut self) -> io::Result<LoopStatus> {
        let now = self.now();
        self.step_at(now)
    }

    pub fn step_at(&mut self, now: Instant) -> io::Result<LoopStatus> {
        let status = self.main_loop.step(now);
        self.drain_telemetry()?;
        Ok(status)
    }

    pub fn press(&mut self, key: Key) {
        self.main_loop.keys_mut().push(key);
    }

    pub fn idle_yield(&self) -> Duration {
        self.main_loop.config().idle_yield
    }

    pub fn grid(&self) -> &GridBuffer {
        self.main_loop.display()
    }

    pub fn sensor(&self) -> &SimulatedSensor {
        self.main_loop.ranging().trigger()
    }

    /// Moves the simulated object; a missing object becomes `step` cm away.
    pub fn nudge_distance(&mut self, step: f32) {
        let sensor = self.main_loop.ranging().trigger();
        let next = sensor.distance_cm().map_or(step.max(0.0), |cm| cm + step);
        sensor.set_distance_cm(Some(next));
    }

    /// Toggles between an object in range and no echo at all.
    pub fn toggle_object(&mut self, fallback_cm: f32) {
        let sensor = self.main_loop.ranging().trigger();
        let next = match sensor.distance_cm() {
            Some(_) => None,
            None => Some(fallback_cm),
        };
        sensor.set_distance_cm(next);
    }

    pub fn battery_level(&mut self) -> f32 {
        self.main_loop.battery_mut().source_mut().level()
    }

    pub fn set_battery_level(&mut self, level: f32) {
        self.main_loop.battery_mut().source_mut().set_level(level);
    }

    pub fn power_off_requested(&self) -> bool {
        self.main_loop.power().requested()
    }

    pub fn settings(&self) -> &ranger_core::settings::SettingsController<FileStore> {
        self.main_loop.settings()
    }

    /// Most recent telemetry lines, oldest first.
    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.log_pane.iter().map(String::as_str)
    }

    fn drain_telemetry(&mut self) -> io::Result<()> {
        let telemetry = self.main_loop.telemetry();
        for record in telemetry.records_since(self.cursor) {
            let line = format!("{:?} {record}", record.event.level());
            if let Some(file) = self.log_file.as_mut() {
                writeln!(file, "{line}")?;
            }
            if self.log_pane.len() == LOG_PANE_LINES {
                self.log_pane.pop_front();
            }
            self.log_pane.push_back(line);
        }
        self.cursor = telemetry.next_event_id();
        if let Some(file) = self.log_file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

fn open_log(path: &Path) -> io::Result<BufWriter<std::fs::File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_core::display::layout;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ranger-emulator-{}-{name}", std::process::id()))
    }

    #[test]
    fn echo_width_matches_the_speed_of_sound() {
        let width = echo_width(17.175);
        assert!((width.as_secs_f64() * 1e6 - 1_000.0).abs() < 1.0, "{width:?}");
    }

    #[test]
    fn simulated_sensor_plays_both_edges() {
        let echo: &'static EchoCapture = Box::leak(Box::new(EchoCapture::new()));
        let mut sensor = SimulatedSensor::new(echo, HostInstant::now(), Some(50.0));

        sensor.fire();

        let deadline = HostInstant::now() + Duration::from_secs(2);
        let pulse = loop {
            if let Some(pulse) = echo.take() {
                break pulse;
            }
            assert!(HostInstant::now() < deadline, "echo never completed");
            thread::sleep(Duration::from_millis(1));
        };
        let micros = pulse.duration_micros().expect("ordered edges");
        // 50 cm is about 2911 µs; sleeping only ever adds time.
        assert!((2_900..40_000).contains(&micros), "{micros} us");
        assert_eq!(sensor.fired(), 1);
    }

    #[test]
    fn missing_object_produces_no_edges() {
        let echo: &'static EchoCapture = Box::leak(Box::new(EchoCapture::new()));
        let mut sensor = SimulatedSensor::new(echo, HostInstant::now(), None);
        sensor.fire();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(echo.take(), None);
    }

    #[test]
    fn file_store_persists_key_value_lines() {
        let path = scratch_path("settings.txt");
        let _ = fs::remove_file(&path);

        let mut store = FileStore::open(Some(path.clone())).expect("open");
        store.save("brt", 90).expect("save");
        store.save("lang", 1).expect("save");

        let contents = fs::read_to_string(&path).expect("written");
        assert_eq!(contents, "brt=90\nlang=1\n");

        let mut reopened = FileStore::open(Some(path.clone())).expect("reopen");
        assert_eq!(reopened.load("brt"), Some(90));
        assert_eq!(reopened.load("lbat"), None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn file_store_skips_malformed_lines() {
        let path = scratch_path("malformed.txt");
        fs::write(&path, "brt=300\nlbat = 20\nnoise\nlang=x\n").expect("seed");

        let store = FileStore::open(Some(path.clone())).expect("open");
        assert_eq!(store.get("brt"), None);
        assert_eq!(store.get("lbat"), Some(20));
        assert_eq!(store.get("lang"), None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn draining_battery_shuts_the_session_down() {
        let options = SessionOptions {
            battery_percent: 6.0,
            distance_cm: None,
            ..SessionOptions::default()
        };
        let mut session = Session::new(&options).expect("session");
        let interval = RangerConfig::default().battery.sample_interval;

        let mut status = LoopStatus::Running;
        for sample in 0..6_u32 {
            status = session
                .step_at(Instant::ZERO + interval * sample)
                .expect("step");
            if status == LoopStatus::Halted {
                break;
            }
        }

        assert_eq!(status, LoopStatus::Halted);
        assert!(session.power_off_requested());
        assert!(
            session
                .grid()
                .row_contains(layout::DISTANCE_ROW, layout::LOW_BATTERY_WARNING)
        );
        assert!(session.log_lines().any(|line| line.contains("battery-shutdown")));
    }

    #[test]
    fn typed_keys_reach_the_settings() {
        let mut session = Session::new(&SessionOptions::default()).expect("session");
        session.press(Key::SelectBrightness);
        session.press(Key::UP);

        session.step_at(Instant::ZERO).expect("step");
        session.step_at(Instant::from_millis(1)).expect("step");

        assert_eq!(session.settings().settings().brightness, 40);
        assert_eq!(session.grid().brightness(), 40);
        assert!(session.log_lines().any(|line| line.contains("setting brt")));
    }
}
