//! Fake hardware and simulated time for tests
//!
//! Every fake device comes with a probe: the device itself is handed to the
//! code under test, the probe stays with the test to script behaviour and
//! inspect what happened.

use core::cell::RefCell;
use core::convert::Infallible;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use embassy_futures::yield_now;
use embassy_time::Instant;
use embedded_hal::digital::{ErrorType as DigitalErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType as I2cErrorType, I2c, Operation};
use embedded_hal_async::delay::DelayNs;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::system::audio::Audio;
use crate::system::clock::Clock;
use crate::system::context::Context;
use crate::system::resources::Platform;
use crate::task::door::{Door, DOOR_ADDRESS};
use crate::task::launcher::BallLauncher;
use crate::task::rangefinder::Rangefinder;

/// Simulated monotonic clock, advanced only by [`FakeDelay`] and [`FakeEcho`]
#[derive(Clone, Default)]
pub struct FakeClock {
    nanos: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ns(&self, ns: u64) {
        self.nanos.fetch_add(ns, Ordering::SeqCst);
    }

    pub fn elapsed_us(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst) / 1_000
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_us() / 1_000
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.elapsed_us())
    }
}

/// Delay that advances the fake clock instead of sleeping
///
/// Yields once per call so that futures joined with the caller get a turn.
#[derive(Clone)]
pub struct FakeDelay {
    clock: FakeClock,
}

impl FakeDelay {
    pub fn new(clock: FakeClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(ns as u64);
        yield_now().await;
    }
}

#[derive(Default)]
struct PinState {
    high: bool,
    history: Vec<bool>,
    released: bool,
}

/// Output pin recording every level it is driven to
pub struct FakePin {
    state: Arc<Mutex<PinState>>,
}

#[derive(Clone)]
pub struct PinProbe {
    state: Arc<Mutex<PinState>>,
}

impl FakePin {
    pub fn new() -> (Self, PinProbe) {
        let state = Arc::new(Mutex::new(PinState::default()));
        (
            Self {
                state: state.clone(),
            },
            PinProbe { state },
        )
    }

    fn drive(&mut self, high: bool) {
        let mut state = self.state.lock().unwrap();
        state.high = high;
        state.history.push(high);
    }
}

impl DigitalErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

impl Drop for FakePin {
    fn drop(&mut self) {
        self.state.lock().unwrap().released = true;
    }
}

impl PinProbe {
    pub fn history(&self) -> Vec<bool> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn is_high(&self) -> bool {
        self.state.lock().unwrap().high
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap().released
    }

    /// Number of low to high transitions
    pub fn pulses(&self) -> usize {
        let history = self.history();
        let mut previous = false;
        let mut pulses = 0;
        for level in history {
            if level && !previous {
                pulses += 1;
            }
            previous = level;
        }
        pulses
    }
}

/// Echo input replaying a scripted sequence of levels
///
/// Every read advances the fake clock by `read_cost_ns`, which is what turns
/// a run of high reads into a measurable pulse width. Once the script runs
/// out the line reads low forever.
pub struct FakeEcho {
    levels: VecDeque<bool>,
    clock: FakeClock,
    read_cost_ns: u64,
    reads: Arc<AtomicUsize>,
}

#[derive(Clone)]
pub struct EchoProbe {
    reads: Arc<AtomicUsize>,
}

impl FakeEcho {
    pub fn new(clock: FakeClock, read_cost_ns: u64) -> (Self, EchoProbe) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                levels: VecDeque::new(),
                clock,
                read_cost_ns,
                reads: reads.clone(),
            },
            EchoProbe { reads },
        )
    }

    /// Appends an echo pulse: `low_reads` low, `high_reads` high, then low
    pub fn pulse(mut self, low_reads: usize, high_reads: usize) -> Self {
        self.levels.extend(std::iter::repeat(false).take(low_reads));
        self.levels.extend(std::iter::repeat(true).take(high_reads));
        self.levels.push_back(false);
        self
    }

    /// Appends a line stuck high for `reads` reads
    pub fn stuck_high(mut self, reads: usize) -> Self {
        self.levels.extend(std::iter::repeat(true).take(reads));
        self
    }
}

impl DigitalErrorType for FakeEcho {
    type Error = Infallible;
}

impl InputPin for FakeEcho {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.clock.advance_ns(self.read_cost_ns);
        Ok(self.levels.pop_front().unwrap_or(false))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl EchoProbe {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct BusState {
    scripted: VecDeque<ErrorKind>,
    always: Option<ErrorKind>,
    writes: Vec<(u8, Vec<u8>)>,
    released: bool,
}

/// I2C bus that fails on demand and records every write
pub struct FakeBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Clone)]
pub struct BusProbe {
    state: Arc<Mutex<BusState>>,
}

impl FakeBus {
    pub fn new() -> (Self, BusProbe) {
        let state = Arc::new(Mutex::new(BusState::default()));
        (
            Self {
                state: state.clone(),
            },
            BusProbe { state },
        )
    }
}

impl I2cErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        for operation in operations.iter() {
            if let Operation::Write(bytes) = operation {
                state.writes.push((address, bytes.to_vec()));
            }
        }
        if let Some(kind) = state.scripted.pop_front() {
            return Err(kind);
        }
        match state.always {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }
}

impl Drop for FakeBus {
    fn drop(&mut self) {
        self.state.lock().unwrap().released = true;
    }
}

impl BusProbe {
    /// Fails the next `count` transactions with `kind`
    pub fn fail_next(&self, count: usize, kind: ErrorKind) {
        let mut state = self.state.lock().unwrap();
        state.scripted.extend(std::iter::repeat(kind).take(count));
    }

    /// Fails every transaction with `kind`
    pub fn fail_always(&self, kind: ErrorKind) {
        self.state.lock().unwrap().always = Some(kind);
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Single byte commands written so far
    pub fn commands(&self) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter_map(|(_, bytes)| bytes.first().copied())
            .collect()
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap().released
    }
}

/// Audio player that remembers what it was asked to play
#[derive(Clone, Default)]
pub struct FakeAudio {
    played: Arc<Mutex<Vec<String>>>,
    looped: Arc<Mutex<Vec<String>>>,
    silenced: Arc<AtomicUsize>,
}

impl FakeAudio {
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn count(&self, asset: &str) -> usize {
        self.played().iter().filter(|played| *played == asset).count()
    }

    pub fn looped(&self) -> Vec<String> {
        self.looped.lock().unwrap().clone()
    }

    pub fn silenced(&self) -> usize {
        self.silenced.load(Ordering::SeqCst)
    }
}

impl Audio for FakeAudio {
    fn play(&self, asset: &str) {
        self.played.lock().unwrap().push(asset.to_owned());
    }

    fn loop_play(&self, asset: &str) {
        self.looped.lock().unwrap().push(asset.to_owned());
    }

    fn silence(&self) {
        self.silenced.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakePlatform;

impl Platform for FakePlatform {
    type Bus = FakeBus;
    type Launch = FakePin;
    type Trigger = FakePin;
    type Echo = FakeEcho;
    type Clock = FakeClock;
    type Delay = FakeDelay;
    type Audio = FakeAudio;
}

/// A complete fake prop: context plus probes into every device
pub struct Rig {
    pub ctx: Context<FakePlatform>,
    pub clock: FakeClock,
    pub bus: BusProbe,
    pub launcher: PinProbe,
    pub audio: FakeAudio,
}

impl Rig {
    pub fn new() -> Self {
        let clock = FakeClock::new();
        let (bus, bus_probe) = FakeBus::new();
        let (solenoid, launcher_probe) = FakePin::new();
        let audio = FakeAudio::default();
        let ctx = Context::new(
            Door::new(bus, DOOR_ADDRESS),
            BallLauncher::new(solenoid),
            clock.clone(),
            FakeDelay::new(clock.clone()),
            audio.clone(),
        );
        Self {
            ctx,
            clock,
            bus: bus_probe,
            launcher: launcher_probe,
            audio,
        }
    }

    /// Builds a rangefinder on the rig's clock around a scripted echo line
    pub fn rangefinder(&self, echo: FakeEcho) -> (Rangefinder<FakePlatform>, PinProbe) {
        let (trigger, trigger_probe) = FakePin::new();
        let rangefinder = Rangefinder::new(
            trigger,
            echo,
            self.clock.clone(),
            FakeDelay::new(self.clock.clone()),
        );
        (rangefinder, trigger_probe)
    }

    /// Ball launcher shots fired so far
    pub fn shots(&self) -> usize {
        self.launcher.pulses()
    }

    /// Door commands written to the bus so far
    pub fn door_commands(&self) -> Vec<u8> {
        self.bus.commands()
    }

    pub fn is_released(&self) -> bool {
        self.bus.is_released() && self.launcher.is_released()
    }
}

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Logger keeping every record on the thread that emitted it
///
/// Each test runs on its own thread, so tests never see each other's logs.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED.with(|captured| {
            captured
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INSTALL_LOGGER: Once = Once::new();

/// Starts capturing log records emitted on the calling thread
pub fn capture_logs() -> LogCapture {
    INSTALL_LOGGER.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    CAPTURED.with(|captured| captured.borrow_mut().clear());
    LogCapture
}

/// Handle on the records captured for the current thread
pub struct LogCapture;

impl LogCapture {
    pub fn records(&self) -> Vec<(Level, String)> {
        CAPTURED.with(|captured| captured.borrow().clone())
    }

    /// Records logged at exactly `level`
    pub fn count(&self, level: Level) -> usize {
        self.records().iter().filter(|(l, _)| *l == level).count()
    }

    /// Records logged at `level` or anything more severe
    pub fn count_at_least(&self, level: Level) -> usize {
        self.records().iter().filter(|(l, _)| *l <= level).count()
    }
}
