use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Level, Output, OutputType, Pull, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::time::khz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use ranger_core::echo::EchoCapture;
use ranger_core::{MainLoop, RangerConfig};

use crate::console::ConsoleDisplay;
use crate::hw::{BatteryAdc, FlashStore, PowerLatch, PwmBacklight, TriggerPin};

mod console_task;
mod echo_task;
mod ranger_task;

use console_task::{ConsoleKeys, FrameSignal, KeyChannel, SignalSink};

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Echo edge timestamps, written by the echo task and taken by the main loop.
pub(super) static ECHO: EchoCapture = EchoCapture::new();
pub(super) static FRAMES: FrameSignal = Signal::new();
pub(super) static KEYS: KeyChannel = Channel::new();

/// Runs the echo task above thread mode so edge timestamps are not delayed by the main loop.
static ECHO_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn SPI1() {
    unsafe { ECHO_EXECUTOR.on_interrupt() }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA2,
        PA3,
        PA4,
        PA5,
        PA6,
        EXTI1,
        ADC1,
        TIM3,
        USART2,
        FLASH,
        ..
    } = hal::init(config);

    // Hold the regulator enable before anything else can stall.
    let latch = PowerLatch::new(Output::new(PA5, Level::High, Speed::Low));

    hal::interrupt::SPI1.set_priority(Priority::P1);
    let echo_spawner = ECHO_EXECUTOR.start(hal::interrupt::SPI1);
    echo_spawner
        .spawn(echo_task::run(ExtiInput::new(PA1, EXTI1, Pull::Down), &ECHO))
        .expect("failed to spawn echo task");

    spawner
        .spawn(console_task::run(USART2, PA2, PA3, &FRAMES, KEYS.sender()))
        .expect("failed to spawn console task");

    let trigger = TriggerPin::new(Output::new(PA0, Level::Low, Speed::VeryHigh));
    let battery = BatteryAdc::new(Adc::new(ADC1), PA4.degrade_adc());
    let store = FlashStore::new(Flash::new_blocking(FLASH));
    let pwm = SimplePwm::new(
        TIM3,
        Some(PwmPin::new(PA6, OutputType::PushPull)),
        None,
        None,
        None,
        khz(20),
        CountingMode::EdgeAlignedUp,
    );
    let display = ConsoleDisplay::new(SignalSink::new(&FRAMES), PwmBacklight::new(pwm));
    let keys = ConsoleKeys::new(KEYS.receiver());

    let main_loop = MainLoop::new(
        &ECHO,
        trigger,
        battery,
        latch,
        store,
        display,
        keys,
        RangerConfig::default(),
    );

    spawner
        .spawn(ranger_task::run(main_loop))
        .expect("failed to spawn ranger task");

    core::future::pending::<()>().await;
}
