use embassy_time::{Duration, Timer};
use ranger_core::{LoopStatus, MainLoop};

use super::console_task::{ConsoleKeys, SignalSink};
use crate::console::ConsoleDisplay;
use crate::hw::{self, BatteryAdc, FlashStore, PowerLatch, PwmBacklight, TriggerPin};
use crate::telemetry::LogMirror;

pub type FirmwareLoop = MainLoop<
    'static,
    TriggerPin<'static>,
    BatteryAdc<'static>,
    PowerLatch<'static>,
    FlashStore<'static>,
    ConsoleDisplay<SignalSink, PwmBacklight<'static>>,
    ConsoleKeys,
>;

#[embassy_executor::task]
pub async fn run(mut main_loop: FirmwareLoop) -> ! {
    let mut mirror = LogMirror::new();
    let idle = Duration::from_micros(
        u64::try_from(main_loop.config().idle_yield.as_micros()).unwrap_or(1_000),
    );

    main_loop.start(hw::now());
    defmt::info!("ranger: started");

    loop {
        let status = main_loop.step(hw::now());
        mirror.drain(main_loop.telemetry());

        if status == LoopStatus::Halted {
            defmt::error!("ranger: power-off returned after low-battery shutdown; halting");
            loop {
                cortex_m::asm::wfi();
            }
        }

        Timer::after(idle).await;
    }
}
