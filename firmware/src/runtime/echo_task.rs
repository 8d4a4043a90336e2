use embassy_stm32::exti::ExtiInput;
use ranger_core::echo::{EchoCapture, EchoLevel};

use crate::hw;

/// Timestamps every echo line transition.
#[embassy_executor::task]
pub async fn run(mut echo: ExtiInput<'static>, capture: &'static EchoCapture) -> ! {
    loop {
        echo.wait_for_any_edge().await;
        let now = hw::now();
        capture.on_edge(EchoLevel::from_high(echo.is_high()), now);
    }
}
