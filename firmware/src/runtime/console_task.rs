use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use ranger_core::input::{Key, KeySource};
use static_cell::StaticCell;

use crate::console::{ConsoleFrame, FrameSink, KeyDecoder};

pub const KEY_QUEUE_DEPTH: usize = 8;
const CONSOLE_BAUD: u32 = 115_200;
const CONSOLE_RX_BUFFER_SIZE: usize = 64;
const CONSOLE_TX_BUFFER_SIZE: usize = 256;

/// Latest rendered frame; a newer frame replaces one not yet written.
pub type FrameSignal = Signal<CriticalSectionRawMutex, ConsoleFrame>;
pub type KeyChannel = Channel<CriticalSectionRawMutex, Key, KEY_QUEUE_DEPTH>;
pub type KeySender = Sender<'static, CriticalSectionRawMutex, Key, KEY_QUEUE_DEPTH>;
pub type KeyReceiver = Receiver<'static, CriticalSectionRawMutex, Key, KEY_QUEUE_DEPTH>;

static UART_TX_BUFFER: StaticCell<[u8; CONSOLE_TX_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; CONSOLE_RX_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART2_LPUART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

/// Hands flushed frames to the console task.
pub struct SignalSink {
    signal: &'static FrameSignal,
}

impl SignalSink {
    pub fn new(signal: &'static FrameSignal) -> Self {
        Self { signal }
    }
}

impl FrameSink for SignalSink {
    fn send_frame(&mut self, frame: ConsoleFrame) {
        self.signal.signal(frame);
    }
}

/// Key presses decoded by the console task.
pub struct ConsoleKeys {
    receiver: KeyReceiver,
}

impl ConsoleKeys {
    pub fn new(receiver: KeyReceiver) -> Self {
        Self { receiver }
    }
}

impl KeySource for ConsoleKeys {
    fn poll_key(&mut self) -> Option<Key> {
        self.receiver.try_receive().ok()
    }
}

#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART2>,
    tx_pin: Peri<'static, hal::peripherals::PA2>,
    rx_pin: Peri<'static, hal::peripherals::PA3>,
    frames: &'static FrameSignal,
    keys: KeySender,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; CONSOLE_TX_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; CONSOLE_RX_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize console UART");

    let (mut uart_tx, mut uart_rx) = uart.split();

    let frames_to_uart = async move {
        // Clear once; frames then repaint in place.
        let _ = uart_tx.write_all(b"\x1b[2J").await;
        loop {
            let frame = frames.wait().await;
            if uart_tx.write_all(&frame).await.is_err() {
                defmt::warn!("console: UART write error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
            if uart_tx.flush().await.is_err() {
                defmt::warn!("console: UART flush error");
            }
        }
    };

    let uart_to_keys = async move {
        let mut decoder = KeyDecoder::new();
        let mut ingress = [0u8; CONSOLE_RX_BUFFER_SIZE];
        loop {
            match uart_rx.read(&mut ingress).await {
                Ok(count) => {
                    for &byte in &ingress[..count] {
                        if let Some(key) = decoder.push(byte)
                            && keys.try_send(key).is_err()
                        {
                            defmt::warn!("console: key queue full, dropping key");
                        }
                    }
                }
                Err(_) => {
                    defmt::warn!("console: UART read error");
                    Timer::after(Duration::from_millis(5)).await;
                }
            }
        }
    };

    join(frames_to_uart, uart_to_keys).await;
    loop {
        core::future::pending::<()>().await;
    }
}
