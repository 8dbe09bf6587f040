use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::{Read, Write};
use sentry_core::link::{LINK_BAUD, LinkRequest, LinkResponse, MAX_RESPONSE_LEN};
use static_cell::StaticCell;

use crate::clock::core_duration_to_embassy;
use crate::link::{ExchangeError, LineBuffer, ReplySender, RequestReceiver, reply_for};

const LINK_UART_BUFFER_SIZE: usize = MAX_RESPONSE_LEN * 2;
const READ_CHUNK: usize = 16;
/// How long the receive buffer must stay quiet before a request is written.
const STALE_WINDOW: Duration = Duration::from_millis(5);

static UART_TX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
    requests: RequestReceiver<'static>,
    replies: ReplySender<'static>,
    io_timeout: core::time::Duration,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize link UART");
    let (mut uart_tx, mut uart_rx) = uart.split();

    let timeout = core_duration_to_embassy(io_timeout);
    let mut line = LineBuffer::new();

    loop {
        let request = requests.receive().await;
        discard_stale(&mut uart_rx).await;
        line.clear();

        let result = with_timeout(
            timeout,
            exchange(&mut uart_tx, &mut uart_rx, &mut line, request),
        )
        .await
        .unwrap_or(Err(ExchangeError::Timeout));

        replies.send(reply_for(request, result)).await;
    }
}

/// Drops bytes left behind by an exchange that timed out.
async fn discard_stale<R: Read>(rx: &mut R) {
    let mut chunk = [0u8; READ_CHUNK];
    while let Ok(Ok(count)) = with_timeout(STALE_WINDOW, rx.read(&mut chunk)).await {
        if count == 0 {
            break;
        }
    }
}

/// Writes one request line and reads until a full response line arrives.
async fn exchange<W, R>(
    tx: &mut W,
    rx: &mut R,
    line: &mut LineBuffer,
    request: LinkRequest,
) -> Result<LinkResponse, ExchangeError>
where
    W: Write,
    R: Read,
{
    tx.write_all(request.as_line())
        .await
        .map_err(|_| ExchangeError::Io)?;
    tx.flush().await.map_err(|_| ExchangeError::Io)?;

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let count = rx.read(&mut chunk).await.map_err(|_| ExchangeError::Io)?;
        // Anything after the answer belongs to no request and is dropped.
        if let Some(parsed) = chunk[..count]
            .iter()
            .find_map(|byte| line.push_reply(request, *byte))
        {
            return parsed.map_err(ExchangeError::Parse);
        }
    }
}
