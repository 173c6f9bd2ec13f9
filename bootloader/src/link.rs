// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! UARTE0 as a blocking byte link.
//!
//! Reception runs in a task on the interrupt executor and lands in
//! [`RX_QUEUE`]; the update loop drains it from thread mode.

use bootloader_core::{Consumer, Producer, RingBuffer};
use defmt::warn;
use embassy_nrf::peripherals::{TIMER0, UARTE0};
use embassy_nrf::uarte::{self, UarteRxWithIdle, UarteTx};
use static_cell::StaticCell;

pub const RX_QUEUE_SIZE: usize = 256;

/// Bytes received but not yet consumed by the framer.
pub static RX_QUEUE: StaticCell<RingBuffer<RX_QUEUE_SIZE>> = StaticCell::new();

#[embassy_executor::task]
pub async fn uart_rx(
    mut rx: UarteRxWithIdle<'static, UARTE0, TIMER0>,
    mut queue: Producer<'static, RX_QUEUE_SIZE>,
) {
    // DMA buffer, must be in RAM
    let mut buf = [0; 32];
    loop {
        match rx.read_until_idle(&mut buf).await {
            Ok(n) => {
                let queued = queue.write(&buf[..n]);
                if queued < n {
                    warn!("rx queue full, {} bytes dropped", n - queued);
                }
            }
            Err(e) => warn!("uart rx error: {:?}", e),
        }
    }
}

#[derive(Debug, defmt::Format)]
pub struct LinkError(pub uarte::Error);

impl embedded_io::Error for LinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

pub struct UartLink {
    tx: UarteTx<'static, UARTE0>,
    rx: Consumer<'static, RX_QUEUE_SIZE>,
}

impl UartLink {
    pub fn new(tx: UarteTx<'static, UARTE0>, rx: Consumer<'static, RX_QUEUE_SIZE>) -> Self {
        Self { tx, rx }
    }
}

impl embedded_io::ErrorType for UartLink {
    type Error = LinkError;
}

impl embedded_io::Read for UartLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.rx.read(buf);
            if n > 0 {
                return Ok(n);
            }
        }
    }
}

impl embedded_io::ReadReady for UartLink {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for UartLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.blocking_write(buf).map_err(LinkError)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // blocking_write returns once the DMA transfer has ended
        Ok(())
    }
}
