// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]
mod jump_app;
mod link;
mod verify;

use defmt_rtt as _;
// global logger
use embassy_nrf as _;
// time driver
use panic_probe as _;

use bootloader_core::{update_run, Comm, Config, Monotonic, RingBuffer};
use core::cell::RefCell;
use defmt::{error, info, unwrap};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_nrf::gpio::Pin as _;
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals::{self, RNG};
use embassy_nrf::rng::{self, Rng};
use embassy_nrf::{bind_interrupts, uarte};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;
use jump_app::{halt, jump_to_app};
use link::UartLink;

// Mutex for random hw generator to delay in verification
static RNG_HW: Mutex<ThreadModeRawMutex, RefCell<Option<Rng<'static, RNG>>>> = Mutex::new(RefCell::new(None));

// Runs the UART receive task above the blocking update loop
static EXECUTOR_RX: InterruptExecutor = InterruptExecutor::new();

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
    RNG => rng::InterruptHandler<peripherals::RNG>;
});

#[cfg(feature = "no-dbg-access")]
#[used]
#[link_section = ".uicr_approtect"]
pub static APPROTECT: u32 = 0x0000_0000;

#[interrupt]
unsafe fn SWI0_EGU0() {
    EXECUTOR_RX.on_interrupt()
}

struct EmbassyClock;

impl Monotonic for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());

    let mut config_uart = uarte::Config::default();
    config_uart.parity = uarte::Parity::EXCLUDED;
    config_uart.baudrate = uarte::Baudrate::BAUD115200;

    #[cfg(feature = "uart-pins-console")]
    let (rxd, txd) = (p.P0_16.degrade(), p.P0_18.degrade());
    #[cfg(not(feature = "uart-pins-console"))]
    let (rxd, txd) = (p.P0_14.degrade(), p.P0_12.degrade());

    // Uarte config
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, rxd, txd, config_uart);
    let (tx, rx) = uart.split_with_idle(p.TIMER0, p.PPI_CH0, p.PPI_CH1);

    let (rx_producer, rx_consumer) = link::RX_QUEUE.init(RingBuffer::new()).split();

    interrupt::SWI0_EGU0.set_priority(Priority::P6);
    let spawner = EXECUTOR_RX.start(interrupt::SWI0_EGU0);
    unwrap!(spawner.spawn(link::uart_rx(rx, rx_producer)));

    // RNG
    let rng = Rng::new(p.RNG, Irqs);
    RNG_HW.lock(|f| f.borrow_mut().replace(rng));

    // FLASH
    let mut flash = Nvmc::new(p.NVMC);

    let config = Config::default();
    let mut comm = Comm::new(UartLink::new(tx, rx_consumer));
    let outcome = update_run(&mut comm, &mut flash, &EmbassyClock, &config);
    info!("update session ended: {}", outcome);

    if verify::boot_allowed(&mut flash, &config) {
        info!("jumping to application");
        unsafe { jump_to_app() }
    }
    error!("no bootable image, halting");
    halt()
}
