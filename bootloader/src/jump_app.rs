// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::APP_VECTOR_TABLE;
use cortex_m::peripheral::{NVIC, SCB};
use defmt::info;
use nrf52805_pac::Interrupt;

/// Interrupts the bootloader enabled. They must be quiet before the
/// application installs its own handlers.
const BOOTLOADER_IRQS: [Interrupt; 5] = [
    Interrupt::UARTE0_UART0,
    Interrupt::RNG,
    Interrupt::RTC1,
    Interrupt::TIMER0,
    Interrupt::SWI0_EGU0,
];

/// Hand the CPU over to the verified application.
///
/// # Safety
///
/// The application region must hold an image that passed verification.
pub unsafe fn jump_to_app() -> ! {
    cortex_m::interrupt::disable();
    for irq in BOOTLOADER_IRQS {
        NVIC::mask(irq);
        NVIC::unpend(irq);
    }

    let msp = *(APP_VECTOR_TABLE as *const u32);
    let rv = *((APP_VECTOR_TABLE + 4) as *const u32);
    info!("msp = {=u32:x}, rv = {=u32:x}", msp, rv);

    (*SCB::PTR).vtor.write(APP_VECTOR_TABLE);
    cortex_m::interrupt::enable();

    // Loads MSP and jumps to the reset vector of the application
    cortex_m::asm::bootload(APP_VECTOR_TABLE as *const u32)
}

/// Fail closed: never run an image that did not verify.
pub fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
