// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use bootloader_core::{check_image, Config, Secp256k1Verify, VerificationResult};
use cortex_m::prelude::_embedded_hal_blocking_delay_DelayMs;
use defmt::{error, info};
use embassy_nrf::nvmc::Nvmc;
use embassy_time::Delay;
use micro_ecc_sys::{uECC_decompress, uECC_secp256k1, uECC_valid_public_key, uECC_verify};

use crate::RNG_HW;

pub struct EccVerifier;

impl Secp256k1Verify for EccVerifier {
    fn verify_ecdsa(&self, msg: [u8; 32], signature: [u8; 64], pubkey: [u8; 33]) -> VerificationResult {
        const UECC_SUCCESS: i32 = 1;
        const CFI_SUCCESS: u32 = CF1 + CF2;
        const CF1: u32 = 13;
        const CF2: u32 = 7;
        let mut control_flow_integrity_counter = 0;
        let mut uncompressed_pk = [0; 64];
        unsafe { uECC_decompress(pubkey.as_ptr(), uncompressed_pk.as_mut_ptr(), uECC_secp256k1()) };
        let res = unsafe { uECC_valid_public_key(uncompressed_pk.as_ptr(), uECC_secp256k1()) };
        if res == UECC_SUCCESS {
            control_flow_integrity_counter += CF1;
            random_delay(); // Random delay against glitch or timing attacks
            let res = unsafe {
                uECC_verify(
                    uncompressed_pk.as_ptr(),
                    msg.as_ptr(),
                    msg.len() as u32,
                    signature.as_ptr(),
                    uECC_secp256k1(),
                )
            };
            random_delay(); // Random delay against glitch or timing attacks
            if res == UECC_SUCCESS {
                control_flow_integrity_counter += CF2;
                let complement = !UECC_SUCCESS;
                let complement_ptr = &complement as *const i32;
                if !res == unsafe { complement_ptr.read_volatile() } && control_flow_integrity_counter == CFI_SUCCESS {
                    return VerificationResult::Valid;
                }
            }
        }
        VerificationResult::Invalid
    }
}

fn random_delay() {
    RNG_HW.lock(|rng| {
        let mut bytes = [0; 1];
        if let Some(rng) = rng.borrow_mut().as_mut() {
            rng.blocking_fill_bytes(&mut bytes);
        }
        // Get 0 - 200 ms
        bytes[0] %= 200;
        Delay.delay_ms(bytes[0]);
    });
}

/// `true` only if the application image passed every check. The checks on
/// the header are repeated behind a control flow counter so a single glitch
/// can not turn a rejection into a jump.
pub fn boot_allowed(flash: &mut Nvmc, config: &Config) -> bool {
    let mut control_flow_integrity_counter = 0;
    const CF1: u32 = 3;
    const CF2: u32 = 5;
    const CF3: u32 = 7;
    // Random delay to thwart glitching the condition
    random_delay();
    let header = match check_image(flash, config, &EccVerifier) {
        Ok(header) => header,
        Err(rejection) => {
            error!("refusing to boot: {}", rejection);
            return false;
        }
    };
    control_flow_integrity_counter += CF1;
    if header.device_id == config.device_id as u32 {
        control_flow_integrity_counter += CF2;
        if core::hint::black_box(header.length <= config.layout.max_firmware_size()) {
            control_flow_integrity_counter += CF3;
            let cfi_counter_ptr = &control_flow_integrity_counter as *const u32;
            if unsafe { cfi_counter_ptr.read_volatile() } == CF1 + CF2 + CF3 {
                info!("image version {} ({} bytes) verified", header.version, header.length);
                return true;
            }
        }
    }
    false
}
