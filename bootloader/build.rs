// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! This build script writes `memory.x` into a directory where the linker can
//! always find it at build time. The flash partition comes from the `consts`
//! crate, so the linker script and the update region can not drift apart.

use consts::{BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let memory_x_content = format!(
        r##"
        BASE_BOOTLOADER_ADDR = {:#X};
        BOOTLOADER_SIZE = {:#X};

        MEMORY
        {{
            /* NOTE 1 K = 1 KiBi = 1024 bytes */
            /* The bootloader owns the start of flash, the application follows it */
            FLASH (rx) : ORIGIN = 0x00000000 + BASE_BOOTLOADER_ADDR, LENGTH = BOOTLOADER_SIZE
            RAM : ORIGIN = 0x20000000, LENGTH = 24K
            uicr_approtect (r) : ORIGIN = 0x10001208, LENGTH = 0x4
        }}

        SECTIONS {{
            .uicr_approtect :  {{
                KEEP(*(.uicr_approtect))
                . = ALIGN(4);
            }} > uicr_approtect
        }};
        "##,
        BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE
    );
    // Put `memory.x` in our output directory and ensure it's
    // on the linker search path.
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../consts/src/lib.rs");

    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
