// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Identifier of the device class this bootloader is built for.
/// The bootloader announces it in the `SYNCED` reply and refuses to boot an
/// image whose header carries a different identifier.
pub const DEVICE_ID: u8 = 0x69;

/// Raw bytes the update peer sends, unframed, to open an update session.
/// Matched in arrival order ("301F").
pub const SYNC_SEQUENCE: [u8; 4] = [0x33, 0x30, 0x31, 0x46];

/// Time in milliseconds the bootloader waits for the next step of the update
/// protocol before giving up. While waiting for the sync sequence this is
/// also how long the device lingers in the bootloader on every boot.
pub const LINK_TIMEOUT_MS: u32 = 2000;

/// Total size of the nRF52805 flash (192KB).
pub const FLASH_SIZE: u32 = 0x30000;

/// Size of a flash memory page in bytes (4KB).
/// Erase operations must be aligned to page boundaries.
pub const FLASH_PAGE: u32 = 4096;

/// Start address of the bootloader in flash memory.
pub const BASE_BOOTLOADER_ADDR: u32 = 0x0;

/// Flash reserved for the bootloader itself (32KB).
pub const BOOTLOADER_SIZE: u32 = 0x8000;

/// Base address for the application image in flash memory.
/// The image starts with the firmware header; the vector table follows it.
pub const BASE_APP_ADDR: u32 = BASE_BOOTLOADER_ADDR + BOOTLOADER_SIZE;

/// Size of the application region, header included.
pub const APP_SIZE: u32 = FLASH_SIZE - BASE_APP_ADDR;

/// Size of the firmware header persisted at [`BASE_APP_ADDR`].
/// Bits [6:0] of VTOR are reserved, so the header is padded to 128 bytes to
/// keep the vector table behind it aligned.
pub const FW_HEADER_SIZE: u32 = 128;

/// Application vector table address, where the bootloader jumps to.
///
/// ARMv7-M wants VTOR aligned to the table size rounded up to a power of two,
/// 256 bytes for the 42 nRF52805 vectors. The table follows the 128-byte
/// header in a page aligned region, so only the 128-byte VTOR minimum holds.
/// Vectors past the first 32 (IRQ 16 and up, RTC1 among them) are only
/// guaranteed once the application points VTOR at a 256-byte aligned copy of
/// its table, which it has to do before enabling those interrupts.
pub const APP_VECTOR_TABLE: u32 = BASE_APP_ADDR + FW_HEADER_SIZE;

// VTOR bits [6:0] are reserved.
const _: () = assert!(APP_VECTOR_TABLE % 128 == 0);
const _: () = assert!(BASE_APP_ADDR % FLASH_PAGE == 0);

/// Development AES-128 key the firmware packages are encrypted with.
/// Production builds replace it with the key provisioned for the device.
pub const AES_KEY: [u8; 16] = [
    0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
];

/// Compressed secp256k1 public key of the firmware signer.
// TODO: put the production signer public key here
pub const SIGNER_PUBKEY: [u8; 33] = [
    3, 183, 43, 173, 167, 178, 160, 111, 147, 27, 96, 177, 191, 221, 111, 147, 88, 112, 199, 126, 37, 79, 232, 178, 65, 192, 8, 185,
    71, 42, 215, 48, 85,
];
