// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::image::FirmwareHeader;

/// Where the application lives in flash. Offsets are from the start of flash.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// First byte of the application region, where the header goes
    pub app_offset: u32,
    /// Size of the region, header included. Multiple of the erase size.
    pub app_size: u32,
}

impl Layout {
    /// Largest update package accepted: IV and encrypted image together.
    pub const fn max_transfer_size(&self) -> u32 {
        self.app_size
    }

    /// Largest image that fits behind the header.
    pub const fn max_firmware_size(&self) -> u32 {
        self.app_size - FirmwareHeader::SIZE as u32
    }

    /// Offset of the first image byte, right after the header.
    pub const fn image_offset(&self) -> u32 {
        self.app_offset + FirmwareHeader::SIZE as u32
    }

    pub const fn end(&self) -> u32 {
        self.app_offset + self.app_size
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            app_offset: consts::BASE_APP_ADDR,
            app_size: consts::APP_SIZE,
        }
    }
}

/// Everything the update session and the verifier are parameterized by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device_id: u8,
    /// AES-128 key the update packages are encrypted with
    pub aes_key: [u8; 16],
    /// Compressed secp256k1 key of the image signer
    pub public_key: [u8; 33],
    pub layout: Layout,
    pub link_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: consts::DEVICE_ID,
            aes_key: consts::AES_KEY,
            public_key: consts::SIGNER_PUBKEY,
            layout: Layout::default(),
            link_timeout_ms: consts::LINK_TIMEOUT_MS,
        }
    }
}
