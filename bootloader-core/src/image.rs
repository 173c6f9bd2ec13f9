// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Header at the start of the application region.
///
/// ```text
/// | iv (16) | version (4) | device_id (4) | length (4) | signature (64) | padding (36) |
/// ```
///
/// Integers are little-endian. The signature is ECDSA secp256k1, `r || s`,
/// over the SHA-256 digest of the `length` bytes following the header.
/// Bits [6:0] of VTOR are reserved, hence the padding to 128 bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareHeader {
    pub iv: [u8; 16],
    pub version: u32,
    pub device_id: u32,
    pub length: u32,
    pub signature: [u8; 64],
}

const _: () = assert!(FirmwareHeader::PADDING_OFFSET + FirmwareHeader::PADDING == FirmwareHeader::SIZE);

impl FirmwareHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = consts::FW_HEADER_SIZE as usize;

    pub const IV_SIZE: usize = 16;

    pub const SIGNATURE_SIZE: usize = 64;

    /// Number of padding bytes at the end of the header.
    pub const PADDING: usize = 36;

    pub const PADDING_BYTE: u8 = 0xFF;

    const VERSION_OFFSET: usize = Self::IV_SIZE;
    const DEVICE_ID_OFFSET: usize = Self::VERSION_OFFSET + 4;
    const LENGTH_OFFSET: usize = Self::DEVICE_ID_OFFSET + 4;
    const SIGNATURE_OFFSET: usize = Self::LENGTH_OFFSET + 4;
    const PADDING_OFFSET: usize = Self::SIGNATURE_OFFSET + Self::SIGNATURE_SIZE;

    pub fn parse(raw: &[u8; Self::SIZE]) -> Self {
        let word = |offset: usize| {
            u32::from_le_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
        };
        let mut iv = [0; Self::IV_SIZE];
        iv.copy_from_slice(&raw[..Self::IV_SIZE]);
        let mut signature = [0; Self::SIGNATURE_SIZE];
        signature.copy_from_slice(&raw[Self::SIGNATURE_OFFSET..Self::PADDING_OFFSET]);
        Self {
            iv,
            version: word(Self::VERSION_OFFSET),
            device_id: word(Self::DEVICE_ID_OFFSET),
            length: word(Self::LENGTH_OFFSET),
            signature,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = [Self::PADDING_BYTE; Self::SIZE];
        raw[..Self::IV_SIZE].copy_from_slice(&self.iv);
        raw[Self::VERSION_OFFSET..Self::DEVICE_ID_OFFSET].copy_from_slice(&self.version.to_le_bytes());
        raw[Self::DEVICE_ID_OFFSET..Self::LENGTH_OFFSET].copy_from_slice(&self.device_id.to_le_bytes());
        raw[Self::LENGTH_OFFSET..Self::SIGNATURE_OFFSET].copy_from_slice(&self.length.to_le_bytes());
        raw[Self::SIGNATURE_OFFSET..Self::PADDING_OFFSET].copy_from_slice(&self.signature);
        raw
    }
}
