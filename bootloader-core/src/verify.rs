// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Boot-time check of the image in the application region.

use embedded_storage::nor_flash::{NorFlashError, ReadNorFlash};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Rejection, StorageErrorKind};
use crate::image::FirmwareHeader;

/// Bytes hashed per flash read.
const HASH_CHUNK: usize = 32;

/// ECDSA secp256k1 verification.
pub trait Secp256k1Verify {
    /// Verify an ECDSA signature against the given public key.
    fn verify_ecdsa(&self, msg: [u8; 32], signature: [u8; 64], pubkey: [u8; 33]) -> VerificationResult;
}

/// Verification result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum VerificationResult {
    // Many bits apart, so glitching one value into the other takes more than a bit flip.
    Valid = 0xcafebabe,
    Invalid = 0xdeadbeef,
}

fn read<F: ReadNorFlash>(flash: &mut F, offset: u32, bytes: &mut [u8]) -> Result<(), Rejection> {
    flash
        .read(offset, bytes)
        .map_err(|e| Rejection::Storage(StorageErrorKind::from(e.kind())))
}

/// SHA-256 of `length` bytes starting at `offset`, read in small chunks.
fn image_digest<F: ReadNorFlash>(flash: &mut F, offset: u32, length: u32) -> Result<[u8; 32], Rejection> {
    let mut sha = Sha256::new();
    let mut chunk = [0; HASH_CHUNK];
    let mut done = 0;
    while done < length {
        let n = (length - done).min(HASH_CHUNK as u32) as usize;
        read(flash, offset + done, &mut chunk[..n])?;
        sha.update(&chunk[..n]);
        done += n as u32;
    }
    Ok(sha.finalize().into())
}

/// Validate the stored image, returning its header if it may run.
pub fn check_image<F, V>(flash: &mut F, config: &Config, verifier: &V) -> Result<FirmwareHeader, Rejection>
where
    F: ReadNorFlash,
    V: Secp256k1Verify,
{
    let layout = &config.layout;
    let mut raw = [0; FirmwareHeader::SIZE];
    read(flash, layout.app_offset, &mut raw)?;
    let header = FirmwareHeader::parse(&raw);

    if header.device_id != config.device_id as u32 {
        return Err(Rejection::WrongDevice {
            expected: config.device_id as u32,
            found: header.device_id,
        });
    }
    let max = layout.max_firmware_size();
    if header.length > max {
        return Err(Rejection::TooLong {
            length: header.length,
            max,
        });
    }

    let digest = image_digest(flash, layout.image_offset(), header.length)?;
    match verifier.verify_ecdsa(digest, header.signature, config.public_key) {
        VerificationResult::Valid => Ok(header),
        VerificationResult::Invalid => Err(Rejection::InvalidSignature),
    }
}

/// `true` if the stored image may be booted.
pub fn verify_image<F, V>(flash: &mut F, config: &Config, verifier: &V) -> bool
where
    F: ReadNorFlash,
    V: Secp256k1Verify,
{
    match check_image(flash, config, verifier) {
        Ok(header) => {
            info!("image version {} ({} bytes) verified", header.version, header.length);
            true
        }
        Err(rejection) => {
            error!("refusing to boot: {}", rejection);
            false
        }
    }
}
