// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware independent part of the bootloader: the packet framer, the
//! firmware update session and the boot verifier.
//!
//! The hardware is reached through traits: `embedded-io` for the serial
//! link, `embedded-storage` for the flash, [`Monotonic`] for time and
//! [`Secp256k1Verify`] for signatures.

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clock;
pub mod comm;
pub mod config;
pub mod error;
pub mod image;
#[cfg(any(test, feature = "std"))]
pub mod mock;
pub mod ring_buffer;
pub mod update;
pub mod verify;


pub use clock::{Monotonic, Timeout};
#[cfg(feature = "std")]
pub use clock::SystemClock;
pub use comm::Comm;
pub use config::{Config, Layout};
pub use error::{Error, Failure, Rejection, StorageErrorKind};
pub use image::FirmwareHeader;
pub use ring_buffer::{Consumer, Producer, RingBuffer};
pub use update::{update_run, Effects, Outcome, Phase, UpdateSession};
pub use verify::{check_image, verify_image, Secp256k1Verify, VerificationResult};
