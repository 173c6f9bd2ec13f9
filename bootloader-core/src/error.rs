// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

/// Storage failure, reduced to what the bootloader acts on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageErrorKind {
    /// Offset or length does not match the program/erase granularity
    NotAligned,
    /// Access outside of the flash
    OutOfBounds,
    Other,
}

impl From<NorFlashErrorKind> for StorageErrorKind {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => Self::NotAligned,
            NorFlashErrorKind::OutOfBounds => Self::OutOfBounds,
            _ => Self::Other,
        }
    }
}

impl core::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotAligned => write!(f, "unaligned access"),
            Self::OutOfBounds => write!(f, "access out of bounds"),
            Self::Other => write!(f, "flash failure"),
        }
    }
}

/// Driver-level failure, surfaced to the caller instead of trapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Link(embedded_io::ErrorKind),
    Storage(StorageErrorKind),
    /// A valid packet arrived while the receive queue had no room for it
    QueueOverflow,
}

impl Error {
    pub fn link(err: impl embedded_io::Error) -> Self {
        Self::Link(err.kind())
    }

    pub fn storage(err: impl NorFlashError) -> Self {
        Self::Storage(err.kind().into())
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Link(kind) => write!(f, "serial link error: {kind:?}"),
            Self::Storage(kind) => write!(f, "storage error: {kind}"),
            Self::QueueOverflow => write!(f, "receive queue overflow"),
        }
    }
}

/// Why an update session ended without a new image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Failure {
    /// The peer went quiet after the session was opened
    Timeout,
    /// Wrong kind, opcode or length for the current step
    UnexpectedPacket,
    /// Announced size does not fit the application region
    FirmwareTooLarge { size: u32, max: u32 },
    /// Announced size is not an IV, a header and firmware in whole cipher blocks
    InvalidSize { size: u32 },
    /// A firmware packet that is not a whole cipher block
    PartialBlock { len: usize },
    QueueOverflow,
    Storage(StorageErrorKind),
    Link(embedded_io::ErrorKind),
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        match err {
            Error::Link(kind) => Self::Link(kind),
            Error::Storage(kind) => Self::Storage(kind),
            Error::QueueOverflow => Self::QueueOverflow,
        }
    }
}

impl core::fmt::Display for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "peer timed out"),
            Self::UnexpectedPacket => write!(f, "unexpected packet"),
            Self::FirmwareTooLarge { size, max } => {
                write!(f, "firmware of {size} bytes exceeds the maximum of {max} bytes")
            }
            Self::InvalidSize { size } => write!(f, "{size} bytes can not hold a firmware package"),
            Self::PartialBlock { len } => write!(f, "firmware packet of {len} bytes is not a cipher block"),
            Self::QueueOverflow => write!(f, "receive queue overflow"),
            Self::Storage(kind) => write!(f, "storage error: {kind}"),
            Self::Link(kind) => write!(f, "serial link error: {kind:?}"),
        }
    }
}

/// Why the boot verifier refused an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejection {
    WrongDevice { expected: u32, found: u32 },
    TooLong { length: u32, max: u32 },
    InvalidSignature,
    Storage(StorageErrorKind),
}

impl core::fmt::Display for Rejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::WrongDevice { expected, found } => {
                write!(f, "image built for device {found:#x}, expected {expected:#x}")
            }
            Self::TooLong { length, max } => {
                write!(f, "image length {length} exceeds the maximum of {max} bytes")
            }
            Self::InvalidSignature => write!(f, "invalid image signature"),
            Self::Storage(kind) => write!(f, "storage error: {kind}"),
        }
    }
}
