// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host to bootloader firmware update protocol.
//! The host runs the updater and the MCU runs the bootloader.
//! Both sides exchange fixed-size packets:
//!
//! ```text
//! | metadata (1B) | payload (16B) | crc16 (2B, little-endian) |
//!
//! metadata: bits [4:0] payload length, bits [7:5] packet kind
//! ```
//!
//! The CRC is CRC-16/XMODEM over the metadata and payload bytes.

#![no_std]

use crc::{Crc, CRC_16_XMODEM};


/// Size of the metadata field.
pub const METADATA_SIZE: usize = 1;

/// Fixed width of the payload field. Shorter payloads are padded.
pub const PAYLOAD_SIZE: usize = 16;

/// Size of the CRC field.
pub const CRC_SIZE: usize = 2;

/// Size of a packet on the wire.
pub const PACKET_SIZE: usize = METADATA_SIZE + PAYLOAD_SIZE + CRC_SIZE;

/// Filler for the unused tail of the payload.
/// Peers check it, so it has to be reproduced exactly.
pub const PADDING_BYTE: u8 = 0xFF;

const LENGTH_MASK: u8 = 0x1F;
const KIND_SHIFT: u8 = 5;
const KIND_MASK: u8 = 0x07 << KIND_SHIFT;

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/XMODEM: poly 0x1021, seed 0x0000, not reflected.
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    XMODEM.checksum(data)
}

/// Packet class carried in the upper bits of the metadata byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketKind {
    /// Firmware bytes (or the IV preceding them)
    Data = 0,
    /// Protocol management, opcode in the first payload byte
    Control = 1,
}

impl PacketKind {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Data),
            1 => Some(Self::Control),
            _ => None,
        }
    }
}

/// Opcode in the first payload byte of a control packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Target has written the whole image
    FwUpdateDone = 0x04,
    /// Positive acknowledgment
    Ack = 0x06,
    /// Host asks the target to start an update
    UpdateRequest = 0x11,
    /// Host announces the image size, followed by a little-endian u32
    FwSizeRequest = 0x12,
    /// Negative acknowledgment, the session is over
    Nack = 0x15,
    /// Target saw the sync sequence, followed by the device id
    Synced = 0x16,
    /// Ask the peer to send its last packet again
    Retransmit = 0x18,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x04 => Ok(Self::FwUpdateDone),
            0x06 => Ok(Self::Ack),
            0x11 => Ok(Self::UpdateRequest),
            0x12 => Ok(Self::FwSizeRequest),
            0x15 => Ok(Self::Nack),
            0x16 => Ok(Self::Synced),
            0x18 => Ok(Self::Retransmit),
            other => Err(other),
        }
    }
}

/// One packet of the update protocol.
///
/// Fields are kept exactly as they travel on the wire, so a packet read from
/// the link can be compared byte for byte and retransmitted unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    metadata: u8,
    payload: [u8; PAYLOAD_SIZE],
    crc: u16,
}

impl Packet {
    /// Build a data packet. The CRC is stamped.
    pub fn data(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() > PAYLOAD_SIZE {
            return Err(Error::PayloadTooLong { len: bytes.len() });
        }
        let mut packet = Self::blank(PacketKind::Data, bytes.len() as u8);
        packet.payload[..bytes.len()].copy_from_slice(bytes);
        packet.stamp_crc();
        Ok(packet)
    }

    /// Build a control packet: the opcode followed by `args`. The CRC is stamped.
    pub fn control(opcode: Opcode, args: &[u8]) -> Result<Self, Error> {
        let len = args.len() + 1;
        if len > PAYLOAD_SIZE {
            return Err(Error::PayloadTooLong { len });
        }
        let mut packet = Self::blank(PacketKind::Control, len as u8);
        packet.payload[0] = opcode as u8;
        packet.payload[1..len].copy_from_slice(args);
        packet.stamp_crc();
        Ok(packet)
    }

    /// Control packet carrying only an opcode.
    pub fn command(opcode: Opcode) -> Self {
        let mut packet = Self::blank(PacketKind::Control, 1);
        packet.payload[0] = opcode as u8;
        packet.stamp_crc();
        packet
    }

    /// The retransmission request. Its content and CRC never change.
    pub fn retransmit() -> Self {
        Self::command(Opcode::Retransmit)
    }

    fn blank(kind: PacketKind, len: u8) -> Self {
        Self {
            metadata: (((kind as u8) << KIND_SHIFT) & KIND_MASK) | (len & LENGTH_MASK),
            payload: [PADDING_BYTE; PAYLOAD_SIZE],
            crc: 0,
        }
    }

    /// Decode a packet as received. No validation is done here, see [`Packet::is_valid`].
    pub fn from_bytes(raw: &[u8; PACKET_SIZE]) -> Self {
        let mut payload = [0; PAYLOAD_SIZE];
        payload.copy_from_slice(&raw[METADATA_SIZE..METADATA_SIZE + PAYLOAD_SIZE]);
        Self {
            metadata: raw[0],
            payload,
            crc: u16::from_le_bytes([raw[PACKET_SIZE - 2], raw[PACKET_SIZE - 1]]),
        }
    }

    /// Encode the packet for the wire.
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut raw = [0; PACKET_SIZE];
        raw[0] = self.metadata;
        raw[METADATA_SIZE..METADATA_SIZE + PAYLOAD_SIZE].copy_from_slice(&self.payload);
        raw[PACKET_SIZE - CRC_SIZE..].copy_from_slice(&self.crc.to_le_bytes());
        raw
    }

    /// CRC over metadata and payload.
    pub fn compute_crc(&self) -> u16 {
        let mut digest = XMODEM.digest();
        digest.update(&[self.metadata]);
        digest.update(&self.payload);
        digest.finalize()
    }

    fn stamp_crc(&mut self) {
        self.crc = self.compute_crc();
    }

    /// True if the CRC field matches the content.
    pub fn is_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }

    pub fn metadata(&self) -> u8 {
        self.metadata
    }

    /// Packet class, `None` for kinds this protocol does not define.
    pub fn kind(&self) -> Option<PacketKind> {
        PacketKind::from_bits((self.metadata & KIND_MASK) >> KIND_SHIFT)
    }

    /// Declared payload length. May exceed [`PAYLOAD_SIZE`] on a malformed packet.
    pub fn len(&self) -> usize {
        (self.metadata & LENGTH_MASK) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole payload field, padding included.
    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.payload
    }

    /// The meaningful part of the payload.
    pub fn content(&self) -> &[u8] {
        &self.payload[..self.len().min(PAYLOAD_SIZE)]
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// Opcode of a control packet.
    pub fn opcode(&self) -> Option<Opcode> {
        if self.kind() != Some(PacketKind::Control) || self.is_empty() {
            return None;
        }
        Opcode::try_from(self.payload[0]).ok()
    }

    /// Arguments following the opcode of a control packet.
    pub fn args(&self) -> &[u8] {
        match self.opcode() {
            Some(_) => &self.content()[1..],
            None => &[],
        }
    }

    /// True for a control packet of exactly `len` payload bytes carrying `opcode`.
    pub fn is_control(&self, opcode: Opcode, len: usize) -> bool {
        self.len() == len && self.opcode() == Some(opcode)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Content does not fit the fixed payload width
    PayloadTooLong { len: usize },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PayloadTooLong { len } => {
                write!(f, "payload of {len} bytes does not fit in {PAYLOAD_SIZE} bytes")
            }
        }
    }
}
