// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Firmware update session.
//!
//! ```text
//! AwaitSync -> AwaitUpdateRequest -> AwaitFirmwareSize -> AwaitIv -> ReceiveFirmware -> Done
//! ```
//!
//! [`UpdateSession`] only decides. Each event returns the [`Effects`] to carry
//! out (erase, store, reply), and [`update_run`] applies them to the flash and
//! the link. Any step can end in `Done`; the peer gets a `NACK` on failure.

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use embedded_io::{Read, ReadReady, Write};
use embedded_storage::nor_flash::NorFlash;
use host_protocol::{Opcode, Packet, PacketKind, PAYLOAD_SIZE};

use crate::clock::{Monotonic, Timeout};
use crate::comm::Comm;
use crate::config::{Config, Layout};
use crate::error::{Error, Failure};
use crate::image::FirmwareHeader;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const SYNC_WORD: u32 = u32::from_be_bytes(consts::SYNC_SEQUENCE);

/// Cipher block, also the unit the image travels and is stored in.
const BLOCK_SIZE: usize = 16;

const _: () = assert!(BLOCK_SIZE == PAYLOAD_SIZE && BLOCK_SIZE == FirmwareHeader::IV_SIZE);

/// The header and at least one block of firmware.
const MIN_TRANSFER_SIZE: u32 = (FirmwareHeader::SIZE + BLOCK_SIZE) as u32;

/// How a session ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Nobody asked for an update, flash untouched
    NoUpdate,
    /// The whole image was written
    Completed,
    Failed(Failure),
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoUpdate => write!(f, "no update"),
            Self::Completed => write!(f, "update completed"),
            Self::Failed(failure) => write!(f, "update failed: {failure}"),
        }
    }
}

/// Where a session stands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    AwaitSync,
    AwaitUpdateRequest,
    AwaitFirmwareSize,
    AwaitIv { firmware_size: u32 },
    ReceiveFirmware { firmware_size: u32, bytes_received: u32 },
    Done(Outcome),
}

enum State {
    AwaitSync {
        window: u32,
    },
    AwaitUpdateRequest,
    AwaitFirmwareSize,
    AwaitIv {
        firmware_size: u32,
    },
    ReceiveFirmware {
        firmware_size: u32,
        bytes_received: u32,
        cipher: Aes128CbcDec,
    },
    Done(Outcome),
}

/// Bytes to program at an absolute flash offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u32,
    pub data: [u8; BLOCK_SIZE],
}

/// What a transition asks for, applied in field order.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Effects {
    /// Erase the whole application region
    pub erase: bool,
    pub store: Option<Chunk>,
    pub reply: Option<Packet>,
}

impl Effects {
    fn none() -> Self {
        Self::default()
    }

    fn reply(packet: Packet) -> Self {
        Self {
            reply: Some(packet),
            ..Self::default()
        }
    }
}

pub struct UpdateSession {
    state: State,
    deadline: Timeout,
    device_id: u8,
    aes_key: [u8; 16],
    layout: Layout,
}

impl UpdateSession {
    /// A session waiting for the sync sequence, its deadline running from `now`.
    pub fn new(config: &Config, now: u64) -> Self {
        Self {
            state: State::AwaitSync { window: 0 },
            deadline: Timeout::new(now, config.link_timeout_ms as u64),
            device_id: config.device_id,
            aes_key: config.aes_key,
            layout: config.layout,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            State::AwaitSync { .. } => Phase::AwaitSync,
            State::AwaitUpdateRequest => Phase::AwaitUpdateRequest,
            State::AwaitFirmwareSize => Phase::AwaitFirmwareSize,
            State::AwaitIv { firmware_size } => Phase::AwaitIv {
                firmware_size: *firmware_size,
            },
            State::ReceiveFirmware {
                firmware_size,
                bytes_received,
                ..
            } => Phase::ReceiveFirmware {
                firmware_size: *firmware_size,
                bytes_received: *bytes_received,
            },
            State::Done(outcome) => Phase::Done(*outcome),
        }
    }

    /// Until synchronized, the session reads the raw byte stream instead of packets.
    pub fn is_syncing(&self) -> bool {
        matches!(self.state, State::AwaitSync { .. })
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            State::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Feed one raw byte while waiting for the sync sequence.
    pub fn on_sync_byte(&mut self, byte: u8, now: u64) -> Effects {
        let State::AwaitSync { window } = &mut self.state else {
            return Effects::none();
        };
        *window = (*window << 8) | byte as u32;
        if *window != SYNC_WORD {
            return Effects::none();
        }

        info!("sync sequence received");
        self.state = State::AwaitUpdateRequest;
        self.deadline.reset(now);
        match Packet::control(Opcode::Synced, &[self.device_id]) {
            Ok(synced) => Effects::reply(synced),
            Err(_) => Effects::none(),
        }
    }

    /// Handle a validated packet from the framer.
    pub fn on_packet(&mut self, packet: &Packet, now: u64) -> Effects {
        match self.accept(packet, now) {
            Ok(effects) => effects,
            Err(failure) => self.fail(failure),
        }
    }

    fn accept(&mut self, packet: &Packet, now: u64) -> Result<Effects, Failure> {
        let effects = match &mut self.state {
            State::AwaitSync { .. } | State::Done(_) => return Ok(Effects::none()),

            State::AwaitUpdateRequest => {
                if !packet.is_control(Opcode::UpdateRequest, 1) {
                    return Err(Failure::UnexpectedPacket);
                }
                debug!("update requested");
                self.state = State::AwaitFirmwareSize;
                Effects::reply(Packet::command(Opcode::Ack))
            }

            State::AwaitFirmwareSize => {
                if !packet.is_control(Opcode::FwSizeRequest, 5) {
                    return Err(Failure::UnexpectedPacket);
                }
                let args = packet.args();
                let firmware_size = u32::from_le_bytes([args[0], args[1], args[2], args[3]]);
                if firmware_size < MIN_TRANSFER_SIZE || firmware_size % BLOCK_SIZE as u32 != 0 {
                    return Err(Failure::InvalidSize { size: firmware_size });
                }
                let max = self.layout.max_transfer_size();
                if firmware_size > max {
                    return Err(Failure::FirmwareTooLarge {
                        size: firmware_size,
                        max,
                    });
                }
                info!("receiving {} bytes", firmware_size);
                self.state = State::AwaitIv { firmware_size };
                Effects::reply(Packet::command(Opcode::Ack))
            }

            State::AwaitIv { firmware_size } => {
                if packet.kind() != Some(PacketKind::Data) || packet.len() != BLOCK_SIZE {
                    return Err(Failure::UnexpectedPacket);
                }
                let firmware_size = *firmware_size;
                let iv = *packet.payload();
                let cipher = Aes128CbcDec::new(&self.aes_key.into(), &iv.into());
                self.state = State::ReceiveFirmware {
                    firmware_size,
                    bytes_received: BLOCK_SIZE as u32,
                    cipher,
                };
                // Last point the resident image is still intact.
                Effects {
                    erase: true,
                    store: Some(Chunk {
                        offset: self.layout.app_offset,
                        data: iv,
                    }),
                    reply: Some(Packet::command(Opcode::Ack)),
                }
            }

            State::ReceiveFirmware {
                firmware_size,
                bytes_received,
                cipher,
            } => {
                if packet.kind() != Some(PacketKind::Data) {
                    return Err(Failure::UnexpectedPacket);
                }
                if packet.len() != BLOCK_SIZE {
                    return Err(Failure::PartialBlock { len: packet.len() });
                }

                let mut block = aes::Block::from(*packet.payload());
                cipher.decrypt_block_mut(&mut block);
                let mut data = [0; BLOCK_SIZE];
                data.copy_from_slice(&block);
                let chunk = Chunk {
                    offset: self.layout.app_offset + *bytes_received,
                    data,
                };
                *bytes_received += BLOCK_SIZE as u32;

                if *bytes_received < *firmware_size {
                    trace!("{} of {} bytes", *bytes_received, *firmware_size);
                    Effects {
                        store: Some(chunk),
                        reply: Some(Packet::command(Opcode::Ack)),
                        ..Effects::default()
                    }
                } else {
                    info!("all {} bytes received", *bytes_received);
                    self.state = State::Done(Outcome::Completed);
                    Effects {
                        store: Some(chunk),
                        reply: Some(Packet::command(Opcode::FwUpdateDone)),
                        ..Effects::default()
                    }
                }
            }
        };
        self.deadline.reset(now);
        Ok(effects)
    }

    /// Check the link deadline.
    pub fn on_tick(&mut self, now: u64) -> Effects {
        if !self.deadline.elapsed(now) {
            return Effects::none();
        }
        match self.state {
            State::Done(_) => Effects::none(),
            State::AwaitSync { .. } => {
                debug!("no sync sequence, leaving update mode");
                self.state = State::Done(Outcome::NoUpdate);
                Effects::none()
            }
            _ => self.fail(Failure::Timeout),
        }
    }

    /// End the session, telling the peer. A completed session can still fail
    /// while its last block is stored.
    pub fn fail(&mut self, failure: Failure) -> Effects {
        if let State::Done(Outcome::Failed(_) | Outcome::NoUpdate) = self.state {
            return Effects::none();
        }
        error!("{}", failure);
        self.state = State::Done(Outcome::Failed(failure));
        Effects::reply(Packet::command(Opcode::Nack))
    }
}

fn store<F: NorFlash>(flash: &mut F, layout: &Layout, effects: &Effects) -> Result<(), Error> {
    if effects.erase {
        info!("erasing application region");
        flash.erase(layout.app_offset, layout.end()).map_err(Error::storage)?;
    }
    if let Some(chunk) = &effects.store {
        flash.write(chunk.offset, &chunk.data).map_err(Error::storage)?;
    }
    Ok(())
}

/// Run an update session to its end.
///
/// The framer is left alone until the sync sequence has been seen, the sync
/// scan owns the byte stream before that.
pub fn update_run<S, F, C>(comm: &mut Comm<S>, flash: &mut F, clock: &C, config: &Config) -> Outcome
where
    S: Read + ReadReady + Write,
    F: NorFlash,
    C: Monotonic,
{
    let mut session = UpdateSession::new(config, clock.now_ms());

    loop {
        let now = clock.now_ms();
        let effects = if session.is_syncing() {
            match comm.read_raw() {
                Ok(Some(byte)) => session.on_sync_byte(byte, now),
                Ok(None) => session.on_tick(now),
                Err(err) => session.fail(err.into()),
            }
        } else {
            match comm.service() {
                Ok(()) => match comm.read() {
                    Some(packet) => session.on_packet(&packet, now),
                    None => session.on_tick(now),
                },
                Err(err) => session.fail(err.into()),
            }
        };

        let reply = match store(flash, &config.layout, &effects) {
            Ok(()) => effects.reply,
            Err(err) => session.fail(err.into()).reply,
        };
        if let Some(packet) = reply {
            if let Err(err) = comm.write(&packet) {
                if let Some(nack) = session.fail(err.into()).reply {
                    let _ = comm.write(&nack);
                }
            }
        }

        if let Some(outcome) = session.outcome() {
            info!("{}", outcome);
            return outcome;
        }
    }
}
