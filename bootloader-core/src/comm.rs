// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Packet framing over a byte link.
//!
//! [`Comm::service`] assembles incoming bytes into packets, answers
//! corrupted packets with a retransmission request, replays the last sent
//! packet when the peer asks for it, and queues everything else for
//! [`Comm::read`].

use embedded_io::{Read, ReadReady, Write};
use host_protocol::{Packet, CRC_SIZE, METADATA_SIZE, PACKET_SIZE, PAYLOAD_SIZE};

use crate::ring_buffer::RingBuffer;
use crate::Error;

/// Receive queue size in bytes, room for 13 packets.
pub const QUEUE_SIZE: usize = 256;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RxState {
    Metadata,
    Payload,
    Crc,
    /// A whole packet is assembled and waits for validation
    Process,
}

pub struct Comm<S> {
    link: S,
    state: RxState,
    rx_count: usize,
    rx: [u8; PACKET_SIZE],
    last_tx: Option<Packet>,
    retx: Packet,
    queue: RingBuffer<QUEUE_SIZE>,
}

impl<S> Comm<S>
where
    S: Read + ReadReady + Write,
{
    pub fn new(link: S) -> Self {
        Self {
            link,
            state: RxState::Metadata,
            rx_count: 0,
            rx: [0; PACKET_SIZE],
            last_tx: None,
            retx: Packet::retransmit(),
            queue: RingBuffer::new(),
        }
    }

    /// Consume bytes from the link until a packet is queued or the link runs
    /// dry. Never waits for more.
    pub fn service(&mut self) -> Result<(), Error> {
        while let Some(byte) = self.read_raw()? {
            self.assemble(byte);
            if self.state == RxState::Process && self.process()? {
                break;
            }
        }
        Ok(())
    }

    fn assemble(&mut self, byte: u8) {
        self.rx[self.rx_count] = byte;
        self.rx_count += 1;
        self.state = match self.state {
            RxState::Metadata => RxState::Payload,
            RxState::Payload if self.rx_count == METADATA_SIZE + PAYLOAD_SIZE => RxState::Crc,
            RxState::Crc if self.rx_count == METADATA_SIZE + PAYLOAD_SIZE + CRC_SIZE => RxState::Process,
            state => state,
        };
    }

    /// Validate the assembled packet. `Ok(true)` if it was queued.
    fn process(&mut self) -> Result<bool, Error> {
        self.state = RxState::Metadata;
        self.rx_count = 0;
        let packet = Packet::from_bytes(&self.rx);

        if !packet.is_valid() {
            warn!("crc mismatch, requesting retransmission");
            let retx = self.retx;
            self.transmit(&retx)?;
            return Ok(false);
        }

        if packet == self.retx {
            if let Some(last) = self.last_tx {
                debug!("peer asked for retransmission");
                self.transmit(&last)?;
            }
            return Ok(false);
        }

        if self.queue.free() < PACKET_SIZE {
            error!("receive queue full, packet dropped");
            return Err(Error::QueueOverflow);
        }
        self.queue.write(&packet.to_bytes());
        Ok(true)
    }

    fn transmit(&mut self, packet: &Packet) -> Result<(), Error> {
        self.link.write_all(&packet.to_bytes()).map_err(Error::link)?;
        self.link.flush().map_err(Error::link)
    }

    /// Send a packet and remember it for retransmission.
    pub fn write(&mut self, packet: &Packet) -> Result<(), Error> {
        self.last_tx = Some(*packet);
        self.transmit(packet)
    }

    /// Oldest queued packet.
    pub fn read(&mut self) -> Option<Packet> {
        if self.packets_available() == 0 {
            return None;
        }
        let mut raw = [0; PACKET_SIZE];
        self.queue.read(&mut raw);
        Some(Packet::from_bytes(&raw))
    }

    pub fn packets_available(&self) -> usize {
        self.queue.len() / PACKET_SIZE
    }

    /// One byte straight from the link, bypassing the framer.
    pub fn read_raw(&mut self) -> Result<Option<u8>, Error> {
        if !self.link.read_ready().map_err(Error::link)? {
            return Ok(None);
        }
        let mut byte = [0; 1];
        match self.link.read(&mut byte).map_err(Error::link)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub fn last_written(&self) -> Option<&Packet> {
        self.last_tx.as_ref()
    }

    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    pub fn into_inner(self) -> S {
        self.link
    }
}
