// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory stand-ins for the hardware, to run the bootloader logic on a PC.

use core::cell::Cell;
use core::convert::Infallible;
use std::collections::VecDeque;
use std::vec;
use std::vec::Vec;

use embedded_io::{ErrorType, Read, ReadReady, Write};
use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType as FlashErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};
use host_protocol::{Packet, PACKET_SIZE};

use crate::clock::Monotonic;

/// NOR flash in RAM. Programming can only clear bits, as on the real part.
#[derive(Debug, Clone)]
pub struct RamFlash {
    mem: Vec<u8>,
    erases: usize,
}

impl RamFlash {
    /// Erased flash of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0xFF; size],
            erases: 0,
        }
    }

    /// Flash holding `data` at `offset`, erased elsewhere.
    pub fn with_contents(size: usize, offset: usize, data: &[u8]) -> Self {
        let mut flash = Self::new(size);
        flash.mem[offset..offset + data.len()].copy_from_slice(data);
        flash
    }

    pub fn contents(&self) -> &[u8] {
        &self.mem
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// Number of erase calls so far.
    pub fn erase_count(&self) -> usize {
        self.erases
    }
}

impl FlashErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let offset = offset as usize;
        bytes.copy_from_slice(&self.mem[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.mem.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = consts::FLASH_PAGE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        self.mem[from as usize..to as usize].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        let offset = offset as usize;
        for (cell, byte) in self.mem[offset..offset + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Clock that moves only when told to, plus `step` on every read.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    step: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock advancing by `step` milliseconds each time it is read, so
    /// polling loops reach their deadlines.
    pub fn ticking(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Monotonic for ManualClock {
    fn now_ms(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Serial link fed from a script, recording everything sent.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the device to receive.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn feed_packet(&mut self, packet: &Packet) {
        self.feed(&packet.to_bytes());
    }

    /// Bytes not consumed yet.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn sent(&self) -> &[u8] {
        &self.tx
    }

    /// Everything sent so far, cut into packets.
    pub fn sent_packets(&self) -> Vec<Packet> {
        self.tx
            .chunks_exact(PACKET_SIZE)
            .map(|raw| {
                let mut packet = [0; PACKET_SIZE];
                packet.copy_from_slice(raw);
                Packet::from_bytes(&packet)
            })
            .collect()
    }

    pub fn clear_sent(&mut self) {
        self.tx.clear();
    }
}

impl ErrorType for ScriptedLink {
    type Error = Infallible;
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => buf[n] = byte,
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }
}

impl ReadReady for ScriptedLink {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
