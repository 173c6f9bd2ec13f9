// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host side of the update protocol.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use consts::SYNC_SEQUENCE;
use host_protocol::{Opcode, Packet, PACKET_SIZE, PAYLOAD_SIZE};

/// How long to wait for `SYNCED` before sending the sync sequence again.
/// Resending early would push stray sync bytes into the device's framer.
pub const SYNC_RETRY: Duration = Duration::from_millis(500);

/// Default wait for a reply. Covers erasing the application region, which
/// the device does before acknowledging the IV.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time spent trying to catch the device in its sync window.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("serial port: {0}")]
    Io(#[from] io::Error),
    #[error("package of {0} bytes is not a sequence of 16-byte blocks")]
    BadPackage(usize),
    #[error("malformed packet: {0}")]
    Packet(host_protocol::Error),
    #[error("no SYNCED reply, is the device in its update window?")]
    NoSync,
    #[error("device {found:#04x} answered, expected {expected:#04x}")]
    WrongDevice { expected: u8, found: u8 },
    #[error("device refused the {0}")]
    Nack(&'static str),
    #[error("no reply to the {0}")]
    Timeout(&'static str),
    #[error("unexpected reply to the {step}: {packet:?}")]
    UnexpectedReply { step: &'static str, packet: Packet },
}

/// Drives one update over a byte stream.
///
/// Reads on `port` should time out after a short while instead of blocking,
/// as a `serialport` port opened with a timeout does.
pub struct Updater<P> {
    port: P,
    device_id: u8,
    reply_timeout: Duration,
    sync_timeout: Duration,
    last_tx: Option<Packet>,
    rx: Vec<u8>,
}

impl<P: Read + Write> Updater<P> {
    pub fn new(port: P, device_id: u8) -> Self {
        Self {
            port,
            device_id,
            reply_timeout: REPLY_TIMEOUT,
            sync_timeout: SYNC_TIMEOUT,
            last_tx: None,
            rx: Vec::new(),
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Send `package` (IV followed by the encrypted image) to the device.
    pub fn run(&mut self, package: &[u8]) -> Result<(), UpdateError> {
        if package.is_empty() || package.len() % PAYLOAD_SIZE != 0 {
            return Err(UpdateError::BadPackage(package.len()));
        }
        let size = u32::try_from(package.len()).map_err(|_| UpdateError::BadPackage(package.len()))?;

        self.sync()?;

        self.send(&Packet::command(Opcode::UpdateRequest))?;
        self.expect(Opcode::Ack, "update request")?;

        let size_request = Packet::control(Opcode::FwSizeRequest, &size.to_le_bytes()).map_err(UpdateError::Packet)?;
        self.send(&size_request)?;
        self.expect(Opcode::Ack, "firmware size")?;

        let blocks = package.len() / PAYLOAD_SIZE;
        for (idx, block) in package.chunks(PAYLOAD_SIZE).enumerate() {
            self.send(&Packet::data(block).map_err(UpdateError::Packet)?)?;
            if idx + 1 < blocks {
                self.expect(Opcode::Ack, "firmware block")?;
            } else {
                self.expect(Opcode::FwUpdateDone, "last firmware block")?;
            }
            if idx % 256 == 0 {
                tracing::info!("sent {}/{} blocks", idx + 1, blocks);
            }
        }
        tracing::info!("update done, {} bytes sent", package.len());
        Ok(())
    }

    /// Send the sync sequence until the device answers with `SYNCED`.
    fn sync(&mut self) -> Result<(), UpdateError> {
        let start = Instant::now();
        while start.elapsed() < self.sync_timeout {
            tracing::debug!("sending sync sequence");
            self.port.write_all(&SYNC_SEQUENCE)?;
            self.port.flush()?;

            if let Some(synced) = self.scan_synced(SYNC_RETRY)? {
                let found = synced.args()[0];
                if found != self.device_id {
                    return Err(UpdateError::WrongDevice {
                        expected: self.device_id,
                        found,
                    });
                }
                tracing::info!("device {:#04x} synced", found);
                return Ok(());
            }
        }
        Err(UpdateError::NoSync)
    }

    /// Look for a `SYNCED` packet anywhere in the input. Whatever the device
    /// printed before it is skipped.
    fn scan_synced(&mut self, timeout: Duration) -> Result<Option<Packet>, UpdateError> {
        let deadline = Instant::now() + timeout;
        loop {
            while self.rx.len() >= PACKET_SIZE {
                let packet = Packet::from_bytes(&self.head());
                if packet.is_valid() && packet.is_control(Opcode::Synced, 2) {
                    self.rx.drain(..PACKET_SIZE);
                    return Ok(Some(packet));
                }
                self.rx.remove(0);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    fn head(&self) -> [u8; PACKET_SIZE] {
        let mut raw = [0; PACKET_SIZE];
        raw.copy_from_slice(&self.rx[..PACKET_SIZE]);
        raw
    }

    fn fill(&mut self) -> Result<(), UpdateError> {
        let mut buf = [0; 64];
        match self.port.read(&mut buf) {
            Ok(n) => self.rx.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn transmit(&mut self, packet: &Packet) -> Result<(), UpdateError> {
        self.port.write_all(&packet.to_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn send(&mut self, packet: &Packet) -> Result<(), UpdateError> {
        self.last_tx = Some(*packet);
        self.transmit(packet)
    }

    /// Next valid packet from the device, serving retransmission requests in
    /// both directions on the way.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Packet>, UpdateError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.rx.len() >= PACKET_SIZE {
                let packet = Packet::from_bytes(&self.head());
                self.rx.drain(..PACKET_SIZE);

                if !packet.is_valid() {
                    tracing::warn!("corrupted reply, asking for retransmission");
                    self.transmit(&Packet::retransmit())?;
                    continue;
                }
                if packet == Packet::retransmit() {
                    if let Some(last) = self.last_tx {
                        tracing::debug!("device asked for retransmission");
                        self.transmit(&last)?;
                    }
                    continue;
                }
                return Ok(Some(packet));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    fn expect(&mut self, opcode: Opcode, step: &'static str) -> Result<(), UpdateError> {
        let packet = self.receive(self.reply_timeout)?.ok_or(UpdateError::Timeout(step))?;
        if packet.is_control(opcode, 1) {
            return Ok(());
        }
        if packet.opcode() == Some(Opcode::Nack) {
            return Err(UpdateError::Nack(step));
        }
        Err(UpdateError::UnexpectedReply { step, packet })
    }
}
