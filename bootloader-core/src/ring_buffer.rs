// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed-capacity byte queue for one producer and one consumer.
//!
//! The UART receive interrupt pushes, the foreground pops, without locks: the
//! producer only moves `write`, the consumer only moves `read`. Indices wrap
//! with a mask, so `N` has to be a power of two. One slot stays unused to tell
//! full from empty, leaving `N - 1` usable bytes.
//!
//! Pushing and popping through a shared reference is only possible with the
//! [`Producer`] and [`Consumer`] handles from [`RingBuffer::split`], which
//! borrows the buffer mutably, so there is never more than one of each.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Returned by [`Producer::push`] when there is no free slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Full(pub u8);

pub struct RingBuffer<const N: usize> {
    write: AtomicUsize,
    read: AtomicUsize,
    buf: UnsafeCell<[u8; N]>,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring buffer capacity must be a power of two");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            buf: UnsafeCell::new([0; N]),
        }
    }

    /// Number of bytes the buffer can hold.
    pub const fn capacity(&self) -> usize {
        Self::MASK
    }

    pub fn is_empty(&self) -> bool {
        self.write.load(Ordering::Acquire) == self.read.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        (self.write.load(Ordering::Acquire) + 1) & Self::MASK == self.read.load(Ordering::Acquire)
    }

    /// Bytes waiting to be popped.
    pub fn len(&self) -> usize {
        self.write
            .load(Ordering::Acquire)
            .wrapping_sub(self.read.load(Ordering::Acquire))
            & Self::MASK
    }

    /// Free slots.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Hand out the two ends of the queue, for use from different contexts.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        (
            Producer {
                rb: &*self,
                _not_sync: PhantomData,
            },
            Consumer {
                rb: &*self,
                _not_sync: PhantomData,
            },
        )
    }

    /// Fails without touching stored data when full.
    pub fn push(&mut self, byte: u8) -> Result<(), Full> {
        self.split().0.push(byte)
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.split().1.pop()
    }

    /// Push as many bytes as fit, returns how many were pushed.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.split().0.write(data)
    }

    /// Pop up to `data.len()` bytes, returns how many were popped.
    pub fn read(&mut self, data: &mut [u8]) -> usize {
        self.split().1.read(data)
    }

    /// # Safety
    ///
    /// No other call to `enqueue` on this buffer may run at the same time.
    unsafe fn enqueue(&self, byte: u8) -> Result<(), Full> {
        let write = self.write.load(Ordering::Relaxed);
        let next = (write + 1) & Self::MASK;
        if next == self.read.load(Ordering::Acquire) {
            return Err(Full(byte));
        }
        // SAFETY: the caller is the only producer, and the consumer does not
        // read the slot at `write` until `write` is published below.
        unsafe { (*self.buf.get())[write] = byte };
        self.write.store(next, Ordering::Release);
        Ok(())
    }

    /// # Safety
    ///
    /// No other call to `dequeue` on this buffer may run at the same time.
    unsafe fn dequeue(&self) -> Option<u8> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the slot at `read` was published by the producer and is not
        // reused until `read` moves past it below.
        let byte = unsafe { (*self.buf.get())[read] };
        self.read.store((read + 1) & Self::MASK, Ordering::Release);
        Some(byte)
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: a shared reference only reaches the atomics. The buffer itself is
// touched by `enqueue` and `dequeue`, which need a `&mut` borrow or one of the
// two handles from `split`.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

/// Writing end of a [`RingBuffer`].
pub struct Producer<'a, const N: usize> {
    rb: &'a RingBuffer<N>,
    // May move to another context, but is never used from two at once.
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl<const N: usize> Producer<'_, N> {
    /// Fails without touching stored data when full.
    pub fn push(&mut self, byte: u8) -> Result<(), Full> {
        // SAFETY: `split` hands out one producer per mutable borrow, and
        // `&mut self` keeps it from pushing twice at once.
        unsafe { self.rb.enqueue(byte) }
    }

    /// Push as many bytes as fit, returns how many were pushed.
    pub fn write(&mut self, data: &[u8]) -> usize {
        for (written, &byte) in data.iter().enumerate() {
            if self.push(byte).is_err() {
                return written;
            }
        }
        data.len()
    }

    pub fn free(&self) -> usize {
        self.rb.free()
    }
}

/// Reading end of a [`RingBuffer`].
pub struct Consumer<'a, const N: usize> {
    rb: &'a RingBuffer<N>,
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl<const N: usize> Consumer<'_, N> {
    pub fn pop(&mut self) -> Option<u8> {
        // SAFETY: one consumer per mutable borrow, see `Producer::push`.
        unsafe { self.rb.dequeue() }
    }

    /// Pop up to `data.len()` bytes, returns how many were popped.
    pub fn read(&mut self, data: &mut [u8]) -> usize {
        for (count, slot) in data.iter_mut().enumerate() {
            match self.pop() {
                Some(byte) => *slot = byte,
                None => return count,
            }
        }
        data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rb.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rb.len()
    }
}
