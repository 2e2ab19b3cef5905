//! Fixed set of reusable staging buffers.
//!
//! Idle slot indices live in a bounded channel: `acquire` blocks on it until a
//! slot is released, so the number of slots in use can never exceed the pool
//! capacity. A `SlotGuard` owns its slot until dropped, and dropping it puts
//! the index back whether the batch succeeded or not.

use crate::error::{ConfigError, PoolError};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

struct TransferSlot {
    /// Word storage so the staged bytes can be viewed as `u32` without copying.
    words: Mutex<Box<[u32]>>,
    /// Set between `begin_transfer` and `complete`.
    outstanding: AtomicBool,
}

pub struct TransferBufferPool {
    slots: Box<[TransferSlot]>,
    slot_capacity: usize,
    idle_tx: Sender<usize>,
    idle_rx: Receiver<usize>,
}

impl TransferBufferPool {
    /// Allocate `concurrency` slots that each hold `slot_capacity` staged bytes.
    pub fn new(concurrency: usize, slot_capacity: usize) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        // Room for padding to the next word plus one spare word, so a
        // cross-word read of the final field stays inside the view.
        let words_per_slot = slot_capacity.div_ceil(4) + 1;
        let slots = (0..concurrency)
            .map(|_| TransferSlot {
                words: Mutex::new(vec![0u32; words_per_slot].into_boxed_slice()),
                outstanding: AtomicBool::new(false),
            })
            .collect();

        let (idle_tx, idle_rx) = crossbeam_channel::bounded(concurrency);
        for index in 0..concurrency {
            // Cannot fail: the channel was sized for exactly these sends.
            let _ = idle_tx.send(index);
        }

        Ok(Self {
            slots,
            slot_capacity,
            idle_tx,
            idle_rx,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Bytes one slot accepts.
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    pub fn in_use(&self) -> usize {
        self.capacity() - self.idle()
    }

    /// Take an idle slot, blocking until one is released.
    pub fn acquire(&self) -> Result<SlotGuard<'_>, PoolError> {
        // The pool holds a sender itself, so `recv` only returns once a slot is idle.
        let index = self.idle_rx.recv().map_err(|_| PoolError::Exhausted {
            capacity: self.capacity(),
        })?;
        Ok(self.guard(index))
    }

    /// Take an idle slot without blocking.
    pub fn try_acquire(&self) -> Result<SlotGuard<'_>, PoolError> {
        let index = self.idle_rx.try_recv().map_err(|_| PoolError::Exhausted {
            capacity: self.capacity(),
        })?;
        Ok(self.guard(index))
    }

    fn guard(&self, index: usize) -> SlotGuard<'_> {
        trace!("Acquired transfer slot {}", index);
        SlotGuard {
            pool: self,
            index,
            words: Some(self.slots[index].words.lock()),
        }
    }

    fn release(&self, index: usize) {
        self.slots[index].outstanding.store(false, Ordering::Release);
        let _ = self.idle_tx.send(index);
        trace!("Released transfer slot {}", index);
    }
}

/// Exclusive use of one slot. Returns the slot to the pool on drop.
pub struct SlotGuard<'a> {
    pool: &'a TransferBufferPool,
    index: usize,
    words: Option<MutexGuard<'a, Box<[u32]>>>,
}

impl SlotGuard<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Prepare to stage `len` bytes and return them for the caller to fill.
    ///
    /// The bytes following `len` up to the end of the next word are zeroed.
    /// Fails with `SlotBusy` if the previous transfer on this slot was never
    /// completed.
    pub fn begin_transfer(&mut self, len: usize) -> Result<&mut [u8], PoolError> {
        let slot = &self.pool.slots[self.index];
        if slot.outstanding.swap(true, Ordering::AcqRel) {
            return Err(PoolError::SlotBusy { slot: self.index });
        }
        if len > self.pool.slot_capacity {
            slot.outstanding.store(false, Ordering::Release);
            return Err(PoolError::Overflow {
                len,
                capacity: self.pool.slot_capacity,
            });
        }

        let Some(words) = self.words.as_deref_mut() else {
            return Err(PoolError::SlotBusy { slot: self.index });
        };
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words[..]);
        let padded = (len.div_ceil(4) + 1) * 4;
        bytes[len..padded].fill(0);
        Ok(&mut bytes[..len])
    }

    /// Staged data as words: `len` rounded up to a word, plus one zero word.
    pub fn staged_words(&self, len: usize) -> &[u32] {
        let Some(words) = self.words.as_deref() else {
            return &[];
        };
        &words[..(len.div_ceil(4) + 1).min(words.len())]
    }

    /// Mark the current transfer finished so the slot may be staged again.
    pub fn complete(&mut self) {
        self.pool.slots[self.index]
            .outstanding
            .store(false, Ordering::Release);
    }

    pub fn is_outstanding(&self) -> bool {
        self.pool.slots[self.index].outstanding.load(Ordering::Acquire)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        // Unlock before publishing the index so the next owner never waits on it.
        drop(self.words.take());
        self.pool.release(self.index);
    }
}
