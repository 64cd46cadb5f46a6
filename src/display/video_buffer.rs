//! Lock-free "latest frame" handoff between the dispatch loop and the presenter
//!
//! The triple buffer keeps three slots:
//! - **Write slot**: owned by the producer while it fills the next frame
//! - **Back slot**: the most recently committed frame, not yet picked up
//! - **Read slot**: owned by the consumer while it presents a frame
//!
//! Committing swaps the write slot with the back slot; reading swaps the back
//! slot with the read slot when it holds a newer frame. A frame committed
//! while the previous one is still in the back slot replaces it, so a slow
//! consumer always sees the newest frame and the producer never waits.
//!
//! # Safety
//!
//! The back slot index and the "new frame" flag live in a single atomic word,
//! so each swap hands a slot over in one step. Each slot index is held by
//! exactly one of write, back and read at any time, the write index is only
//! touched by the producer and the read index only by the consumer. Both
//! sides are single-threaded: one producer and one consumer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::FrameSink;
use crate::decoder::VideoFrame;

const INDEX_MASK: usize = 0b11;
const NEW_FRAME: usize = 0b100;

/// Single-producer single-consumer triple buffer
pub struct TripleBuffer<T> {
    slots: [UnsafeCell<T>; 3],

    /// Slot the producer writes into
    write_idx: AtomicUsize,

    /// Back slot index, or-ed with `NEW_FRAME` when it holds an unread commit
    back: AtomicUsize,

    /// Slot the consumer reads from
    read_idx: AtomicUsize,

    /// Commits that replaced a frame the consumer never saw
    overwritten: AtomicU64,
}

// Safety: slots are handed between threads only through the atomic swaps above
unsafe impl<T: Send> Send for TripleBuffer<T> {}
// Safety: see module docs, each slot is accessed by one side at a time
unsafe impl<T: Send> Sync for TripleBuffer<T> {}

impl<T> TripleBuffer<T> {
    /// Create a new triple buffer with slots initialized by the given function
    pub fn new<F>(mut init_fn: F) -> Self
    where
        F: FnMut() -> T,
    {
        Self {
            slots: [
                UnsafeCell::new(init_fn()),
                UnsafeCell::new(init_fn()),
                UnsafeCell::new(init_fn()),
            ],
            write_idx: AtomicUsize::new(0),
            back: AtomicUsize::new(1),
            read_idx: AtomicUsize::new(2),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Get a write guard for the next frame
    ///
    /// The frame is published when the guard is dropped.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let idx = self.write_idx.load(Ordering::Relaxed);
        WriteGuard {
            buffer: self,
            slot: idx,
        }
    }

    /// Get a read guard on the newest committed frame
    ///
    /// Picks up the back slot first if it holds an unread commit; otherwise
    /// the previously read frame is returned again.
    pub fn read(&self) -> ReadGuard<'_, T> {
        if self.back.load(Ordering::Acquire) & NEW_FRAME != 0 {
            let read_idx = self.read_idx.load(Ordering::Relaxed);
            let previous = self.back.swap(read_idx, Ordering::AcqRel);
            self.read_idx
                .store(previous & INDEX_MASK, Ordering::Relaxed);
        }

        let idx = self.read_idx.load(Ordering::Relaxed);
        ReadGuard {
            buffer: self,
            slot: idx,
        }
    }

    /// Check if a new frame is available
    pub fn has_new_frame(&self) -> bool {
        self.back.load(Ordering::Acquire) & NEW_FRAME != 0
    }

    /// Number of committed frames replaced before the consumer picked them up
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// # Safety
    ///
    /// Caller must hold the slot at `idx` as its write or read slot.
    unsafe fn slot(&self, idx: usize) -> &T {
        unsafe { &*self.slots[idx].get() }
    }

    /// # Safety
    ///
    /// Caller must hold the slot at `idx` as its write slot.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, idx: usize) -> &mut T {
        unsafe { &mut *self.slots[idx].get() }
    }

    fn commit_write(&self) {
        let write_idx = self.write_idx.load(Ordering::Relaxed);
        let previous = self.back.swap(write_idx | NEW_FRAME, Ordering::AcqRel);
        self.write_idx
            .store(previous & INDEX_MASK, Ordering::Relaxed);

        if previous & NEW_FRAME != 0 {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Write guard, publishes the slot on drop
pub struct WriteGuard<'a, T> {
    buffer: &'a TripleBuffer<T>,
    slot: usize,
}

impl<'a, T> WriteGuard<'a, T> {
    /// Publish the frame
    pub fn commit(self) {
        // commit happens in drop
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        self.buffer.commit_write();
    }
}

impl<'a, T> std::ops::Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: the guard holds the write slot
        unsafe { self.buffer.slot(self.slot) }
    }
}

impl<'a, T> std::ops::DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: the guard holds the write slot exclusively
        unsafe { self.buffer.slot_mut(self.slot) }
    }
}

/// Read guard on the consumer's slot
pub struct ReadGuard<'a, T> {
    buffer: &'a TripleBuffer<T>,
    slot: usize,
}

impl<'a, T> std::ops::Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: the guard holds the read slot
        unsafe { self.buffer.slot(self.slot) }
    }
}

impl FrameSink for TripleBuffer<VideoFrame> {
    fn deliver(&self, frame: VideoFrame) {
        let mut slot = self.write();
        *slot = frame;
    }
}
