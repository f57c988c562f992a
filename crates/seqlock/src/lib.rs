//! # Seqlock
//!
//! A single-writer / multi-reader optimistic lock (sequence lock) around a
//! value `T`, used by the UndertowKV engine to protect its index as one
//! logical value.
//!
//! A 64-bit version counter encodes the protocol: even means idle, odd means
//! a write is in progress. The writer increments the counter to odd, mutates
//! `T`, then publishes the even successor. Readers snapshot the counter, run
//! their closure speculatively, and retry whenever the counter was odd or
//! changed underneath them.
//!
//! ## Progress
//!
//! The writer is wait-free: a bounded number of steps, no loops. Readers are
//! lock-free but **not** wait-free — under sustained write contention a read
//! may retry unboundedly. The odd-version spin emits
//! [`std::hint::spin_loop`] to reduce bus contention.
//!
//! ## Torn reads
//!
//! The reader closure runs while a writer may be mid-mutation, so it can
//! observe a half-updated `T`. Its result is only returned after the version
//! check proves no write overlapped; until then the closure must confine
//! itself to state that is safe to read torn. The engine's index satisfies
//! this: every offset a reader can observe is either a benign sentinel or
//! points at an immutable, fully-written arena record.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Sequence lock over `T`.
///
/// At most one thread may be inside [`SeqLock::write`] at a time; that
/// discipline is the caller's responsibility (a dedicated writer thread or
/// an external lock) and is `debug_assert!`ed, not enforced.
pub struct SeqLock<T> {
    seq: AtomicU64,
    data: UnsafeCell<T>,
}

// Readers dereference `data` concurrently with the single writer; the
// even/odd protocol plus the acquire/release edges below make that sound
// for the caller who honors the single-writer contract.
unsafe impl<T: Send> Send for SeqLock<T> {}
unsafe impl<T: Send> Sync for SeqLock<T> {}

impl<T> SeqLock<T> {
    /// Wraps `value` with the counter at 0 (idle).
    pub const fn new(value: T) -> Self {
        Self {
            seq: AtomicU64::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Optimistic read transaction; returns `f`'s result once a consistent
    /// snapshot is proven.
    ///
    /// `f` may run several times and must tolerate a torn `T` (see the
    /// module docs); only the run whose bracketing version loads agree is
    /// returned.
    pub fn read<R>(&self, mut f: impl FnMut(&T) -> R) -> R {
        loop {
            let v1 = self.seq.load(Ordering::Acquire);
            if v1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let result = f(unsafe { &*self.data.get() });

            // Keeps the v2 load from sinking above the reader's loads on
            // weakly ordered hardware.
            fence(Ordering::Acquire);

            let v2 = self.seq.load(Ordering::Relaxed);
            if v1 == v2 {
                return result;
            }
        }
    }

    /// Exclusive write transaction.
    ///
    /// Flips the counter odd, applies `f`, then publishes the even
    /// successor with release semantics so every mutation is visible before
    /// the new version. Concurrent writers are a programming error.
    pub fn write(&self, f: impl FnOnce(&mut T)) {
        let prev = self.seq.fetch_add(1, Ordering::AcqRel);
        debug_assert!(
            prev & 1 == 0,
            "concurrent writers detected; the seqlock requires external write serialization"
        );

        f(unsafe { &mut *self.data.get() });

        self.seq.store(prev + 2, Ordering::Release);
    }

    /// Direct access when the caller holds `&mut self` — no other thread can
    /// observe the value, so no versioning is needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Unwraps the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Current version: even when idle, and advancing by 2 per completed
    /// write, so `version() / 2` counts writes.
    pub fn version(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }
}
