//! # Arena
//!
//! A fixed-capacity, contiguous memory region served by a monotonic bump
//! allocator, used as the storage plane of the UndertowKV engine.
//!
//! The arena is one anonymous, private, zero-filled OS mapping requested once
//! at creation and released once at drop. Allocation is a single atomic
//! `fetch_add` on a cursor; there is no free list, no metadata, and no
//! reclamation. Offsets are 32-bit and stable for the lifetime of the arena,
//! which is what lets concurrent readers dereference an offset they observed
//! in an earlier index generation.
//!
//! Offset 0 is reserved: the usable region starts at [`BASE_OFFSET`] so that
//! a zero-initialized slot elsewhere in the system can never be mistaken for
//! a pointer to a real record, and so the first record is 8-byte aligned.

use memmap2::{MmapMut, MmapOptions};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// First offset handed out by [`Arena::alloc`]. Bytes `0..8` are never used.
pub const BASE_OFFSET: u32 = 8;

#[derive(Debug, Error)]
pub enum ArenaError {
    /// Requested capacity does not fit the 32-bit offset space.
    #[error("requested capacity {0} bytes exceeds the 32-bit offset space")]
    TooLarge(u64),
    /// The OS refused the anonymous mapping.
    #[error("anonymous mapping failed: {0}")]
    MapFailed(#[from] io::Error),
    /// The allocation cursor ran past the end of the region.
    #[error("arena out of space")]
    OutOfSpace,
}

/// A bump-allocated, memory-mapped byte region.
///
/// `alloc` may be called from any thread and is self-consistent under
/// contention, though the engine drives it from a single writer. `ptr_at` is
/// a pure function of the (immutable after creation) base address and is
/// callable from any thread.
pub struct Arena {
    /// Keeps the mapping alive; `base` points into it.
    _map: MmapMut,
    base: *mut u8,
    capacity: u32,
    /// 64-bit so that a run of failed allocations can keep advancing without
    /// ever wrapping back into the valid offset range.
    cursor: AtomicU64,
}

// The raw base pointer targets a mapping owned by this struct. Mutation
// through it is governed by the callers' single-writer discipline; the
// cursor itself is atomic.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Maps a contiguous region of exactly `size_bytes` bytes.
    ///
    /// The mapping is anonymous, private, read/write, and zero-filled on
    /// first touch. Fails with [`ArenaError::TooLarge`] when `size_bytes`
    /// cannot be addressed by a 32-bit offset, and with
    /// [`ArenaError::MapFailed`] when the OS refuses the mapping.
    pub fn create(size_bytes: u64) -> Result<Self, ArenaError> {
        if size_bytes > u64::from(u32::MAX) {
            return Err(ArenaError::TooLarge(size_bytes));
        }
        let mut map = MmapOptions::new().len(size_bytes as usize).map_anon()?;
        let base = map.as_mut_ptr();
        Ok(Self {
            _map: map,
            base,
            capacity: size_bytes as u32,
            cursor: AtomicU64::new(u64::from(BASE_OFFSET)),
        })
    }

    /// Advances the cursor by exactly `nbytes` and returns the old position.
    ///
    /// The caller passes an already rounded-up (8-byte aligned) size. On
    /// exhaustion the cursor is **not** rolled back: every later call keeps
    /// failing, which is the engine's documented capacity-error contract.
    pub fn alloc(&self, nbytes: u32) -> Result<u32, ArenaError> {
        let old = self.cursor.fetch_add(u64::from(nbytes), Ordering::AcqRel);
        if old + u64::from(nbytes) > u64::from(self.capacity) {
            return Err(ArenaError::OutOfSpace);
        }
        Ok(old as u32)
    }

    /// Resolves an offset to a raw address: `base + offset`.
    ///
    /// No bounds check in release builds. Passing an offset that was not
    /// returned by [`alloc`] is a programming error.
    #[inline]
    pub fn ptr_at(&self, offset: u32) -> *mut u8 {
        debug_assert!(
            offset < self.capacity,
            "offset {offset} out of range (capacity {})",
            self.capacity
        );
        unsafe { self.base.add(offset as usize) }
    }

    /// Total size of the mapped region in bytes.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes consumed so far, including the reserved prefix. Saturates at
    /// `capacity` once the arena is exhausted.
    pub fn used(&self) -> u32 {
        self.cursor.load(Ordering::Relaxed).min(u64::from(self.capacity)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    // -------------------- Creation --------------------

    #[test]
    fn create_reserves_base_offset() {
        let a = Arena::create(4096).unwrap();
        assert_eq!(a.used(), BASE_OFFSET);
        assert_eq!(a.alloc(8).unwrap(), BASE_OFFSET);
    }

    #[test]
    fn create_rejects_capacity_beyond_u32() {
        match Arena::create(1 << 33) {
            Err(ArenaError::TooLarge(n)) => assert_eq!(n, 1 << 33),
            other => panic!("expected TooLarge, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn capacity_is_exact() {
        let a = Arena::create(64).unwrap();
        assert_eq!(a.capacity(), 64);
    }

    // -------------------- Allocation --------------------

    #[test]
    fn alloc_is_monotonic() {
        let a = Arena::create(4096).unwrap();
        let o1 = a.alloc(16).unwrap();
        let o2 = a.alloc(24).unwrap();
        let o3 = a.alloc(8).unwrap();
        assert_eq!(o2, o1 + 16);
        assert_eq!(o3, o2 + 24);
    }

    #[test]
    fn alloc_fails_past_capacity() {
        let a = Arena::create(64).unwrap();
        // 56 usable bytes after the reserved prefix.
        assert!(a.alloc(56).is_ok());
        assert!(matches!(a.alloc(8), Err(ArenaError::OutOfSpace)));
    }

    #[test]
    fn exhaustion_is_permanent() {
        let a = Arena::create(64).unwrap();
        assert!(a.alloc(64).is_err());
        for _ in 0..1000 {
            assert!(matches!(a.alloc(8), Err(ArenaError::OutOfSpace)));
        }
        assert_eq!(a.used(), a.capacity());
    }

    #[test]
    fn failed_allocs_never_wrap_back_into_range() {
        let a = Arena::create(64).unwrap();
        // Burn through more than 2^32 bytes of failed requests; a 32-bit
        // cursor would wrap and start handing out live offsets again.
        for _ in 0..3 {
            assert!(a.alloc(u32::MAX).is_err());
        }
        assert!(a.alloc(8).is_err());
    }

    // -------------------- Resolution --------------------

    #[test]
    fn ptr_at_round_trips_bytes() {
        let a = Arena::create(4096).unwrap();
        let off = a.alloc(16).unwrap();
        unsafe {
            let p = a.ptr_at(off);
            p.write(0xAB);
            p.add(15).write(0xCD);
            assert_eq!(*a.ptr_at(off), 0xAB);
            assert_eq!(*a.ptr_at(off + 15), 0xCD);
        }
    }

    #[test]
    fn mapping_is_zero_filled() {
        let a = Arena::create(4096).unwrap();
        let off = a.alloc(64).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(a.ptr_at(off), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    // -------------------- Concurrency --------------------

    #[test]
    fn concurrent_allocs_are_disjoint() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let a = Arc::new(Arena::create(1 << 20).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let a = Arc::clone(&a);
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| a.alloc(8).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut offsets: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), THREADS * PER_THREAD);
    }
}
