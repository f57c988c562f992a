//! # Store — the UndertowKV orchestrator
//!
//! An embedded, in-process key–value store built for predictable
//! sub-microsecond tail latency: O(1) writes, wait-free-validated optimistic
//! reads, and no traffic through the general-purpose heap on the data path.
//!
//! The store owns one [`arena::Arena`] (append-only storage plane) and one
//! [`index::Index`] behind a [`seqlock::SeqLock`] (whole-index optimistic
//! concurrency). The three are co-designed: the arena's append-only
//! discipline is what lets a reader safely dereference an offset observed in
//! an earlier index generation, the index's fixed-width slots are what make
//! a whole-index seqlock viable, and the seqlock's ordering is what lets
//! readers tolerate in-flight index mutation without blocking.
//!
//! ## Data flow
//!
//! ```text
//! put: hash → arena.alloc → write record → seqlock.write { find → update }
//! get: hash → seqlock.read { find → deref record → copy value out }
//! ```
//!
//! The record memcpy happens *outside* the write transaction — records are
//! immutable once written, so the version-incrementing critical section
//! shrinks to a single 16-byte slot store and readers rarely retry.
//!
//! ## Concurrency contract
//!
//! Any number of threads may call [`Store::get`] concurrently with each
//! other and with the single writer. At most one thread may be inside
//! [`Store::put`] or [`Store::delete`] at a time; that serialization is the
//! caller's responsibility (dedicated writer thread, mutex, or sequencer)
//! and is debug-asserted, not enforced.
//!
//! ## What this store does not do
//!
//! No durability, no reclamation, no resizing of arena or index, no
//! iteration, no cross-key atomicity. Repeated overwrites of a key each
//! consume a fresh arena record; that unbounded growth is the documented
//! price of reader safety.

mod entry;

pub use arena::ArenaError;
pub use entry::{record_size, round_up_8, EntryHeader, HEADER_BYTES};

use arena::Arena;
use index::{fnv1a, hash_tag, Index, Slot};
use seqlock::SeqLock;
use std::slice;
use thiserror::Error;

/// Longest accepted key, in bytes.
pub const MAX_KEY: usize = 255;
/// Longest accepted value, in bytes.
pub const MAX_VALUE: usize = 65_535;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Key exceeds [`MAX_KEY`]; nothing was mutated.
    #[error("key length {0} exceeds the 255-byte limit")]
    KeyTooLong(usize),
    /// Value exceeds [`MAX_VALUE`]; nothing was mutated.
    #[error("value length {0} exceeds the 65535-byte limit")]
    ValueTooLong(usize),
    /// The arena could not service the allocation. Permanent for this
    /// store: the bump cursor never rolls back.
    #[error("arena out of space")]
    ArenaFull,
    /// Normal outcome for absent keys, not a failure.
    #[error("key not found")]
    NotFound,
}

/// Sizing knobs for [`Store::with_config`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Arena capacity in bytes (one anonymous mapping of exactly this size).
    pub arena_bytes: u64,
    /// Requested index slot count; rounded up to a power of two, minimum 8.
    /// Provision at least 2× the expected item count — the index never
    /// rehashes, and probe chains stay short only while the load factor is
    /// well below 0.5.
    pub slot_count: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            arena_bytes: 64 * 1024 * 1024,
            slot_count: 1 << 16,
        }
    }
}

impl StoreConfig {
    pub fn with_arena_bytes(mut self, arena_bytes: u64) -> Self {
        self.arena_bytes = arena_bytes;
        self
    }

    pub fn with_slot_count(mut self, slot_count: u32) -> Self {
        self.slot_count = slot_count;
        self
    }
}

/// Point-in-time occupancy counters, for capacity planning and tests.
///
/// Taking a snapshot opens a read transaction over the index, so the slot
/// counts are internally consistent; `arena_used` is sampled separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub arena_used: u32,
    pub arena_capacity: u32,
    pub live_slots: u32,
    pub tombstones: u32,
    pub slot_capacity: u32,
}

/// The public embedding surface: `put`, `get`, `delete`.
///
/// `Store` owns a single OS mapping and is therefore not clonable; share it
/// across reader threads behind an `Arc`. All methods take `&self`.
pub struct Store {
    arena: Arena,
    index: SeqLock<Index>,
}

impl Store {
    /// Creates a store with an `arena_bytes` storage plane and `slot_count`
    /// index slots (rounded up to a power of two, minimum 8).
    ///
    /// Exactly one OS allocation is made, and it is released on drop.
    pub fn create(arena_bytes: u64, slot_count: u32) -> Result<Self, ArenaError> {
        let arena = Arena::create(arena_bytes)?;
        Ok(Self {
            arena,
            index: SeqLock::new(Index::new(slot_count)),
        })
    }

    /// [`Store::create`] driven by a [`StoreConfig`].
    pub fn with_config(config: &StoreConfig) -> Result<Self, ArenaError> {
        Self::create(config.arena_bytes, config.slot_count)
    }

    /// Inserts or overwrites `key`.
    ///
    /// Length limits are checked before any state changes. An overwrite
    /// appends a fresh record and repoints the existing slot; the shadowed
    /// record stays readable for the process lifetime, which is what keeps
    /// concurrent readers of the old value safe.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyTooLong`] / [`StoreError::ValueTooLong`] before any
    /// mutation, [`StoreError::ArenaFull`] when the arena cannot hold the
    /// record (the index is untouched in that case).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if key.len() > MAX_KEY {
            return Err(StoreError::KeyTooLong(key.len()));
        }
        if value.len() > MAX_VALUE {
            return Err(StoreError::ValueTooLong(value.len()));
        }

        let h = fnv1a(key);
        let needed = entry::record_size(key.len(), value.len()) as u32;
        let offset = self.arena.alloc(needed).map_err(|_| StoreError::ArenaFull)?;

        // Write the full record before the index can reference it. Keeping
        // the memcpy outside the write transaction leaves a single slot
        // store inside it.
        unsafe {
            let rec = slice::from_raw_parts_mut(self.arena.ptr_at(offset), needed as usize);
            entry::write_header(
                rec,
                EntryHeader {
                    klen: key.len() as u16,
                    vlen: value.len() as u16,
                    hash: h,
                },
            );
            rec[HEADER_BYTES..HEADER_BYTES + key.len()].copy_from_slice(key);
            rec[HEADER_BYTES + key.len()..HEADER_BYTES + key.len() + value.len()]
                .copy_from_slice(value);
        }

        self.index.write(|idx| {
            let (slot_idx, _) = idx.find(h, key.len() as u8, |s| self.key_matches(s, h, key));
            // update is correct for both a hit (overwrite in place) and a
            // miss (claim the empty or recycled-tombstone candidate), so the
            // found flag is irrelevant here.
            idx.update(
                slot_idx,
                hash_tag(h),
                key.len() as u8,
                value.len() as u16,
                offset,
            );
        });

        Ok(())
    }

    /// Looks up `key`, copying its value into `out`.
    ///
    /// `out` is cleared and overwritten. The copy completes inside the read
    /// transaction: a snapshot is only surfaced once the closing version
    /// check proves no write overlapped it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`]; readers surface nothing else.
    pub fn get(&self, key: &[u8], out: &mut Vec<u8>) -> Result<(), StoreError> {
        if key.len() > MAX_KEY {
            return Err(StoreError::NotFound);
        }
        let h = fnv1a(key);

        let found = self.index.read(|idx| {
            let (slot_idx, found) = idx.find(h, key.len() as u8, |s| self.key_matches(s, h, key));
            if !found {
                return false;
            }
            let s = idx.slot(slot_idx);
            let p = self.arena.ptr_at(s.offset);
            let hdr = entry::read_header(unsafe { slice::from_raw_parts(p, HEADER_BYTES) });
            let vstart = HEADER_BYTES + usize::from(hdr.klen);
            let value = unsafe { slice::from_raw_parts(p.add(vstart), usize::from(hdr.vlen)) };
            out.clear();
            out.extend_from_slice(value);
            true
        });

        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Logically deletes `key` by tombstoning its slot.
    ///
    /// The record's arena bytes are not reclaimed, and the slot never
    /// returns to empty — both are load-bearing for concurrent readers.
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        if key.len() > MAX_KEY {
            return Err(StoreError::NotFound);
        }
        let h = fnv1a(key);

        let mut found = false;
        self.index.write(|idx| {
            let (slot_idx, hit) = idx.find(h, key.len() as u8, |s| self.key_matches(s, h, key));
            if hit {
                idx.mark_tombstone(slot_idx);
                found = true;
            }
        });

        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> StoreStats {
        let (live_slots, tombstones, slot_capacity) = self.index.read(|idx| {
            let (live, tombs) = idx.occupancy();
            (live, tombs, idx.capacity())
        });
        StoreStats {
            arena_used: self.arena.used(),
            arena_capacity: self.arena.capacity(),
            live_slots,
            tombstones,
            slot_capacity,
        }
    }

    /// Deep key compare against the record behind a candidate slot.
    ///
    /// The header is read first and the stored key is only dereferenced when
    /// the recorded length matches, so the compare never reads past the end
    /// of a shorter record.
    fn key_matches(&self, s: &Slot, h: u32, key: &[u8]) -> bool {
        if !s.is_valid() {
            return false;
        }
        let p = self.arena.ptr_at(s.offset);
        let hdr = entry::read_header(unsafe { slice::from_raw_parts(p, HEADER_BYTES) });
        if hdr.hash != h || usize::from(hdr.klen) != key.len() {
            return false;
        }
        let stored = unsafe { slice::from_raw_parts(p.add(HEADER_BYTES), key.len()) };
        stored == key
    }
}
