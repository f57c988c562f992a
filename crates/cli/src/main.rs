//! Integrity-check driver for the UndertowKV engine.
//!
//! Runs the put / overwrite / delete / tombstone-recycle lifecycle against a
//! freshly created store and reports the resulting occupancy, exiting
//! non-zero on the first contract violation.

use anyhow::{ensure, Context, Result};
use store::{Store, StoreError};

fn main() -> Result<()> {
    // 64 MB arena, 1024 index slots.
    let store =
        Store::create(64 * 1024 * 1024, 1024).context("store initialization failed")?;
    let mut val = Vec::new();

    // Basic put/get.
    store.put(b"user:1001", b"balance:5000")?;
    store.get(b"user:1001", &mut val)?;
    ensure!(val == b"balance:5000", "round-trip returned {val:?}");

    // Overwrite appends a new record and repoints the slot.
    store.put(b"user:1001", b"balance:4500")?;
    store.get(b"user:1001", &mut val)?;
    ensure!(val == b"balance:4500", "overwrite returned {val:?}");

    // Delete tombstones the slot.
    store.delete(b"user:1001")?;
    ensure!(
        store.get(b"user:1001", &mut val) == Err(StoreError::NotFound),
        "deleted key still resolves"
    );

    // Re-insert recycles the tombstoned slot.
    store.put(b"user:1001", b"balance:0")?;
    store.get(b"user:1001", &mut val)?;
    ensure!(val == b"balance:0", "reinsert returned {val:?}");

    let stats = store.stats();
    ensure!(stats.live_slots == 1 && stats.tombstones == 0, "slot not recycled");

    println!(
        "undertow integrity check: PASSED ({} of {} arena bytes, {} of {} slots live)",
        stats.arena_used, stats.arena_capacity, stats.live_slots, stats.slot_capacity
    );
    Ok(())
}
