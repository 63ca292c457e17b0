//! Task-local and shared memory pools: `GETMAIN`/`FREEMAIN` (§4.2).
//!
//! Both pools are bounded, slot-based allocators: a `getmain` scans for a
//! freed (null) slot before growing, and a `freemain` nulls the slot it
//! finds. Allocations are boxed slices so their address is stable even
//! while the slot vector itself grows — the pointer a `GETMAIN` hands back
//! to an artifact stays valid for the lifetime of the allocation, exactly
//! as the design requires ("the monitor reads/writes in place but never
//! reallocates", §3).

use crate::error::{Error, Result};
use std::sync::Mutex;

/// A bounded, slot-reusing allocator. Used directly for the task-local
/// pool (no synchronization needed — only the owning task ever touches
/// it) and wrapped in a [`Mutex`] for the shared arena.
pub struct MemoryPool {
    capacity: usize,
    slots: Vec<Option<Box<[u8]>>>,
}

impl MemoryPool {
    pub fn new(capacity: usize) -> Self {
        MemoryPool { capacity, slots: Vec::new() }
    }

    /// Allocates `length` bytes, optionally filled with `init_byte`
    /// (`INITIMG`, §4.6 GETMAIN). Fails if the pool is at capacity.
    pub fn getmain(&mut self, length: usize, init_byte: Option<u8>) -> Result<*mut u8> {
        if length == 0 {
            return Err(Error::InvalidLength("getmain length must be non-zero"));
        }
        let idx = match self.slots.iter().position(Option::is_none) {
            Some(i) => i,
            None => {
                if self.slots.len() >= self.capacity {
                    return Err(Error::CapacityExceeded("memory pool"));
                }
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let mut buf = vec![init_byte.unwrap_or(0); length].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        self.slots[idx] = Some(buf);
        Ok(ptr)
    }

    /// Releases the allocation backing `ptr`, returning its original
    /// length. Fails if `ptr` was not allocated from this pool.
    pub fn freemain(&mut self, ptr: *mut u8) -> Result<usize> {
        for slot in self.slots.iter_mut() {
            if let Some(buf) = slot {
                if buf.as_mut_ptr() == ptr {
                    let len = buf.len();
                    *slot = None;
                    return Ok(len);
                }
            }
        }
        Err(Error::UnknownPointer)
    }

    /// Number of live (non-null) slots. Used by tests to assert the pool
    /// returns to its starting high-water mark after matched get/free
    /// pairs (§8 universal property 2).
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// The process-wide shared arena, allocated once at monitor start and
/// mutex-guarded across every task.
pub struct SharedArena {
    pool: Mutex<MemoryPool>,
}

impl SharedArena {
    pub fn new(capacity: usize) -> Self {
        SharedArena { pool: Mutex::new(MemoryPool::new(capacity)) }
    }

    pub fn getmain(&self, length: usize, init_byte: Option<u8>) -> Result<*mut u8> {
        self.pool.lock().expect("shared arena mutex poisoned").getmain(length, init_byte)
    }

    pub fn freemain(&self, ptr: *mut u8) -> Result<usize> {
        self.pool.lock().expect("shared arena mutex poisoned").freemain(ptr)
    }
}

// SAFETY: the only contents of `MemoryPool` are owned `Box<[u8]>` buffers;
// raw pointers handed out reference those buffers and are never read
// concurrently from within this type itself — callers serialize access
// to the bytes through the enqueue manager or their own task ownership.
unsafe impl Send for SharedArena {}
unsafe impl Sync for SharedArena {}
