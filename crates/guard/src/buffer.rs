//! Buffers whose logical end sits flush against an inaccessible guard region.

use crate::fill::{fill_ramp, fill_zero, GuardElement};
use crate::platform::{SystemMemory, VirtualMemory};
use std::io;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use tracing::{debug, error};

/// Committed sizes are rounded up to this many bytes.
pub const BUFFER_ALIGNMENT: usize = 64 * 1024;
/// Bytes reserved after the committed range and never made accessible.
pub const GUARD_PADDING: usize = 256 * 1024;

struct Region {
    base: NonNull<u8>,
    reserved: usize,
    committed: usize,
}

impl Region {
    fn guard(&self) -> *mut u8 {
        // SAFETY: `committed < reserved`, so this stays inside the reservation.
        unsafe { self.base.as_ptr().add(self.committed) }
    }
}

/// A reusable window of `T` elements that ends exactly at a guard region.
///
/// Every call to [`acquire`](Self::acquire) places the returned slice at the
/// high end of the committed range, so touching element `len` lands on the
/// guard no matter how much capacity is committed.
pub struct GuardedBuffer<T: GuardElement, M: VirtualMemory = SystemMemory> {
    memory: M,
    region: Option<Region>,
    capacity: usize,
    _marker: PhantomData<T>,
}

// SAFETY: the region is exclusively owned by this value and only reachable
// through `&mut self`.
unsafe impl<T: GuardElement, M: VirtualMemory> Send for GuardedBuffer<T, M> {}

impl<T: GuardElement> GuardedBuffer<T> {
    pub fn new() -> Self {
        Self::with_memory(SystemMemory::default())
    }
}

impl<T: GuardElement> Default for GuardedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: GuardElement, M: VirtualMemory> GuardedBuffer<T, M> {
    pub fn with_memory(memory: M) -> Self {
        assert!(mem::size_of::<T>() > 0, "zero-sized guard elements are not supported");
        Self {
            memory,
            region: None,
            capacity: 0,
            _marker: PhantomData,
        }
    }

    /// Number of elements that fit without a new reservation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Returns exactly `elements` slots ending at the guard boundary.
    ///
    /// With `zero_fill` every slot is zeroed, otherwise the `-23..=23` ramp is
    /// written. Failure to obtain memory aborts the process.
    pub fn acquire(&mut self, elements: usize, zero_fill: bool) -> &mut [T] {
        if elements > self.capacity {
            self.grow(elements);
        }

        let Some(region) = &self.region else {
            return &mut [];
        };

        // SAFETY: the guard address is aligned to BUFFER_ALIGNMENT and the
        // `elements * size_of::<T>()` bytes below it are committed read/write.
        let slice = unsafe {
            let start = region.guard().cast::<T>().sub(elements);
            std::slice::from_raw_parts_mut(start, elements)
        };

        if zero_fill {
            fill_zero(slice);
        } else {
            fill_ramp(slice);
        }
        slice
    }

    /// Gives the current region back to the system.
    pub fn release(&mut self) {
        if let Some(region) = self.region.take() {
            self.memory.release(region.base, region.reserved);
        }
        self.capacity = 0;
    }

    fn grow(&mut self, elements: usize) {
        self.release();

        let committed = elements
            .checked_mul(mem::size_of::<T>())
            .and_then(|bytes| bytes.checked_next_multiple_of(BUFFER_ALIGNMENT))
            .unwrap_or_else(|| {
                fatal(
                    "size",
                    usize::MAX,
                    io::Error::new(io::ErrorKind::InvalidInput, "element count overflows usize"),
                )
            });
        let reserved = committed + GUARD_PADDING;

        let base = self
            .memory
            .reserve(reserved)
            .unwrap_or_else(|err| fatal("reserve", reserved, err));

        if let Err(err) = self.memory.commit(base, committed) {
            self.memory.release(base, reserved);
            fatal("commit", committed, err);
        }

        // SAFETY: `committed < reserved`.
        let guard = unsafe { NonNull::new_unchecked(base.as_ptr().add(committed)) };
        if let Err(err) = self.memory.protect(guard, GUARD_PADDING) {
            self.memory.release(base, reserved);
            fatal("protect", GUARD_PADDING, err);
        }

        self.capacity = committed / mem::size_of::<T>();
        self.region = Some(Region {
            base,
            reserved,
            committed,
        });
        debug!(elements, committed, reserved, "reserved guarded region");
    }
}

impl<T: GuardElement, M: VirtualMemory> Drop for GuardedBuffer<T, M> {
    fn drop(&mut self) {
        self.release();
    }
}

fn fatal(op: &str, bytes: usize, err: io::Error) -> ! {
    error!(op, bytes, error = %err, "guarded buffer allocation failed");
    std::process::abort()
}
