//! Virtual-memory primitives used to build guarded regions.
//!
//! The buffer logic only ever talks to [`VirtualMemory`]; each target
//! environment provides one implementation of it.

use std::io;
use std::ptr::NonNull;

/// Reserve / commit / protect / release, in the order a guarded region uses them.
pub trait VirtualMemory: Send {
    /// Reserve `bytes` of address space without granting any access to it.
    fn reserve(&mut self, bytes: usize) -> io::Result<NonNull<u8>>;

    /// Make `bytes` starting at `base` readable and writable.
    fn commit(&mut self, base: NonNull<u8>, bytes: usize) -> io::Result<()>;

    /// Revoke every access permission on `bytes` starting at `base`.
    fn protect(&mut self, base: NonNull<u8>, bytes: usize) -> io::Result<()>;

    /// Return a whole reservation previously obtained from [`reserve`](Self::reserve).
    fn release(&mut self, base: NonNull<u8>, bytes: usize);
}

#[cfg(unix)]
pub type SystemMemory = MmapMemory;

#[cfg(not(unix))]
pub type SystemMemory = HeapMemory;

/// Anonymous `mmap` reservations with `mprotect` controlling access.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapMemory;

#[cfg(unix)]
impl VirtualMemory for MmapMemory {
    fn reserve(&mut self, bytes: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: a fresh private anonymous mapping at a kernel-chosen address
        // cannot alias any existing allocation.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                bytes,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(raw.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))
    }

    fn commit(&mut self, base: NonNull<u8>, bytes: usize) -> io::Result<()> {
        set_protection(base, bytes, libc::PROT_READ | libc::PROT_WRITE)
    }

    fn protect(&mut self, base: NonNull<u8>, bytes: usize) -> io::Result<()> {
        set_protection(base, bytes, libc::PROT_NONE)
    }

    fn release(&mut self, base: NonNull<u8>, bytes: usize) {
        // SAFETY: `base..base+bytes` is exactly one mapping returned by `reserve`.
        let rc = unsafe { libc::munmap(base.as_ptr().cast(), bytes) };
        if rc != 0 {
            tracing::warn!(
                bytes,
                error = %io::Error::last_os_error(),
                "munmap of guarded region failed"
            );
        }
    }
}

#[cfg(unix)]
fn set_protection(base: NonNull<u8>, bytes: usize, prot: libc::c_int) -> io::Result<()> {
    if bytes == 0 {
        return Ok(());
    }
    // SAFETY: callers only pass page-aligned ranges inside a live reservation.
    let rc = unsafe { libc::mprotect(base.as_ptr().cast(), bytes, prot) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Heap-backed fallback for targets without an mmap-style API.
///
/// Regions are ordinary allocations: the placement policy still holds, but an
/// overrun lands in unprotected memory instead of faulting.
#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct HeapMemory {
    warned: bool,
}

#[cfg(not(unix))]
const HEAP_ALIGNMENT: usize = 64 * 1024;

#[cfg(not(unix))]
impl VirtualMemory for HeapMemory {
    fn reserve(&mut self, bytes: usize) -> io::Result<NonNull<u8>> {
        if !self.warned {
            tracing::warn!("no guard-page support on this target; overruns will not fault");
            self.warned = true;
        }
        let layout = std::alloc::Layout::from_size_align(bytes, HEAP_ALIGNMENT)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: layout has non-zero size; guard padding is always added.
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw).ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "heap exhausted"))
    }

    fn commit(&mut self, _base: NonNull<u8>, _bytes: usize) -> io::Result<()> {
        Ok(())
    }

    fn protect(&mut self, _base: NonNull<u8>, _bytes: usize) -> io::Result<()> {
        Ok(())
    }

    fn release(&mut self, base: NonNull<u8>, bytes: usize) {
        if let Ok(layout) = std::alloc::Layout::from_size_align(bytes, HEAP_ALIGNMENT) {
            // SAFETY: same layout as the matching `reserve`.
            unsafe { std::alloc::dealloc(base.as_ptr(), layout) };
        }
    }
}
