//! Heap growth sources.
//!
//! The allocator core never talks to the operating system directly; it asks
//! a [`HeapSource`] to append bytes to the managed range. [`SbrkSource`]
//! moves the real program break, [`ArenaSource`] moves a private break
//! inside a fixed in-memory buffer (what the test suite uses).

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};

use crate::header::DSIZE;

/// Extends the managed address range on demand.
pub trait HeapSource {
  /// Appends `incr` bytes to the managed range and returns the start of
  /// the new region, or `None` when the range cannot grow further.
  ///
  /// Successive grants must be physically contiguous: the region returned
  /// by one call starts exactly where the previous grant ended.
  unsafe fn grow(
    &mut self,
    incr: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the heap by moving the program break with `sbrk(2)`.
///
/// Unix-only, and unusable from more than one allocator at a time — the
/// program break is process-wide state.
pub struct SbrkSource;

impl HeapSource for SbrkSource {
  unsafe fn grow(
    &mut self,
    incr: usize,
  ) -> Option<NonNull<u8>> {
    unsafe {
      // an increment beyond isize would go negative and shrink the break
      if incr > isize::MAX as usize {
        return None;
      }

      let address = sbrk(incr as intptr_t);

      if address == usize::MAX as *mut c_void {
        return None;
      }

      NonNull::new(address as *mut u8)
    }
  }
}

/// A fixed-capacity, 16-aligned arena with a private break.
///
/// Growth succeeds until the break reaches the capacity chosen at
/// construction, then fails permanently. The backing buffer never moves,
/// so granted addresses stay valid for the arena's lifetime.
pub struct ArenaSource {
  base: *mut u8,
  capacity: usize,
  brk: usize,
}

impl ArenaSource {
  /// Reserves `capacity` bytes. Panics if the capacity is zero or cannot
  /// be laid out, i.e. it exceeds `isize::MAX`.
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "arena capacity must be nonzero");

    let layout = Layout::from_size_align(capacity, DSIZE).expect("arena capacity too large");

    let base = unsafe { alloc::alloc(layout) };
    assert!(!base.is_null(), "arena reservation failed");

    Self {
      base,
      capacity,
      brk: 0,
    }
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }

  /// Bytes still available for growth.
  pub fn remaining(&self) -> usize {
    self.capacity - self.brk
  }
}

impl HeapSource for ArenaSource {
  unsafe fn grow(
    &mut self,
    incr: usize,
  ) -> Option<NonNull<u8>> {
    if incr > self.capacity - self.brk {
      return None;
    }

    let region = unsafe { self.base.add(self.brk) };
    self.brk += incr;

    NonNull::new(region)
  }
}

impl Drop for ArenaSource {
  fn drop(&mut self) {
    let layout = Layout::from_size_align(self.capacity, DSIZE).expect("arena capacity too large");

    unsafe { alloc::dealloc(self.base, layout) };
  }
}
