//! The allocator core: fit search, splitting, coalescing, and heap growth
//! stitched together behind `malloc`-shaped entry points.

use std::cmp;
use std::ptr;

use log::{debug, error, trace};

use crate::block::Block;
use crate::free_list::{MiniList, SegList};
use crate::header::{CHUNK_SIZE, DSIZE, MIN_BLOCK_SIZE, MINI_BLOCK_SIZE, WSIZE, Word, pack};
use crate::source::{HeapSource, SbrkSource};
use crate::align;

/// Tunable allocation policy.
#[derive(Clone, Copy, Debug)]
pub struct Policy {
  /// Minimum number of bytes requested from the heap source per growth.
  pub growth_chunk: usize,
  /// List entries scanned after the first fit arms the better-fit search.
  pub fit_window: u32,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      growth_chunk: CHUNK_SIZE,
      fit_window: 3,
    }
  }
}

/// A segregated free-list allocator over a growable contiguous arena.
///
/// All bookkeeping state lives in this struct: the 14-bucket segregated
/// list, the mini-block list, and the arena boundary sentinels. The heap is
/// lazily initialized on the first allocation and lives as long as the
/// allocator.
///
/// Not safe for concurrent use; the struct holds raw pointers into the
/// arena and is neither `Send` nor `Sync`. Wrap it in a mutex externally if
/// sharing is required.
pub struct SegAllocator<S: HeapSource = SbrkSource> {
  source: S,
  seglist: SegList,
  mini: MiniList,
  heap_start: Option<Block>,
  epilogue: Option<Block>,
  policy: Policy,
}

impl SegAllocator<SbrkSource> {
  /// An allocator backed by the program break.
  pub fn new() -> Self {
    Self::with_source(SbrkSource)
  }
}

impl Default for SegAllocator<SbrkSource> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: HeapSource> SegAllocator<S> {
  pub fn with_source(source: S) -> Self {
    Self::with_policy(source, Policy::default())
  }

  pub fn with_policy(
    source: S,
    policy: Policy,
  ) -> Self {
    Self {
      source,
      seglist: SegList::new(),
      mini: MiniList::new(),
      heap_start: None,
      epilogue: None,
      policy,
    }
  }

  /// The heap source, mainly useful for inspecting test arenas.
  pub fn source(&self) -> &S {
    &self.source
  }

  /// Allocates `size` bytes and returns the payload pointer, or null when
  /// the heap cannot satisfy the request. `size` 0 returns null with no
  /// side effects.
  ///
  /// Returned pointers are 16-byte aligned and usable for at least `size`
  /// bytes.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if size == 0 {
        return ptr::null_mut();
      }

      if self.epilogue.is_none() && !self.init() {
        return ptr::null_mut();
      }

      // payload plus header word, rounded to the granularity; the rounding
      // itself must not wrap either
      let asize = match size.checked_add(WSIZE + DSIZE - 1) {
        Some(total) => total & !(DSIZE - 1),
        None => return ptr::null_mut(),
      };

      let candidate = if asize == MINI_BLOCK_SIZE {
        // any mini-list entry is an exact fit; fall back to the smallest
        // bucket otherwise
        self
          .mini
          .head()
          .or_else(|| self.seglist.find_fit(asize, 0, self.policy.fit_window))
      } else {
        let home = SegList::home_address(asize);
        self.seglist.find_fit(asize, home, self.policy.fit_window)
      };

      let block = match candidate {
        Some(block) => block,
        None => {
          // no fit anywhere: grow once, carrying the epilogue's view of
          // the last real block into the new region
          let Some(epilogue) = self.epilogue else {
            return ptr::null_mut();
          };
          let extend = cmp::max(asize, self.policy.growth_chunk);

          match self.extend_heap(extend, epilogue.mpalloc(), epilogue.palloc()) {
            Some(block) => block,
            None => {
              debug!("allocate({size}): out of memory after failed growth");
              return ptr::null_mut();
            }
          }
        }
      };

      debug_assert!(!block.is_alloc());

      block.write(block.size(), block.mpalloc(), block.palloc(), true);
      self.split(block, asize);

      trace!("allocate({size}) -> {:?} ({asize} byte block)", block.addr());
      debug_assert!(self.check_heap("allocate"));

      block.payload()
    }
  }

  /// Releases a payload pointer previously returned by [`allocate`].
  ///
  /// Null is a no-op. Releasing a foreign pointer, or the same pointer
  /// twice, is undefined behavior; production builds do not detect it.
  ///
  /// [`allocate`]: SegAllocator::allocate
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    unsafe {
      if ptr.is_null() {
        return;
      }

      let block = Block::from_payload(ptr);
      debug_assert!(block.is_alloc(), "release of a block that is not allocated");

      trace!("release({ptr:?}) ({} byte block)", block.size());

      block.write(block.size(), block.mpalloc(), block.palloc(), false);

      let block = self.coalesce(block);
      self.update_next_mpalloc(block);
      self.update_next_palloc(block);

      debug_assert!(self.check_heap("release"));
    }
  }

  /// Resizes an allocation, moving it to a fresh block.
  ///
  /// `new_size` 0 is equivalent to [`release`] and returns null; a null
  /// `ptr` is equivalent to [`allocate`]. On allocation failure the
  /// original block is left untouched and null is returned.
  ///
  /// [`allocate`]: SegAllocator::allocate
  /// [`release`]: SegAllocator::release
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    unsafe {
      if new_size == 0 {
        self.release(ptr);
        return ptr::null_mut();
      }

      if ptr.is_null() {
        return self.allocate(new_size);
      }

      let new_ptr = self.allocate(new_size);
      if new_ptr.is_null() {
        return ptr::null_mut();
      }

      let block = Block::from_payload(ptr);
      let copy = cmp::min(block.payload_size(), new_size);
      ptr::copy_nonoverlapping(ptr, new_ptr, copy);

      self.release(ptr);

      new_ptr
    }
  }

  /// Allocates `count * size` bytes, zero-filled.
  ///
  /// Returns null when `count` is 0 or the multiplication overflows, in
  /// both cases without allocating.
  pub unsafe fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if count == 0 {
        return ptr::null_mut();
      }

      let Some(total) = count.checked_mul(size) else {
        return ptr::null_mut();
      };

      let bp = self.allocate(total);

      if !bp.is_null() {
        ptr::write_bytes(bp, 0, total);
      }

      bp
    }
  }

  /// Heap-consistency hook. Release builds always report a pass; debug
  /// builds walk the whole arena and verify its invariants, logging the
  /// first violation found together with `label`.
  pub fn check_heap(
    &self,
    label: &str,
  ) -> bool {
    if cfg!(debug_assertions) {
      unsafe { self.verify(label) }
    } else {
      true
    }
  }

  /// Writes the prologue sentinels and performs the initial extension.
  unsafe fn init(&mut self) -> bool {
    unsafe {
      if self.heap_start.is_none() {
        let Some(start) = self.source.grow(DSIZE) else {
          return false;
        };
        let start = start.as_ptr() as *mut Word;

        // two sentinel words; the second doubles as the first real block's
        // header once the heap is extended below
        start.write(pack(0, false, true, true));
        start.add(1).write(pack(0, false, true, true));

        self.heap_start = Some(Block(start.add(1)));
      }

      self.extend_heap(self.policy.growth_chunk, false, true).is_some()
    }
  }

  /// Appends `size` bytes (rounded to the granularity) to the arena,
  /// formats them as one free block carrying the outgoing epilogue's flags,
  /// writes a fresh epilogue, and coalesces with the old last block.
  unsafe fn extend_heap(
    &mut self,
    size: usize,
    mpalloc: bool,
    palloc: bool,
  ) -> Option<Block> {
    unsafe {
      let size = align!(size);
      let bp = self.source.grow(size)?;

      debug!("extended heap by {size} bytes");

      // the new block's header lands on the old epilogue word
      let block = Block::from_payload(bp.as_ptr());
      block.write(size, mpalloc, palloc, false);

      let epilogue = block.next_phys();
      epilogue.write_epilogue(block.is_mini(), false);
      self.epilogue = Some(epilogue);

      Some(self.coalesce(block))
    }
  }

  /// Merges a freed block with whichever physical neighbors are free and
  /// inserts the result into its free list. Returns the merged block.
  ///
  /// Restores the invariant that no two adjacent blocks are both free.
  unsafe fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    unsafe {
      let next = block.next_phys();
      let next_alloc = next.is_alloc();

      // the prologue shows up as "no predecessor" and is treated like an
      // allocated neighbor
      let prev = if block.palloc() {
        None
      } else {
        block.prev_phys(block.mpalloc())
      };

      match (prev, next_alloc) {
        // both neighbors free: fold all three into one block at prev
        (Some(prev), false) => {
          let sum = prev.size() + block.size() + next.size();
          let mpalloc = prev.mpalloc();
          let palloc = prev.palloc();

          self.remove_free(prev);
          self.remove_free(next);

          prev.write(sum, mpalloc, palloc, false);
          self.insert_free(prev);

          self.update_next_palloc(prev);
          self.update_next_mpalloc(prev);
          prev
        }
        // only the successor is free
        (None, false) => {
          let sum = block.size() + next.size();
          let mpalloc = block.mpalloc();
          let palloc = block.palloc();

          self.remove_free(next);

          block.write(sum, mpalloc, palloc, false);
          self.insert_free(block);

          self.update_next_mpalloc(block);
          self.update_next_palloc(block);
          block
        }
        // only the predecessor is free
        (Some(prev), true) => {
          let sum = prev.size() + block.size();
          let mpalloc = prev.mpalloc();
          let palloc = prev.palloc();

          self.remove_free(prev);

          prev.write(sum, mpalloc, palloc, false);
          self.insert_free(prev);

          self.update_next_palloc(prev);
          self.update_next_mpalloc(prev);
          prev
        }
        // neither neighbor is free
        (None, true) => {
          self.insert_free(block);

          self.update_next_palloc(block);
          self.update_next_mpalloc(block);
          block
        }
      }
    }
  }

  /// Carves an `asize`-byte allocated block out of a free block chosen by
  /// fit search (already marked allocated by the caller).
  ///
  /// A remainder of at least the minimum block size becomes a new free
  /// block; anything smaller is absorbed as internal fragmentation, since
  /// an undersized remainder would violate the minimum-size invariant.
  unsafe fn split(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    unsafe {
      debug_assert!(block.is_alloc());

      let block_size = block.size();
      let mpalloc = block.mpalloc();
      let palloc = block.palloc();

      if block_size - asize >= MIN_BLOCK_SIZE {
        self.remove_free(block);
        block.write(asize, mpalloc, palloc, true);

        let rest = block.next_phys();
        rest.write(block_size - asize, block.is_mini(), true, false);
        self.insert_free(rest);

        self.update_next_mpalloc(rest);
        self.update_next_palloc(rest);
      } else {
        self.remove_free(block);
        block.write(block_size, mpalloc, palloc, true);

        self.update_next_palloc(block);
        self.update_next_mpalloc(block);
      }
    }
  }

  fn is_epilogue(
    &self,
    block: Block,
  ) -> bool {
    self.epilogue == Some(block)
  }

  /// Routes a free block to the list matching its size class.
  unsafe fn insert_free(
    &mut self,
    block: Block,
  ) {
    unsafe {
      if block.is_mini() {
        self.mini.insert(block);
      } else {
        self.seglist.insert(block);
      }
    }
  }

  unsafe fn remove_free(
    &mut self,
    block: Block,
  ) {
    unsafe {
      if block.is_mini() {
        self.mini.remove(block);
      } else {
        self.seglist.remove(block);
      }
    }
  }

  /// Rewrites the physical successor's palloc flag from this block's
  /// current allocation state.
  unsafe fn update_next_palloc(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let alloc = block.is_alloc();
      let next = block.next_phys();

      if self.is_epilogue(next) {
        next.write_epilogue(next.mpalloc(), alloc);
      } else {
        next.write(next.size(), next.mpalloc(), alloc, next.is_alloc());
      }
    }
  }

  /// Rewrites the physical successor's mpalloc flag from this block's
  /// current size class.
  unsafe fn update_next_mpalloc(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let mini = block.is_mini();
      let next = block.next_phys();

      if self.is_epilogue(next) {
        next.write_epilogue(mini, next.palloc());
      } else {
        next.write(next.size(), mini, next.palloc(), next.is_alloc());
      }
    }
  }

  /// Full arena walk checking every structural invariant. Debug-build only
  /// via [`check_heap`](SegAllocator::check_heap).
  unsafe fn verify(
    &self,
    label: &str,
  ) -> bool {
    unsafe {
      let (Some(start), Some(epilogue)) = (self.heap_start, self.epilogue) else {
        return true;
      };

      let mut prev: Option<Block> = None;
      let mut free_blocks = 0usize;
      let mut cur = start;

      while (cur.addr() as usize) < (epilogue.addr() as usize) {
        let size = cur.size();

        if size == 0 || size % DSIZE != 0 {
          error!("[{label}] block {:?} has bad size {size}", cur.addr());
          return false;
        }

        if !cur.is_alloc() {
          free_blocks += 1;

          if !cur.is_mini() {
            let footer = (cur.addr() as *mut u8).add(size - WSIZE) as *mut Word;

            if cur.header() != footer.read() {
              error!("[{label}] block {:?} header/footer mismatch", cur.addr());
              return false;
            }
          }
        }

        match prev {
          Some(prev) => {
            if cur.palloc() != prev.is_alloc() {
              error!("[{label}] block {:?} has stale palloc", cur.addr());
              return false;
            }
            if cur.mpalloc() != prev.is_mini() {
              error!("[{label}] block {:?} has stale mpalloc", cur.addr());
              return false;
            }
            if !prev.is_alloc() && !cur.is_alloc() {
              error!("[{label}] adjacent free blocks at {:?}", cur.addr());
              return false;
            }
          }
          None => {
            // the first block sits right after the prologue sentinel
            if !cur.palloc() {
              error!("[{label}] first block claims a free predecessor");
              return false;
            }
          }
        }

        prev = Some(cur);
        cur = cur.next_phys();
      }

      if cur != epilogue {
        error!("[{label}] walk overshot the epilogue");
        return false;
      }

      if epilogue.size() != 0 || !epilogue.is_alloc() {
        error!("[{label}] malformed epilogue");
        return false;
      }

      if let Some(prev) = prev {
        if epilogue.palloc() != prev.is_alloc() || epilogue.mpalloc() != prev.is_mini() {
          error!("[{label}] epilogue flags disagree with the last block");
          return false;
        }
      }

      let listed = self.seglist.len() + self.mini.len();

      if listed != free_blocks {
        error!("[{label}] {free_blocks} free blocks in the arena, {listed} listed");
        return false;
      }

      true
    }
  }
}
