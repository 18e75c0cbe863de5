//! Boundary navigation over blocks in the arena.
//!
//! A [`Block`] is a cheap handle to a block's metadata word. All navigation
//! is raw address arithmetic over the single contiguous arena, so every
//! method carries the precondition that the handle points into the currently
//! live managed range.
//!
//! Three block shapes share this layout space, told apart by size and the
//! alloc flag rather than a tag field:
//!
//! ```text
//!   Allocated block:        Free normal block (≥ 32):   Free mini block (16):
//!   ┌──────────┐            ┌──────────┐                ┌──────────┐
//!   │  header  │            │  header  │                │  header  │
//!   ├──────────┤            ├──────────┤                ├──────────┤
//!   │          │            │   next   │                │   next   │
//!   │ payload  │            ├──────────┤                └──────────┘
//!   │          │            │   prev   │
//!   └──────────┘            ├──────────┤
//!                           │   ...    │
//!                           ├──────────┤
//!                           │  footer  │  = copy of header
//!                           └──────────┘
//! ```
//!
//! The footer exists so a block's physical predecessor can be located
//! without an external index; mini blocks drop it (and the `prev` link) to
//! keep their overhead at one word.

use std::ptr;

use crate::header::{
  MINI_BLOCK_SIZE, WSIZE, Word, extract_alloc, extract_mpalloc, extract_palloc, extract_size, pack,
};

/// Handle to a block's metadata word inside the arena.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Block(pub(crate) *mut Word);

impl Block {
  /// Returns the block owning the given payload pointer.
  pub unsafe fn from_payload(bp: *mut u8) -> Self {
    unsafe { Self(bp.sub(WSIZE) as *mut Word) }
  }

  /// Returns a pointer to this block's payload.
  pub unsafe fn payload(self) -> *mut u8 {
    unsafe { (self.0 as *mut u8).add(WSIZE) }
  }

  pub fn addr(self) -> *mut Word {
    self.0
  }

  pub unsafe fn header(self) -> Word {
    unsafe { self.0.read() }
  }

  pub unsafe fn size(self) -> usize {
    unsafe { extract_size(self.header()) }
  }

  pub unsafe fn is_alloc(self) -> bool {
    unsafe { extract_alloc(self.header()) }
  }

  pub unsafe fn palloc(self) -> bool {
    unsafe { extract_palloc(self.header()) }
  }

  pub unsafe fn mpalloc(self) -> bool {
    unsafe { extract_mpalloc(self.header()) }
  }

  pub unsafe fn is_mini(self) -> bool {
    unsafe { self.size() == MINI_BLOCK_SIZE }
  }

  /// Usable payload bytes of an allocated block.
  pub unsafe fn payload_size(self) -> usize {
    unsafe { self.size() - WSIZE }
  }

  /// The trailing tag word of a free normal block.
  ///
  /// Never meaningful for mini blocks, allocated blocks, or the epilogue.
  unsafe fn footer(self) -> *mut Word {
    unsafe { (self.0 as *mut u8).add(self.size() - WSIZE) as *mut Word }
  }

  /// Writes this block's header, mirroring it into the footer when the
  /// block is a free normal block.
  pub unsafe fn write(
    self,
    size: usize,
    mpalloc: bool,
    palloc: bool,
    alloc: bool,
  ) {
    unsafe {
      self.0.write(pack(size, mpalloc, palloc, alloc));

      if !alloc && size != MINI_BLOCK_SIZE {
        self.footer().write(pack(size, mpalloc, palloc, alloc));
      }
    }
  }

  /// Writes this block as the epilogue sentinel: size 0, allocated, with
  /// flags describing the real last block.
  pub unsafe fn write_epilogue(
    self,
    mpalloc: bool,
    palloc: bool,
  ) {
    unsafe { self.0.write(pack(0, mpalloc, palloc, true)) }
  }

  /// The block physically after this one. Forbidden on the epilogue.
  pub unsafe fn next_phys(self) -> Block {
    unsafe {
      debug_assert!(self.size() != 0, "next_phys on the epilogue");
      Block((self.0 as *mut u8).add(self.size()) as *mut Word)
    }
  }

  /// The block physically before this one.
  ///
  /// Mini blocks leave no footer, so the caller passes this block's mpalloc
  /// flag: when set, the predecessor sits exactly 16 bytes back. Otherwise
  /// the predecessor's footer is read from the word just before this header;
  /// a recorded size of 0 means the prologue, i.e. no predecessor.
  pub unsafe fn prev_phys(
    self,
    mini_prev: bool,
  ) -> Option<Block> {
    unsafe {
      if mini_prev {
        return Some(Block((self.0 as *mut u8).sub(MINI_BLOCK_SIZE) as *mut Word));
      }

      let footer = self.0.sub(1);
      let size = extract_size(footer.read());

      if size == 0 {
        return None;
      }

      Some(Block((footer as *mut u8).add(WSIZE).sub(size) as *mut Word))
    }
  }

  // Free-list link words overlay the payload of free blocks: `next` in the
  // first payload word, `prev` in the second. Mini blocks only have `next`.

  unsafe fn link_at(
    self,
    idx: usize,
  ) -> Option<Block> {
    unsafe {
      let slot = (self.payload() as *mut *mut Word).add(idx);
      let p = slot.read();

      if p.is_null() { None } else { Some(Block(p)) }
    }
  }

  unsafe fn set_link_at(
    self,
    idx: usize,
    target: Option<Block>,
  ) {
    unsafe {
      let slot = (self.payload() as *mut *mut Word).add(idx);
      slot.write(target.map_or(ptr::null_mut(), |b| b.0));
    }
  }

  pub unsafe fn next_free(self) -> Option<Block> {
    unsafe { self.link_at(0) }
  }

  pub unsafe fn set_next_free(
    self,
    target: Option<Block>,
  ) {
    unsafe { self.set_link_at(0, target) }
  }

  /// Backward link of a free normal block. Never valid on mini blocks.
  pub unsafe fn prev_free(self) -> Option<Block> {
    unsafe { self.link_at(1) }
  }

  pub unsafe fn set_prev_free(
    self,
    target: Option<Block>,
  ) {
    unsafe { self.set_link_at(1, target) }
  }
}
