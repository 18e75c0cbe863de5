//! Bit-packed block metadata.
//!
//! Every block starts with a single [`Word`] holding its size and three
//! status flags. The low four bits are reserved for flags; sizes are always
//! multiples of [`DSIZE`], so masking them out loses nothing.
//!
//! ```text
//!   63                                    4  3  2  1  0
//!   ┌──────────────────────────────────────┬──┬──┬──┬──┐
//!   │              size (≥ 16)             │ 0│mp│ p│ a│
//!   └──────────────────────────────────────┴──┴──┴──┴──┘
//!     a  = alloc    this block is allocated
//!     p  = palloc   the physically previous block is allocated
//!     mp = mpalloc  the physically previous block is a mini block
//! ```
//!
//! This module is the single owner of the bit layout; nothing else in the
//! crate masks header words directly.

use std::mem;

/// One header/footer word.
pub type Word = u64;

/// Size of a single word in bytes.
pub const WSIZE: usize = mem::size_of::<Word>();

/// Double-word size: the alignment granularity and rounding unit.
pub const DSIZE: usize = 2 * WSIZE;

/// Smallest block the allocator will ever create.
pub const MIN_BLOCK_SIZE: usize = DSIZE;

/// Fixed size of a mini block.
pub const MINI_BLOCK_SIZE: usize = 16;

/// Default number of bytes requested from the heap source per growth.
pub const CHUNK_SIZE: usize = 1 << 9;

const ALLOC_MASK: Word = 0x1;
const PALLOC_MASK: Word = 0x2;
const MPALLOC_MASK: Word = 0x4;
const SIZE_MASK: Word = !(0xF as Word);

/// Packs a size and the three status flags into one word.
///
/// Callers guarantee `size` is already rounded to a multiple of [`DSIZE`];
/// no validation happens here.
pub fn pack(
  size: usize,
  mpalloc: bool,
  palloc: bool,
  alloc: bool,
) -> Word {
  let mut word = size as Word;
  if alloc {
    word |= ALLOC_MASK;
  }
  if palloc {
    word |= PALLOC_MASK;
  }
  if mpalloc {
    word |= MPALLOC_MASK;
  }
  word
}

/// Returns the size encoded in a word, flag bits masked out.
pub fn extract_size(word: Word) -> usize {
  (word & SIZE_MASK) as usize
}

/// Returns the alloc flag of a word.
pub fn extract_alloc(word: Word) -> bool {
  (word & ALLOC_MASK) != 0
}

/// Returns the palloc flag of a word.
pub fn extract_palloc(word: Word) -> bool {
  (word & PALLOC_MASK) != 0
}

/// Returns the mpalloc flag of a word.
pub fn extract_mpalloc(word: Word) -> bool {
  (word & MPALLOC_MASK) != 0
}
