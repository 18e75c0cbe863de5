//! Free-block tracking: a size-class-segregated list for normal blocks and
//! a dedicated singly-linked list for 16-byte mini blocks.
//!
//! Both structures store their links inside the free blocks themselves, so
//! insert and remove only rewrite link words. Keeping the palloc/mpalloc
//! flags of neighboring blocks current is the allocator core's job, not the
//! lists'.

use crate::block::Block;

/// Number of size-class buckets in the segregated list.
pub(crate) const BUCKET_COUNT: usize = 14;

/// Segregated free list for normal blocks (size ≥ 32).
///
/// Each bucket is an unordered doubly-linked list with LIFO insertion at
/// the head.
pub(crate) struct SegList {
  buckets: [Option<Block>; BUCKET_COUNT],
}

impl SegList {
  pub fn new() -> Self {
    Self {
      buckets: [None; BUCKET_COUNT],
    }
  }

  /// Maps a block size to its bucket index. The size must be ≥ 32.
  pub fn home_address(size: usize) -> usize {
    match size {
      ..=32 => 0,
      33..=64 => 1,
      65..=85 => 2,
      86..=112 => 3,
      113..=128 => 4,
      129..=160 => 5,
      161..=200 => 6,
      201..=256 => 7,
      257..=512 => 8,
      513..=1024 => 9,
      1025..=2048 => 10,
      2049..=4096 => 11,
      4097..=8192 => 12,
      _ => 13,
    }
  }

  /// Pushes a free normal block at the head of its bucket.
  pub unsafe fn insert(
    &mut self,
    block: Block,
  ) {
    unsafe {
      debug_assert!(!block.is_mini());

      let idx = Self::home_address(block.size());

      match self.buckets[idx] {
        None => {
          block.set_next_free(None);
          block.set_prev_free(None);
        }
        Some(head) => {
          head.set_prev_free(Some(block));
          block.set_next_free(Some(head));
          block.set_prev_free(None);
        }
      }

      self.buckets[idx] = Some(block);
    }
  }

  /// Unlinks a block from its bucket. The block must currently be a member.
  pub unsafe fn remove(
    &mut self,
    block: Block,
  ) {
    unsafe {
      debug_assert!(!block.is_mini());

      let idx = Self::home_address(block.size());
      let prev = block.prev_free();
      let next = block.next_free();

      match (prev, next) {
        (None, None) => self.buckets[idx] = None,
        (None, Some(next)) => {
          next.set_prev_free(None);
          self.buckets[idx] = Some(next);
        }
        (Some(prev), None) => prev.set_next_free(None),
        (Some(prev), Some(next)) => {
          prev.set_next_free(Some(next));
          next.set_prev_free(Some(prev));
        }
      }
    }
  }

  /// Better-fit search for a block of at least `asize` bytes, scanning
  /// buckets upward from `start`.
  ///
  /// The first sufficient block arms a countdown of `window` further list
  /// entries (the arming entry included); within it, a candidate with a
  /// strictly smaller leftover replaces the current best. The best block is
  /// returned once the countdown hits zero or the current bucket runs out —
  /// later buckets only hold larger blocks, so a found candidate is never
  /// abandoned for them.
  pub unsafe fn find_fit(
    &self,
    asize: usize,
    start: usize,
    window: u32,
  ) -> Option<Block> {
    unsafe {
      let mut counting = false;
      let mut counter = window;
      let mut best: Option<Block> = None;
      let mut best_gap = 0usize;

      for idx in start..BUCKET_COUNT {
        let mut cur = self.buckets[idx];

        while let Some(block) = cur {
          let size = block.size();

          if size == 0 {
            break;
          }

          if asize <= size {
            if best.is_none() || size - asize < best_gap {
              best = Some(block);
              best_gap = size - asize;
              counting = true;
            }
          }

          if counting {
            counter = counter.saturating_sub(1);
            if counter == 0 {
              return best;
            }
          }

          cur = block.next_free();
        }

        if best.is_some() {
          return best;
        }
      }

      best
    }
  }
}

/// Singly-linked free list holding exactly-16-byte blocks.
///
/// Mini blocks carry no backward link, so removal is a linear scan from the
/// head. The list is expected to stay short: mini blocks are the smallest
/// size class and churn quickly.
pub(crate) struct MiniList {
  root: Option<Block>,
}

impl MiniList {
  pub fn new() -> Self {
    Self { root: None }
  }

  /// The head of the list. Any entry is an exact fit for a mini request.
  pub fn head(&self) -> Option<Block> {
    self.root
  }

  /// Pushes a free mini block at the head.
  pub unsafe fn insert(
    &mut self,
    block: Block,
  ) {
    unsafe {
      debug_assert!(block.is_mini());

      block.set_next_free(self.root);
      self.root = Some(block);
    }
  }

  /// Unlinks a mini block, scanning from the head for its predecessor.
  pub unsafe fn remove(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let Some(root) = self.root else {
        return;
      };

      if root == block {
        self.root = block.next_free();
        block.set_next_free(None);
        return;
      }

      let mut cur = Some(root);

      while let Some(entry) = cur {
        if entry.next_free() == Some(block) {
          entry.set_next_free(block.next_free());
          block.set_next_free(None);
          return;
        }

        cur = entry.next_free();
      }
    }
  }

  /// Number of entries, used by the debug heap verifier.
  pub unsafe fn len(&self) -> usize {
    unsafe {
      let mut count = 0;
      let mut cur = self.root;

      while let Some(block) = cur {
        count += 1;
        cur = block.next_free();
      }

      count
    }
  }
}

impl SegList {
  /// Total entries across all buckets, used by the debug heap verifier.
  pub unsafe fn len(&self) -> usize {
    unsafe {
      let mut count = 0;

      for idx in 0..BUCKET_COUNT {
        let mut cur = self.buckets[idx];

        while let Some(block) = cur {
          count += 1;
          cur = block.next_free();
        }
      }

      count
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::header::Word;

  #[repr(align(16))]
  struct RawArena([u8; 1024]);

  /// Carves a sequence of free blocks of the given sizes out of a raw
  /// buffer. Only headers/footers are written; the blocks are not wired
  /// into any heap.
  unsafe fn carve(
    arena: &mut RawArena,
    sizes: &[usize],
  ) -> Vec<Block> {
    unsafe {
      let mut base = arena.0.as_mut_ptr() as *mut Word;
      let mut blocks = Vec::new();

      for &size in sizes {
        let block = Block(base);
        block.write(size, false, true, false);
        blocks.push(block);
        base = (base as *mut u8).add(size) as *mut Word;
      }

      blocks
    }
  }

  #[test]
  fn test_home_address_table() {
    let expected = [
      (32, 0),
      (48, 1),
      (64, 1),
      (80, 2),
      (96, 3),
      (112, 3),
      (128, 4),
      (160, 5),
      (176, 6),
      (256, 7),
      (512, 8),
      (1024, 9),
      (2048, 10),
      (4096, 11),
      (8192, 12),
      (8208, 13),
      (1 << 20, 13),
    ];

    for (size, idx) in expected {
      assert_eq!(SegList::home_address(size), idx, "size {size}");
    }
  }

  #[test]
  fn test_insert_is_lifo() {
    let mut arena = RawArena([0; 1024]);

    unsafe {
      let blocks = carve(&mut arena, &[48, 48, 48]);
      let mut list = SegList::new();

      for &block in &blocks {
        list.insert(block);
      }

      // head is the most recently inserted block
      assert_eq!(list.find_fit(48, 0, 3), Some(blocks[2]));
    }
  }

  #[test]
  fn test_remove_head_middle_tail() {
    let mut arena = RawArena([0; 1024]);

    unsafe {
      let blocks = carve(&mut arena, &[48, 48, 48, 48]);
      let mut list = SegList::new();

      for &block in &blocks {
        list.insert(block);
      }
      assert_eq!(list.len(), 4);

      // middle
      list.remove(blocks[2]);
      assert_eq!(list.len(), 3);
      assert_eq!(blocks[3].next_free(), Some(blocks[1]));
      assert_eq!(blocks[1].prev_free(), Some(blocks[3]));

      // head
      list.remove(blocks[3]);
      assert_eq!(list.len(), 2);
      assert_eq!(list.find_fit(48, 0, 3), Some(blocks[1]));

      // tail
      list.remove(blocks[0]);
      assert_eq!(list.len(), 1);
      assert_eq!(blocks[1].next_free(), None);

      list.remove(blocks[1]);
      assert_eq!(list.len(), 0);
      assert_eq!(list.find_fit(48, 0, 3), None);
    }
  }

  #[test]
  fn test_find_fit_skips_to_larger_bucket() {
    let mut arena = RawArena([0; 1024]);

    unsafe {
      let blocks = carve(&mut arena, &[32, 256]);
      let mut list = SegList::new();

      list.insert(blocks[0]); // bucket 0
      list.insert(blocks[1]); // bucket 7

      assert_eq!(list.find_fit(48, SegList::home_address(48), 3), Some(blocks[1]));
    }
  }

  #[test]
  fn test_find_fit_window_cutoff() {
    let mut arena = RawArena([0; 1024]);

    unsafe {
      // insertion order: exact fit first, then three loose fits, so the
      // list reads loose, loose, loose, exact
      let blocks = carve(&mut arena, &[48, 64, 64, 64]);
      let mut list = SegList::new();

      for &block in &blocks {
        list.insert(block);
      }

      // the countdown arms on the first loose fit and expires before the
      // exact fit at the tail is reached
      assert_eq!(list.find_fit(48, 1, 3), Some(blocks[3]));

      // a wider window reaches the exact fit
      assert_eq!(list.find_fit(48, 1, 8), Some(blocks[0]));
    }
  }

  #[test]
  fn test_find_fit_improves_within_window() {
    let mut arena = RawArena([0; 1024]);

    unsafe {
      // list order after LIFO insertion: 64, 48, 64
      let blocks = carve(&mut arena, &[64, 48, 64]);
      let mut list = SegList::new();

      for &block in &blocks {
        list.insert(block);
      }

      // the 64 at the head arms the countdown; the 48 right after it is a
      // strictly tighter fit and wins
      assert_eq!(list.find_fit(48, 1, 3), Some(blocks[1]));
    }
  }

  #[test]
  fn test_mini_list_insert_remove() {
    let mut arena = RawArena([0; 1024]);

    unsafe {
      let blocks = carve(&mut arena, &[16, 16, 16]);
      let mut list = MiniList::new();

      for &block in &blocks {
        list.insert(block);
      }

      assert_eq!(list.head(), Some(blocks[2]));
      assert_eq!(list.len(), 3);

      // removal from the middle takes the linear-scan path
      list.remove(blocks[1]);
      assert_eq!(list.len(), 2);
      assert_eq!(blocks[2].next_free(), Some(blocks[0]));

      list.remove(blocks[2]);
      assert_eq!(list.head(), Some(blocks[0]));

      list.remove(blocks[0]);
      assert_eq!(list.head(), None);
      assert_eq!(list.len(), 0);
    }
  }
}
