//! End-to-end allocator behavior, driven against an in-memory arena so the
//! tests never touch the real program break.

use segalloc::{ArenaSource, Policy, SegAllocator};

const GRANULARITY: usize = 16;

fn allocator() -> SegAllocator<ArenaSource> {
  SegAllocator::with_source(ArenaSource::new(1 << 20))
}

#[test]
fn two_small_allocations_do_not_overlap() {
  let mut allocator = allocator();

  unsafe {
    let a = allocator.allocate(8);
    let b = allocator.allocate(8);

    assert!(!a.is_null());
    assert!(!b.is_null());
    assert_ne!(a, b);

    assert_eq!(a as usize % GRANULARITY, 0);
    assert_eq!(b as usize % GRANULARITY, 0);

    // each usable region is 8 bytes; writing one must not disturb the other
    std::ptr::write_bytes(a, 0x11, 8);
    std::ptr::write_bytes(b, 0x22, 8);

    for i in 0..8 {
      assert_eq!(a.add(i).read(), 0x11);
      assert_eq!(b.add(i).read(), 0x22);
    }

    assert!(allocator.check_heap("two_small_allocations_do_not_overlap"));
  }
}

#[test]
fn freed_block_is_reused_lifo() {
  let mut allocator = allocator();

  unsafe {
    let a = allocator.allocate(100);
    assert!(!a.is_null());

    allocator.release(a);

    let b = allocator.allocate(100);
    assert_eq!(a, b, "no intervening allocations, so the same block comes back");
  }
}

#[test]
fn split_serves_followup_requests_without_growth() {
  let mut allocator = allocator();

  unsafe {
    let big = allocator.allocate(4000);
    assert!(!big.is_null());

    allocator.release(big);
    let used = allocator.source().used();

    // both requests carve the freed block instead of growing the heap
    let small = allocator.allocate(8);
    let large = allocator.allocate(3900);

    assert!(!small.is_null());
    assert!(!large.is_null());
    assert_eq!(allocator.source().used(), used);

    assert!(allocator.check_heap("split_serves_followup_requests_without_growth"));
  }
}

#[test]
fn resize_to_zero_releases() {
  let mut allocator = allocator();

  unsafe {
    let a = allocator.allocate(100);
    assert!(!a.is_null());

    let r = allocator.resize(a, 0);
    assert!(r.is_null());

    // the block was released: the same request reuses it
    let b = allocator.allocate(100);
    assert_eq!(a, b);
  }
}

#[test]
fn resize_null_allocates() {
  let mut allocator = allocator();

  unsafe {
    let a = allocator.resize(std::ptr::null_mut(), 64);

    assert!(!a.is_null());
    assert_eq!(a as usize % GRANULARITY, 0);
  }
}

#[test]
fn resize_copies_min_of_old_and_new() {
  let mut allocator = allocator();

  unsafe {
    let a = allocator.allocate(64);
    for i in 0..64 {
      a.add(i).write(i as u8);
    }

    // shrink: only the first 8 bytes must survive
    let b = allocator.resize(a, 8);
    assert!(!b.is_null());
    for i in 0..8 {
      assert_eq!(b.add(i).read(), i as u8);
    }

    // grow: all 8 surviving bytes come along
    let c = allocator.resize(b, 256);
    assert!(!c.is_null());
    for i in 0..8 {
      assert_eq!(c.add(i).read(), i as u8);
    }

    assert!(allocator.check_heap("resize_copies_min_of_old_and_new"));
  }
}

#[test]
fn zeroed_allocate_rejects_zero_count_and_overflow() {
  let mut allocator = allocator();

  unsafe {
    assert!(allocator.allocate_zeroed(0, 8).is_null());
    assert!(allocator.allocate_zeroed(2, usize::MAX).is_null());
    assert!(allocator.allocate_zeroed(usize::MAX, usize::MAX).is_null());

    // rejections happen before the heap is even touched
    assert_eq!(allocator.source().used(), 0);

    assert!(!allocator.allocate_zeroed(4, 8).is_null());
  }
}

#[test]
fn zeroed_allocate_zero_fills() {
  let mut allocator = allocator();

  unsafe {
    let a = allocator.allocate(256);
    std::ptr::write_bytes(a, 0xFF, 256);
    allocator.release(a);

    let b = allocator.allocate_zeroed(32, 8);
    assert!(!b.is_null());

    for i in 0..256 {
      assert_eq!(b.add(i).read(), 0, "byte {i} not zeroed");
    }
  }
}

#[test]
fn alloc_release_loop_keeps_arena_bounded() {
  let mut allocator = allocator();

  unsafe {
    let first = allocator.allocate(100);
    allocator.release(first);

    let used = allocator.source().used();

    for _ in 0..1000 {
      let p = allocator.allocate(100);
      assert!(!p.is_null());
      allocator.release(p);
    }

    assert_eq!(
      allocator.source().used(),
      used,
      "steady-state churn must not grow the heap"
    );
  }
}

#[test]
fn mini_churn_keeps_arena_bounded() {
  let mut allocator = allocator();

  unsafe {
    let mut slots = [std::ptr::null_mut(); 8];

    for slot in &mut slots {
      *slot = allocator.allocate(8);
    }
    for slot in &mut slots {
      allocator.release(*slot);
    }

    let used = allocator.source().used();

    for _ in 0..1000 {
      for slot in &mut slots {
        *slot = allocator.allocate(8);
        assert!(!slot.is_null());
      }
      for slot in &mut slots {
        allocator.release(*slot);
      }
    }

    assert_eq!(allocator.source().used(), used);
    assert!(allocator.check_heap("mini_churn_keeps_arena_bounded"));
  }
}

#[test]
fn exhaustion_leaves_existing_blocks_intact() {
  let mut allocator = SegAllocator::with_source(ArenaSource::new(2048));

  unsafe {
    let a = allocator.allocate(64);
    assert!(!a.is_null());
    std::ptr::write_bytes(a, 0x5A, 64);

    // far beyond what the arena can grant
    assert!(allocator.allocate(1 << 30).is_null());

    for i in 0..64 {
      assert_eq!(a.add(i).read(), 0x5A);
    }

    // the allocator keeps working after reporting exhaustion
    let b = allocator.allocate(32);
    assert!(!b.is_null());

    assert!(allocator.check_heap("exhaustion_leaves_existing_blocks_intact"));
  }
}

#[test]
fn mixed_workload_stays_consistent() {
  let policy = Policy {
    growth_chunk: 512,
    fit_window: 3,
  };
  let mut allocator = SegAllocator::with_policy(ArenaSource::new(1 << 20), policy);

  unsafe {
    let mut live: Vec<(*mut u8, usize)> = Vec::new();

    // deterministic mix of sizes across every bucket class
    let sizes = [8, 24, 100, 8, 500, 48, 4000, 16, 72, 256, 8, 1500];

    for (round, &size) in sizes.iter().cycle().take(120).enumerate() {
      let p = allocator.allocate(size);
      assert!(!p.is_null());
      std::ptr::write_bytes(p, (round & 0xFF) as u8, size);
      live.push((p, size));

      // release every other round from the middle of the live set
      if round % 2 == 1 {
        let (victim, _) = live.swap_remove(live.len() / 2);
        allocator.release(victim);
      }

      assert!(allocator.check_heap("mixed_workload_stays_consistent"));
    }

    for (p, _) in live {
      allocator.release(p);
    }

    assert!(allocator.check_heap("mixed_workload_stays_consistent: drained"));
  }
}
