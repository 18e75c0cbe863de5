//! # segalloc - A Segregated Free-List Memory Allocator
//!
//! This crate provides a **segregated free-list allocator** with boundary-tag
//! coalescing, managing a single contiguous, growable heap (by default via
//! the `sbrk` system call).
//!
//! ## Overview
//!
//! Free memory is tracked in two structures, picked by block size:
//!
//! ```text
//!   Segregated list (blocks ≥ 32 bytes, 14 size-class buckets):
//!
//!   bucket  0 [32]      ──▶ ┌────┐ ◀──▶ ┌────┐
//!   bucket  1 [33-64]       └────┘      └────┘
//!   bucket  2 [65-85]   ──▶ ┌────┐
//!   ...                     └────┘
//!   bucket 13 [8193-∞)  ──▶ ┌──────────────┐
//!                           └──────────────┘
//!
//!   Mini list (16-byte blocks, singly linked):
//!
//!   root ──▶ ┌────┐ ──▶ ┌────┐ ──▶ ┌────┐ ──▶ ∅
//!            └────┘     └────┘     └────┘
//! ```
//!
//! Allocation rounds the request up to a 16-byte granularity, runs a
//! *better-fit* search (take the first fit, then look a few entries further
//! for a tighter one), splits off any usable remainder, and grows the heap
//! only when every bucket comes up empty. Releasing a block immediately
//! merges it with free physical neighbors, so two adjacent free blocks never
//! coexist.
//!
//! ## Heap layout
//!
//! ```text
//!   Low Address                                              High Address
//!   ┌──────────┬─────────┬─────────┬─────────┬─────────┬──────────┐
//!   │ prologue │ block 1 │ block 2 │   ...   │ block N │ epilogue │
//!   │ (size 0) │         │         │         │         │ (size 0) │
//!   └──────────┴─────────┴─────────┴─────────┴─────────┴──────────┘
//!                                                       ▲
//!                                     rewritten on every heap growth
//! ```
//!
//! Every block starts with one metadata word packing its size with three
//! flags: its own allocation state, whether the *previous* block is
//! allocated, and whether that previous block is a 16-byte mini block. The
//! last two let release and coalesce find the predecessor without reading a
//! trailing tag that a mini block would not have. Free normal blocks mirror
//! their header into a trailing tag; free mini blocks carry only a single
//! forward link, trading O(n) list removal for 8 fewer bytes of overhead.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macro (align!)
//!   ├── header     - Bit-packed metadata word codec
//!   ├── block      - Block handle and boundary navigation (internal)
//!   ├── free_list  - Segregated list + mini list (internal)
//!   ├── source     - Heap growth seam (SbrkSource, ArenaSource)
//!   └── seg        - SegAllocator implementation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segalloc::SegAllocator;
//!
//! fn main() {
//!   let mut allocator = SegAllocator::new();
//!
//!   unsafe {
//!     // Allocate memory for a u64
//!     let ptr = allocator.allocate(8) as *mut u64;
//!
//!     // Use the memory
//!     *ptr = 42;
//!     println!("Value: {}", *ptr);
//!
//!     // Free the memory
//!     allocator.release(ptr as *mut u8);
//!   }
//! }
//! ```
//!
//! ## Features
//!
//! - **Better-fit search**: bounded lookahead after the first fit keeps
//!   fragmentation low without paying for a full best-fit scan
//! - **Boundary-tag coalescing**: freed blocks merge with their neighbors
//!   immediately
//! - **Mini blocks**: 16-byte allocations pay one word of overhead
//! - **Pluggable growth**: swap the program break for an in-memory arena
//!   through the `HeapSource` trait
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; wrap the
//!   allocator in a mutex to share it
//! - **Fixed alignment**: payloads are 16-byte aligned, nothing stronger
//! - **Trusting release**: freeing a foreign or already-freed pointer is
//!   undefined behavior and is not detected in release builds
//! - **Unix-only by default**: `SbrkSource` requires `libc` and `sbrk`
//!   (POSIX systems); `ArenaSource` works anywhere
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

pub mod align;
mod block;
mod free_list;
pub mod header;
mod seg;
mod source;

pub use seg::{Policy, SegAllocator};
pub use source::{ArenaSource, HeapSource, SbrkSource};
