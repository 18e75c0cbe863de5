use std::io::Read;
use std::ptr;

use libc::sbrk;
use segalloc::SegAllocator;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how allocations change the program
/// break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr,
    unsafe { sbrk(0) }
  );
}

fn main() {
  env_logger::init();

  // The segregated allocator. It grows the heap through sbrk in 512-byte
  // chunks and recycles freed blocks through its free lists, so most of the
  // steps below do not move the program break at all.
  let mut allocator = SegAllocator::new();

  unsafe {
    // Initial heap state
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 8 bytes: a mini block, one word of overhead.
    // --------------------------------------------------------------------
    let first_block = allocator.allocate(8);
    println!("\n[1] Allocate 8 bytes (mini block)");
    print_alloc(8, first_block);

    // Write something into the allocated memory to show it's usable.
    let first_ptr = first_block as *mut u64;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 100 bytes. Rounded up to a 112-byte block and split off
    //    the initial 512-byte chunk - the break should not move.
    // --------------------------------------------------------------------
    let second_block = allocator.allocate(100);
    println!("\n[2] Allocate 100 bytes (split, no heap growth)");
    print_alloc(100, second_block);

    ptr::write_bytes(second_block, 0xAB, 100);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Check alignment: every payload is 16-byte aligned.
    // --------------------------------------------------------------------
    println!("\n[3] Alignment check");
    for (label, addr) in [("first", first_block), ("second", second_block)] {
      println!(
        "[3] {} block address = {:#X}, addr % 16 = {}",
        label,
        addr as usize,
        addr as usize % 16
      );
    }

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Release the second block and allocate the same size again: the
    //    freed block coalesces with the remainder and is handed right back.
    // --------------------------------------------------------------------
    allocator.release(second_block);
    println!("\n[4] Released second_block at {:?}", second_block);

    let third_block = allocator.allocate(100);
    print_alloc(100, third_block);
    println!(
      "[4] third_block == second_block? {}",
      if third_block == second_block {
        "Yes, it reused the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Resize: the data moves to a fresh block, contents preserved.
    // --------------------------------------------------------------------
    let resized = allocator.resize(third_block, 3000);
    println!("\n[5] Resize 100 -> 3000 bytes");
    print_alloc(3000, resized);
    println!("[5] first byte after resize = 0x{:X}", resized.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Zeroed allocation.
    // --------------------------------------------------------------------
    let zeroed = allocator.allocate_zeroed(16, 8);
    println!("\n[6] allocate_zeroed(16, 8)");
    print_alloc(128, zeroed);
    println!(
      "[6] all zero? {}",
      (0..128).all(|i| zeroed.add(i).read() == 0)
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) Allocate a large block to observe heap growth.
    //    This usually changes the result of `sbrk(0)`.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big_block = allocator.allocate(64 * 1024);
    println!("\n[7] Allocate large 64 KiB block");
    print_alloc(64 * 1024, big_block);

    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 8) End of demo.
    //
    //    Freed blocks return to the free lists; the OS reclaims the whole
    //    heap when the process exits.
    // --------------------------------------------------------------------
    allocator.release(first_block);
    allocator.release(resized);
    allocator.release(zeroed);
    allocator.release(big_block);
    println!("\n[8] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
