use std::{alloc::Layout, io::Read, ptr::NonNull};

use libc::sbrk;
use rstl::{Deque, PoolAlloc, Queue, Stack};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just watch how the pool statistics change between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(
  layout: Layout,
  block: NonNull<u8>,
) {
  println!(
    "    size = {:>5}, align = {:>3} -> {:?}",
    layout.size(),
    layout.align(),
    block
  );
}

fn print_stats(
  label: &str,
  pool: &PoolAlloc,
) {
  let stats = pool.stats();
  println!(
    "[{label}] acquired = {} B in {} chunks, pool region = {} B, refills = {}, small = {}/{}, large = {}/{}",
    stats.pool_total_acquired,
    stats.chunks,
    stats.pool_bytes,
    stats.refills,
    stats.small_allocations,
    stats.small_deallocations,
    stats.large_allocations,
    stats.large_deallocations,
  );
}

fn main() {
  // A pool with the default size classes: 8, 16, ..., 128 bytes.
  let pool = PoolAlloc::new();

  unsafe {
    print_program_break("start");
    print_stats("start", &pool);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) First small request: the 8-byte class is empty, so a chunk is
    //    taken from the system and a batch of blocks is threaded onto it.
    // --------------------------------------------------------------------
    let layout_u32 = Layout::new::<u32>();
    let first_block = pool.allocate(layout_u32).expect("pool allocation");
    println!("\n[1] Allocate u32 (rounded up to the 8-byte class)");
    print_alloc(layout_u32, first_block);
    print_stats("1", &pool);

    let first_ptr = first_block.as_ptr() as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());
    println!("[1] Blocks left on the 8-byte list = {}", pool.free_list_len(8));

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Another class: 12 bytes round up to 16 and refill that list from
    //    what is left of the pool region.
    // --------------------------------------------------------------------
    let layout_12_bytes = Layout::array::<u8>(12).expect("valid layout");
    let second_block = pool.allocate(layout_12_bytes).expect("pool allocation");
    println!("\n[2] Allocate [u8; 12]");
    print_alloc(layout_12_bytes, second_block);
    print_stats("2", &pool);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first block and ask for the same class again: the free
    //    list is LIFO, so the block comes straight back.
    // --------------------------------------------------------------------
    pool.deallocate(first_block, layout_u32);
    let third_block = pool.allocate(Layout::new::<[u8; 2]>()).expect("pool allocation");
    println!(
      "\n[3] Reallocated 2 bytes: {}",
      if third_block == first_block {
        "reused the freed block"
      } else {
        "got a different block"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Anything above 128 bytes goes to the malloc tier.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let layout_big = Layout::array::<u8>(64 * 1024).expect("valid layout");
    let big_block = pool.allocate(layout_big).expect("malloc tier allocation");
    println!("\n[4] Allocate large 64 KiB block");
    print_alloc(layout_big, big_block);
    print_program_break("after large alloc");
    print_stats("4", &pool);

    block_until_enter_pressed();

    pool.deallocate(big_block, layout_big);
    pool.deallocate(second_block, layout_12_bytes);
    pool.deallocate(third_block, Layout::new::<[u8; 2]>());
  }

  // ----------------------------------------------------------------------
  // 5) A deque on the same pool: 512-byte buffers come from malloc, the
  //    map of buffer pointers from the free lists.
  // ----------------------------------------------------------------------
  let mut deque: Deque<u64, &PoolAlloc> = Deque::new_in(&pool);
  for i in 0..1000 {
    deque.push_back(i);
    deque.push_front(i);
  }
  println!(
    "\n[5] Deque of {} elements: {} buffers of {}, map of {} slots",
    deque.len(),
    deque.buffer_count(),
    Deque::<u64, &PoolAlloc>::buffer_size(),
    deque.map_len(),
  );
  deque.erase_range(100..1900);
  println!("[5] After erasing 1800 elements: {} buffers", deque.buffer_count());
  deque.shrink_to_fit();
  println!("[5] After shrink_to_fit: {} buffers", deque.buffer_count());
  print_stats("5", &pool);

  block_until_enter_pressed();

  // ----------------------------------------------------------------------
  // 6) Adaptors on the default per-thread pool.
  // ----------------------------------------------------------------------
  let mut stack: Stack<&str> = Stack::new();
  let mut queue: Queue<&str> = Queue::new();
  for word in ["first", "second", "third"] {
    stack.push(word);
    queue.push(word);
  }
  println!(
    "\n[6] stack pops {:?}, queue pops {:?}",
    stack.pop(),
    queue.pop()
  );
  println!("[6] default pool: {:?}", rstl::default_pool_stats());

  println!("\n[7] End of example. Dropping the pool returns its chunks to the system.");
}
