//! Tier 2: size-class free lists carved out of a growable memory pool.
//!
//! ```text
//!   free_lists (one per size class, ALIGN bytes apart)
//!
//!    [0]   8B ─▶ □ ─▶ □ ─▶ ∅
//!    [1]  16B ─▶ ∅
//!    [2]  24B ─▶ □ ─▶ ∅
//!    ...
//!   [15] 128B ─▶ □ ─▶ □ ─▶ □ ─▶ ∅
//!
//!   pool region (uncommitted, sliced on refill)
//!
//!   ┌────────────────────────────┬──────────────────────────────┐
//!   │ blocks already handed out  │          free space          │
//!   └────────────────────────────┴──────────────────────────────┘
//!                                ▲                              ▲
//!                           pool_start                      pool_end
//! ```
//!
//! A request that fits a size class pops the head of its list. An empty
//! list is refilled with a batch of blocks sliced from the pool region; an
//! exhausted region grows by `2 * wanted + (acquired >> shift)` bytes taken
//! from the system. Requests above `max_bytes` go to the malloc tier.

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::{self, NonNull};

use tracing::{debug, trace, warn};

use crate::align::bucket_index;
use crate::align_to;
use crate::block::FreeNode;
use crate::config::PoolConfig;
use crate::error::{AllocError, ConfigError};
use crate::malloc::{Libc, MallocAlloc, OomHandler, SystemAlloc};

/// Counters describing a pool's history and current shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
  /// Bytes taken from the system for the pool region. Never decreases.
  pub pool_total_acquired: usize,
  /// Bytes still unsliced in the pool region.
  pub pool_bytes: usize,
  /// Chunks obtained from the system.
  pub chunks: usize,
  pub small_allocations: u64,
  pub small_deallocations: u64,
  pub large_allocations: u64,
  pub large_deallocations: u64,
  /// Times an empty free list was refilled from the pool region.
  pub refills: u64,
  /// Times a free block of a larger class became the pool region after
  /// the system refused to grow it.
  pub scavenges: u64,
}

/// The two-tier allocator: free lists for small blocks, `MallocAlloc` for
/// everything else and as the last resort when the pool cannot grow.
///
/// Single-threaded: all state lives in `Cell`s, so the type is neither
/// `Send` nor `Sync`. Chunks taken from the system are released on drop.
pub struct PoolAlloc<S: SystemAlloc = Libc> {
  config: PoolConfig,
  malloc: MallocAlloc<S>,
  free_lists: Box<[Cell<*mut FreeNode>]>,
  pool_start: Cell<*mut u8>,
  pool_end: Cell<*mut u8>,
  chunks: RefCell<Vec<(NonNull<u8>, Layout)>>,
  stats: Cell<PoolStats>,
}

impl PoolAlloc<Libc> {
  pub fn new() -> Self {
    Self::build(Libc, PoolConfig::default())
  }

  pub fn with_config(config: PoolConfig) -> Result<Self, ConfigError> {
    Self::with_system(Libc, config)
  }
}

impl Default for PoolAlloc<Libc> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: SystemAlloc> fmt::Debug for PoolAlloc<S> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("PoolAlloc")
      .field("config", &self.config)
      .field("stats", &self.stats())
      .finish()
  }
}

impl<S: SystemAlloc> PoolAlloc<S> {
  pub fn with_system(
    system: S,
    config: PoolConfig,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self::build(system, config))
  }

  fn build(
    system: S,
    config: PoolConfig,
  ) -> Self {
    let free_lists = (0..config.bucket_count())
      .map(|_| Cell::new(ptr::null_mut()))
      .collect();

    Self {
      config,
      malloc: MallocAlloc::with_system(system),
      free_lists,
      pool_start: Cell::new(ptr::null_mut()),
      pool_end: Cell::new(ptr::null_mut()),
      chunks: RefCell::new(Vec::new()),
      stats: Cell::new(PoolStats::default()),
    }
  }

  pub fn config(&self) -> &PoolConfig {
    &self.config
  }

  /// The fallback tier.
  pub fn malloc(&self) -> &MallocAlloc<S> {
    &self.malloc
  }

  /// Installs the out-of-memory handler of the fallback tier and returns
  /// the previous one.
  pub fn set_oom_handler(
    &self,
    handler: Option<OomHandler>,
  ) -> Option<OomHandler> {
    self.malloc.set_oom_handler(handler)
  }

  pub fn stats(&self) -> PoolStats {
    let mut stats = self.stats.get();
    stats.pool_bytes = self.pool_bytes();
    stats.chunks = self.chunks.borrow().len();
    stats
  }

  /// Blocks currently parked on the free list serving `bytes`.
  pub fn free_list_len(
    &self,
    bytes: usize,
  ) -> usize {
    if bytes == 0 || bytes > self.config.max_bytes {
      return 0;
    }

    let mut len = 0;
    let mut node = self.free_lists[self.bucket(bytes)].get();
    while !node.is_null() {
      len += 1;
      node = unsafe { (*node).next };
    }
    len
  }

  /// Whether `layout` is served by the free lists.
  #[inline]
  pub fn is_small(
    &self,
    layout: Layout,
  ) -> bool {
    layout.size() <= self.config.max_bytes && layout.align() <= self.config.align
  }

  /// Block size actually handed out for a small request of `size` bytes.
  #[inline]
  fn round_up(
    &self,
    size: usize,
  ) -> usize {
    align_to!(size.max(1), self.config.align)
  }

  #[inline]
  fn bucket(
    &self,
    size: usize,
  ) -> usize {
    bucket_index(size.max(1), self.config.align)
  }

  fn pool_bytes(&self) -> usize {
    self.pool_end.get() as usize - self.pool_start.get() as usize
  }

  fn record(
    &self,
    update: impl FnOnce(&mut PoolStats),
  ) {
    let mut stats = self.stats.get();
    update(&mut stats);
    self.stats.set(stats);
  }

  pub fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    if !self.is_small(layout) {
      self.record(|s| s.large_allocations += 1);
      return self.malloc.allocate(layout);
    }

    let size = self.round_up(layout.size());
    let list = &self.free_lists[self.bucket(size)];
    let head = list.get();

    let block = match NonNull::new(head) {
      Some(node) => {
        list.set(unsafe { (*node.as_ptr()).next });
        node.cast()
      }
      None => self.refill(size)?,
    };

    self.record(|s| s.small_allocations += 1);
    Ok(block)
  }

  /// Returns `ptr` to its size class, or to the malloc tier for large
  /// layouts. Blocks are never coalesced.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator for a layout that
  /// rounds to the same size class as `layout`.
  pub unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    if !self.is_small(layout) {
      self.record(|s| s.large_deallocations += 1);
      return unsafe { self.malloc.deallocate(ptr, layout) };
    }

    let list = &self.free_lists[self.bucket(layout.size())];
    let node = unsafe { FreeNode::init(ptr.as_ptr(), list.get()) };
    list.set(node);
    self.record(|s| s.small_deallocations += 1);
  }

  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator for `old`. On success
  /// `ptr` must no longer be used; on failure it is still valid.
  pub unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let new = Layout::from_size_align(new_size, old.align()).map_err(|_| AllocError::CapacityOverflow)?;

    match (self.is_small(old), self.is_small(new)) {
      (false, false) => return unsafe { self.malloc.reallocate(ptr, old, new_size) },
      (true, true) if self.round_up(old.size()) == self.round_up(new_size) => return Ok(ptr),
      _ => {}
    }

    let fresh = self.allocate(new)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old.size().min(new_size));
      self.deallocate(ptr, old);
    }
    Ok(fresh)
  }

  /// Slices a batch of `size`-byte blocks from the pool region, hands the
  /// first one out and threads the rest onto the free list.
  fn refill(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let mut count = self.config.refill_batch;
    let chunk = self.chunk_alloc(size, &mut count)?;
    self.record(|s| s.refills += 1);
    trace!(size, count, "refilled free list");

    if count == 1 {
      return Ok(chunk);
    }

    unsafe {
      let base = chunk.as_ptr();
      let mut next: *mut FreeNode = ptr::null_mut();
      for i in (1..count).rev() {
        next = FreeNode::init(base.add(i * size), next);
      }
      self.free_lists[self.bucket(size)].set(next);
    }
    Ok(chunk)
  }

  /// Takes `count` blocks of `size` bytes from the pool region, growing
  /// it if needed. On return `count` holds the number actually sliced,
  /// which is at least one.
  fn chunk_alloc(
    &self,
    size: usize,
    count: &mut usize,
  ) -> Result<NonNull<u8>, AllocError> {
    loop {
      let start = self.pool_start.get();
      let left = self.pool_bytes();
      let wanted = size.checked_mul(*count).ok_or(AllocError::CapacityOverflow)?;

      if left >= size {
        let taken = if left < wanted {
          *count = left / size;
          size * *count
        } else {
          wanted
        };
        self.pool_start.set(unsafe { start.add(taken) });
        // The region is never empty here, so `start` is non-null.
        return Ok(unsafe { NonNull::new_unchecked(start) });
      }

      if left > 0 {
        // Leftovers are always a whole number of size-class blocks.
        let list = &self.free_lists[self.bucket(left)];
        list.set(unsafe { FreeNode::init(start, list.get()) });
        trace!(bytes = left, "donated pool leftovers to free list");
      }
      self.pool_start.set(self.pool_end.get());

      let request = self.config.growth_request(wanted, self.stats.get().pool_total_acquired);
      let layout = Layout::from_size_align(request, self.config.align).map_err(|_| AllocError::CapacityOverflow)?;

      if let Some(chunk) = self.malloc.try_system(layout) {
        self.adopt_chunk(chunk, layout);
        continue;
      }

      if self.scavenge(size) {
        continue;
      }

      // Last resort: the malloc tier and its out-of-memory handler.
      let chunk = self.malloc.allocate(layout)?;
      self.adopt_chunk(chunk, layout);
    }
  }

  fn adopt_chunk(
    &self,
    chunk: NonNull<u8>,
    layout: Layout,
  ) {
    let start = chunk.as_ptr();
    self.pool_start.set(start);
    self.pool_end.set(unsafe { start.add(layout.size()) });
    self.chunks.borrow_mut().push((chunk, layout));
    self.record(|s| s.pool_total_acquired += layout.size());
    debug!(
      bytes = layout.size(),
      acquired = self.stats.get().pool_total_acquired,
      "grew memory pool"
    );
  }

  /// Turns one free block of class `size` or larger into the pool region.
  fn scavenge(
    &self,
    size: usize,
  ) -> bool {
    let align = self.config.align;
    let mut class = size;
    while class <= self.config.max_bytes {
      let list = &self.free_lists[self.bucket(class)];
      let head = list.get();
      if !head.is_null() {
        unsafe {
          list.set((*head).next);
          self.pool_start.set(head as *mut u8);
          self.pool_end.set((head as *mut u8).add(class));
        }
        self.record(|s| s.scavenges += 1);
        warn!(wanted = size, class, "system refused pool growth, reusing a free block");
        return true;
      }
      class += align;
    }
    false
  }
}

impl<S: SystemAlloc> Drop for PoolAlloc<S> {
  fn drop(&mut self) {
    for (chunk, layout) in self.chunks.get_mut().drain(..) {
      unsafe { self.malloc.deallocate(chunk, layout) };
    }
  }
}
