//! The allocator contract the containers are written against.

use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::AllocError;
use crate::malloc::{MallocAlloc, OomHandler, SystemAlloc};
use crate::pool::{PoolAlloc, PoolStats};

/// Untyped block allocation.
///
/// # Safety
///
/// Implementations must return blocks valid for `layout.size()` bytes and
/// aligned to `layout.align()`, which stay valid until deallocated through
/// the same allocator (or a clone of the same handle).
pub unsafe trait RawAlloc {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError>;

  /// # Safety
  ///
  /// `ptr` must come from `allocate`/`reallocate` on this allocator with
  /// `layout`.
  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  );

  /// Resizes `ptr` to `new_size` bytes keeping `old.align()`, preserving
  /// the first `min(old.size(), new_size)` bytes.
  ///
  /// # Safety
  ///
  /// `ptr` must come from this allocator with `old`. On success `ptr` must
  /// no longer be used; on failure it is untouched.
  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError>;
}

unsafe impl<S: SystemAlloc> RawAlloc for PoolAlloc<S> {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    PoolAlloc::allocate(self, layout)
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    unsafe { PoolAlloc::deallocate(self, ptr, layout) }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { PoolAlloc::reallocate(self, ptr, old, new_size) }
  }
}

unsafe impl<S: SystemAlloc> RawAlloc for MallocAlloc<S> {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    MallocAlloc::allocate(self, layout)
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    unsafe { MallocAlloc::deallocate(self, ptr, layout) }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { MallocAlloc::reallocate(self, ptr, old, new_size) }
  }
}

unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &A {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    (**self).allocate(layout)
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    unsafe { (**self).deallocate(ptr, layout) }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { (**self).reallocate(ptr, old, new_size) }
  }
}

unsafe impl<A: RawAlloc + ?Sized> RawAlloc for Rc<A> {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    (**self).allocate(layout)
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    unsafe { (**self).deallocate(ptr, layout) }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { (**self).reallocate(ptr, old, new_size) }
  }
}

thread_local! {
  // Never dropped: blocks handed out by this pool may be released from
  // thread-local destructors that run after it.
  static DEFAULT_POOL: ManuallyDrop<PoolAlloc> = ManuallyDrop::new(PoolAlloc::new());
}

/// Handle to the calling thread's lazily created `PoolAlloc`.
///
/// The pool lives until the thread exits and is never torn down, so blocks
/// stay valid even when a container is moved to and dropped on another
/// thread (the block then joins that thread's free lists).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultAlloc;

unsafe impl RawAlloc for DefaultAlloc {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    DEFAULT_POOL.with(|pool| pool.allocate(layout))
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    DEFAULT_POOL.with(|pool| unsafe { pool.deallocate(ptr, layout) })
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    DEFAULT_POOL.with(|pool| unsafe { pool.reallocate(ptr, old, new_size) })
  }
}

/// Installs the out-of-memory handler of this thread's default pool and
/// returns the previous one.
pub fn set_oom_handler(handler: Option<OomHandler>) -> Option<OomHandler> {
  DEFAULT_POOL.with(|pool| pool.set_oom_handler(handler))
}

/// Statistics of this thread's default pool.
pub fn default_pool_stats() -> PoolStats {
  DEFAULT_POOL.with(|pool| pool.stats())
}

/// Typed array allocation on top of a `RawAlloc`, shared by the
/// containers.
pub(crate) fn allocate_array<T, A: RawAlloc + ?Sized>(
  alloc: &A,
  count: usize,
) -> Result<NonNull<T>, AllocError> {
  let layout = Layout::array::<T>(count).map_err(|_| AllocError::CapacityOverflow)?;
  alloc.allocate(layout).map(NonNull::cast)
}

/// # Safety
///
/// `ptr` must come from `allocate_array::<T>(alloc, count)`.
pub(crate) unsafe fn deallocate_array<T, A: RawAlloc + ?Sized>(
  alloc: &A,
  ptr: NonNull<T>,
  count: usize,
) {
  // The layout was valid when the block was allocated.
  let layout = unsafe { Layout::from_size_align_unchecked(count * size_of::<T>(), align_of::<T>()) };
  unsafe { alloc.deallocate(ptr.cast(), layout) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_alloc_uses_thread_pool() {
    let before = default_pool_stats().small_allocations;

    let block = allocate_array::<u64, _>(&DefaultAlloc, 4).unwrap();
    unsafe {
      block.as_ptr().write(7);
      assert_eq!(block.as_ptr().read(), 7);
      deallocate_array(&DefaultAlloc, block, 4);
    }

    assert_eq!(default_pool_stats().small_allocations, before + 1);
  }

  #[test]
  fn test_shared_handles() {
    let pool = Rc::new(PoolAlloc::new());
    let handle = pool.clone();

    let block = allocate_array::<u32, _>(&handle, 8).unwrap();
    unsafe { deallocate_array(&*pool, block, 8) };

    assert_eq!(pool.free_list_len(32), 20);
    let by_ref: &PoolAlloc = &pool;
    let again = allocate_array::<u32, _>(&by_ref, 8).unwrap();
    assert_eq!(again, block);
    unsafe { deallocate_array(&by_ref, again, 8) };
  }

  #[test]
  fn test_array_overflow() {
    assert_eq!(
      allocate_array::<u64, _>(&DefaultAlloc, usize::MAX / 2),
      Err(AllocError::CapacityOverflow)
    );
  }

  #[test]
  fn test_default_oom_handler_slot() {
    assert!(set_oom_handler(Some(Box::new(|| false))).is_none());
    assert!(set_oom_handler(None).is_some());
  }
}
