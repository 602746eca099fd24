//! Tier 1: a thin wrapper over the system allocator with an
//! out-of-memory retry hook.
//!
//! ```text
//!   allocate(layout)
//!        │
//!        ▼
//!   system malloc ──ok──▶ block
//!        │ null
//!        ▼
//!   ┌──────────────────────────────┐
//!   │ handler installed?  ──no──▶  Err(OutOfMemory)
//!   │      │ yes                   │
//!   │      ▼                       │
//!   │ handler() == false ──▶ Err   │
//!   │      │ true                  │
//!   │      ▼                       │
//!   │ retry system malloc ──ok──▶ block
//!   └──────────┬───────────────────┘
//!              └── null: loop
//! ```

use std::alloc::Layout;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use libc::c_void;
use tracing::{error, warn};

use crate::error::AllocError;

/// Alignment every `malloc` result satisfies.
pub const MALLOC_ALIGN: usize = mem::align_of::<libc::max_align_t>();

/// Called when the system allocator fails. Returns `true` if it released
/// memory and the request should be retried, `false` if nothing more can
/// be freed.
pub type OomHandler = Box<dyn FnMut() -> bool>;

/// The raw system calls behind Tier 1.
///
/// Implementations return null on failure and never retry on their own.
///
/// # Safety
///
/// Non-null results must be valid for `layout.size()` bytes and aligned to
/// `layout.align()`, and must stay valid until passed to `free`.
pub unsafe trait SystemAlloc {
  fn malloc(
    &self,
    layout: Layout,
  ) -> *mut u8;

  /// Resizes a block obtained from `malloc` with `old`.
  ///
  /// # Safety
  ///
  /// `ptr` must come from this allocator with layout `old`.
  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    old: Layout,
    new_size: usize,
  ) -> *mut u8;

  /// # Safety
  ///
  /// `ptr` must come from this allocator with layout `layout`.
  unsafe fn free(
    &self,
    ptr: *mut u8,
    layout: Layout,
  );
}

/// `SystemAlloc` backed by the C library.
#[derive(Clone, Copy, Debug, Default)]
pub struct Libc;

unsafe impl SystemAlloc for Libc {
  fn malloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    let size = layout.size().max(1);
    unsafe {
      if layout.align() <= MALLOC_ALIGN {
        return libc::malloc(size) as *mut u8;
      }

      let mut out: *mut c_void = ptr::null_mut();
      if libc::posix_memalign(&mut out, layout.align(), size) != 0 {
        return ptr::null_mut();
      }
      out as *mut u8
    }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    old: Layout,
    new_size: usize,
  ) -> *mut u8 {
    unsafe {
      if old.align() <= MALLOC_ALIGN {
        return libc::realloc(ptr as *mut c_void, new_size.max(1)) as *mut u8;
      }

      // posix_memalign blocks cannot be resized in place with alignment
      // preserved.
      let Ok(new_layout) = Layout::from_size_align(new_size, old.align()) else {
        return ptr::null_mut();
      };
      let fresh = self.malloc(new_layout);
      if !fresh.is_null() {
        ptr::copy_nonoverlapping(ptr, fresh, old.size().min(new_size));
        libc::free(ptr as *mut c_void);
      }
      fresh
    }
  }

  unsafe fn free(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { libc::free(ptr as *mut c_void) }
  }
}

/// Tier-1 allocator: system memory plus a single out-of-memory handler
/// slot.
///
/// The handler slot is plain interior state; the allocator is `!Sync` and
/// meant for one thread.
pub struct MallocAlloc<S: SystemAlloc = Libc> {
  system: S,
  oom_handler: RefCell<Option<OomHandler>>,
}

impl MallocAlloc<Libc> {
  pub fn new() -> Self {
    Self::with_system(Libc)
  }
}

impl Default for MallocAlloc<Libc> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: SystemAlloc> fmt::Debug for MallocAlloc<S> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("MallocAlloc")
      .field("oom_handler", &self.has_oom_handler())
      .finish()
  }
}

impl<S: SystemAlloc> MallocAlloc<S> {
  pub fn with_system(system: S) -> Self {
    Self {
      system,
      oom_handler: RefCell::new(None),
    }
  }

  pub fn system(&self) -> &S {
    &self.system
  }

  /// Installs `handler` and returns the previously installed one.
  pub fn set_oom_handler(
    &self,
    handler: Option<OomHandler>,
  ) -> Option<OomHandler> {
    mem::replace(&mut *self.oom_handler.borrow_mut(), handler)
  }

  pub fn has_oom_handler(&self) -> bool {
    self.oom_handler.borrow().is_some()
  }

  /// One attempt against the system allocator, without the handler loop.
  pub(crate) fn try_system(
    &self,
    layout: Layout,
  ) -> Option<NonNull<u8>> {
    NonNull::new(self.system.malloc(layout))
  }

  pub fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    if let Some(block) = self.try_system(layout) {
      return Ok(block);
    }
    self.retry_with_handler(layout, || self.system.malloc(layout))
  }

  /// Releases `ptr`. The size in `layout` is informational.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator for `layout`.
  pub unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    layout: Layout,
  ) {
    unsafe { self.system.free(ptr.as_ptr(), layout) }
  }

  /// Resizes `ptr` from `old` to `new_size` bytes, in place when the
  /// system allows it.
  ///
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
    let new_layout =
      Layout::from_size_align(new_size, old.align()).map_err(|_| AllocError::CapacityOverflow)?;

    let resized = unsafe { self.system.realloc(ptr.as_ptr(), old, new_size) };
    if let Some(block) = NonNull::new(resized) {
      return Ok(block);
    }
    self.retry_with_handler(new_layout, || unsafe {
      self.system.realloc(ptr.as_ptr(), old, new_size)
    })
  }

  fn retry_with_handler(
    &self,
    layout: Layout,
    mut attempt: impl FnMut() -> *mut u8,
  ) -> Result<NonNull<u8>, AllocError> {
    loop {
      // The handler is taken out of its slot while it runs so it may
      // allocate or replace itself.
      let Some(mut handler) = self.oom_handler.borrow_mut().take() else {
        error!(size = layout.size(), align = layout.align(), "allocation failed, no out-of-memory handler");
        return Err(AllocError::out_of_memory(layout));
      };

      warn!(size = layout.size(), "system allocator exhausted, running out-of-memory handler");
      let released = handler();

      {
        let mut slot = self.oom_handler.borrow_mut();
        if slot.is_none() {
          *slot = Some(handler);
        }
      }

      if !released {
        error!(size = layout.size(), align = layout.align(), "out-of-memory handler could not release memory");
        return Err(AllocError::out_of_memory(layout));
      }

      if let Some(block) = NonNull::new(attempt()) {
        return Ok(block);
      }
    }
  }
}
