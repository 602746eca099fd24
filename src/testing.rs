//! Failure-injection helpers shared by the unit tests.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr;
use std::rc::Rc;

use crate::malloc::{Libc, SystemAlloc};

#[derive(Default)]
struct Budget {
  remaining: Cell<Option<usize>>,
  calls: Cell<usize>,
  frees: Cell<usize>,
}

/// `SystemAlloc` that serves a fixed number of requests from the C library
/// and returns null afterwards until topped up with `allow`.
#[derive(Clone, Default)]
pub(crate) struct FlakySystem {
  budget: Rc<Budget>,
}

impl FlakySystem {
  pub fn failing_after(successes: usize) -> Self {
    let system = Self::default();
    system.budget.remaining.set(Some(successes));
    system
  }

  pub fn unlimited() -> Self {
    Self::default()
  }

  pub fn allow(
    &self,
    more: usize,
  ) {
    let remaining = self.budget.remaining.get().map(|left| left + more);
    self.budget.remaining.set(remaining);
  }

  /// Requests that reached the system, successful or not.
  pub fn calls(&self) -> usize {
    self.budget.calls.get()
  }

  pub fn frees(&self) -> usize {
    self.budget.frees.get()
  }

  fn admit(&self) -> bool {
    self.budget.calls.set(self.budget.calls.get() + 1);
    match self.budget.remaining.get() {
      None => true,
      Some(0) => false,
      Some(left) => {
        self.budget.remaining.set(Some(left - 1));
        true
      }
    }
  }
}

unsafe impl SystemAlloc for FlakySystem {
  fn malloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if !self.admit() {
      return ptr::null_mut();
    }
    Libc.malloc(layout)
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    old: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if !self.admit() {
      return ptr::null_mut();
    }
    unsafe { Libc.realloc(ptr, old, new_size) }
  }

  unsafe fn free(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    self.budget.frees.set(self.budget.frees.get() + 1);
    unsafe { Libc.free(ptr, layout) }
  }
}

/// Counts live instances so tests can check nothing leaks or is dropped
/// twice.
#[derive(Clone, Default)]
pub(crate) struct DropCounter {
  live: Rc<Cell<isize>>,
}

impl DropCounter {
  pub fn track(
    &self,
    value: i32,
  ) -> Tracked {
    self.live.set(self.live.get() + 1);
    Tracked {
      value,
      live: self.live.clone(),
    }
  }

  pub fn live(&self) -> isize {
    self.live.get()
  }
}

#[derive(Debug)]
pub(crate) struct Tracked {
  pub value: i32,
  live: Rc<Cell<isize>>,
}

impl Clone for Tracked {
  fn clone(&self) -> Self {
    self.live.set(self.live.get() + 1);
    Self {
      value: self.value,
      live: self.live.clone(),
    }
  }
}

impl Drop for Tracked {
  fn drop(&mut self) {
    self.live.set(self.live.get() - 1);
  }
}

impl PartialEq for Tracked {
  fn eq(
    &self,
    other: &Self,
  ) -> bool {
    self.value == other.value
  }
}

/// Element whose `clone` panics on the `n`-th call across all clones.
#[derive(Debug)]
pub(crate) struct PanicOnClone {
  pub value: i32,
  clones: Rc<Cell<usize>>,
  panic_at: usize,
}

impl PanicOnClone {
  pub fn new(
    value: i32,
    panic_at: usize,
  ) -> Self {
    Self {
      value,
      clones: Rc::new(Cell::new(0)),
      panic_at,
    }
  }
}

impl Clone for PanicOnClone {
  fn clone(&self) -> Self {
    let done = self.clones.get() + 1;
    self.clones.set(done);
    if done == self.panic_at {
      panic!("clone #{done} refused");
    }
    Self {
      value: self.value,
      clones: self.clones.clone(),
      panic_at: self.panic_at,
    }
  }
}
