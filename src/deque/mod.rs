//! A double-ended sequence stored in fixed-size buffers.
//!
//! ```text
//!   map (array of buffer pointers, grows by reallocation)
//!   ┌────┬────┬────┬────┬────┬────┬────┬────┐
//!   │ ∅  │ sp │ B0 │ B1 │ B2 │ sp │ ∅  │ ∅  │
//!   └────┴────┴─┼──┴─┼──┴─┼──┴────┴────┴────┘
//!               │    │    │
//!               ▼    ▼    ▼
//!            ┌────┐┌────┐┌────┐
//!            │ ·  ││ d  ││ h  │
//!   begin ──▶│ a  ││ e  ││ i  │
//!            │ b  ││ f  ││ ·  │◀── end
//!            │ c  ││ g  ││ ·  │
//!            └────┘└────┘└────┘
//!
//!   sp = spare buffer kept next to the live range
//! ```
//!
//! Every buffer holds `buffer_size::<T>()` slots. The allocated entries of
//! the map always form one contiguous run that contains every buffer from
//! `begin` to `end`; the entries of that run outside the live range are
//! spares left behind by erasure and popping, reused before anything new
//! is allocated.
//!
//! `end` always points at an allocated slot (`end.cur < end.last`), so a
//! push at the back that would fill the last slot of a buffer secures the
//! next buffer first. Pushing at either end never moves elements, and
//! references to elements stay valid across pushes (not across inserts or
//! erases in the middle).
//!
//! Growth of the map copies the occupied run into a map at least twice as
//! large with the run centered, so both ends get room again. Every
//! capacity request either fully succeeds or leaves the container exactly
//! as it was.

mod cursor;
mod iter;

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Bound, Index, IndexMut, RangeBounds};
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::allocator::{DefaultAlloc, RawAlloc, allocate_array, deallocate_array};
use crate::error::{AllocError, InsertError};

pub use cursor::{BUFFER_BYTES, Cursor, buffer_size};
pub use iter::{IntoIter, Iter, IterMut};

use cursor::{RawCursor, copy_backward, copy_forward, drop_range};

/// Map slots allocated by a new deque.
pub const INIT_MAP_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
  Front,
  Back,
}

/// Map slots `[lo, hi)` whose buffers were created by one capacity
/// request.
#[derive(Clone, Copy, Debug)]
struct Reserved {
  lo: usize,
  hi: usize,
}

impl Reserved {
  const NONE: Self = Self { lo: 0, hi: 0 };
}

/// Uninitialized slots opened in the middle of the sequence.
struct Gap<T> {
  at: RawCursor<T>,
  index: usize,
  count: usize,
  side: Side,
  reserved: Reserved,
}

pub struct Deque<T, A: RawAlloc = DefaultAlloc> {
  begin: RawCursor<T>,
  end: RawCursor<T>,
  map: NonNull<*mut T>,
  map_size: usize,
  alloc: A,
  _marker: PhantomData<T>,
}

unsafe impl<T: Send, A: RawAlloc + Send> Send for Deque<T, A> {}
unsafe impl<T: Sync, A: RawAlloc + Sync> Sync for Deque<T, A> {}

fn allocate_map<T, A: RawAlloc>(
  alloc: &A,
  size: usize,
) -> Result<NonNull<*mut T>, AllocError> {
  let map = allocate_array::<*mut T, A>(alloc, size)?;
  unsafe { ptr::write_bytes(map.as_ptr(), 0, size) };
  Ok(map)
}

/// Unwraps the result of an insertion whose generator cannot fail.
fn expect_alloc<R>(result: Result<R, InsertError<Infallible>>) -> R {
  match result {
    Ok(value) => value,
    Err(InsertError::Alloc(err)) => err.handle(),
    Err(InsertError::Construction(never)) => match never {},
  }
}

impl<T> Deque<T> {
  /// Empty deque on this thread's default pool.
  pub fn new() -> Self {
    Self::new_in(DefaultAlloc)
  }

  /// Empty deque with buffers for `capacity` pushes at the back.
  pub fn with_capacity(capacity: usize) -> Self {
    Self::with_capacity_in(capacity, DefaultAlloc)
  }

  /// `len` default values.
  pub fn with_len(len: usize) -> Self
  where
    T: Default,
  {
    let mut deque = Self::with_capacity(len);
    deque.resize_with(len, T::default);
    deque
  }

  /// `len` clones of `value`.
  pub fn from_elem(
    value: T,
    len: usize,
  ) -> Self
  where
    T: Clone,
  {
    let mut deque = Self::with_capacity(len);
    deque.resize(len, value);
    deque
  }
}

impl<T> Default for Deque<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, A: RawAlloc> Deque<T, A> {
  const ELEMENT_CHECK: () = assert!(size_of::<T>() != 0, "Deque does not support zero-sized elements");
  const BUFFER_SIZE: usize = buffer_size::<T>();

  pub fn new_in(alloc: A) -> Self {
    Self::with_capacity_in(0, alloc)
  }

  pub fn try_new_in(alloc: A) -> Result<Self, AllocError> {
    Self::try_with_capacity_in(0, alloc)
  }

  pub fn with_capacity_in(
    capacity: usize,
    alloc: A,
  ) -> Self {
    Self::try_with_capacity_in(capacity, alloc).unwrap_or_else(|err| err.handle())
  }

  /// Allocates the map and the buffers for `capacity` elements. The
  /// buffers sit in the middle of the map so either end can grow.
  pub fn try_with_capacity_in(
    capacity: usize,
    alloc: A,
  ) -> Result<Self, AllocError> {
    let () = Self::ELEMENT_CHECK;

    let nodes = capacity / Self::BUFFER_SIZE + 1;
    let map_size = nodes
      .checked_add(2)
      .ok_or(AllocError::CapacityOverflow)?
      .max(INIT_MAP_SIZE);
    let map = allocate_map::<T, A>(&alloc, map_size)?;

    let start = (map_size - nodes) / 2;
    for filled in 0..nodes {
      match allocate_array::<T, A>(&alloc, Self::BUFFER_SIZE) {
        Ok(buffer) => unsafe { *map.as_ptr().add(start + filled) = buffer.as_ptr() },
        Err(err) => {
          unsafe {
            for slot in start..start + filled {
              let buffer = NonNull::new_unchecked(*map.as_ptr().add(slot));
              deallocate_array(&alloc, buffer, Self::BUFFER_SIZE);
            }
            deallocate_array(&alloc, map, map_size);
          }
          return Err(err);
        }
      }
    }

    let begin = unsafe { RawCursor::at(map.as_ptr().add(start), 0) };
    Ok(Self {
      begin,
      end: begin,
      map,
      map_size,
      alloc,
      _marker: PhantomData,
    })
  }

  /// Elements per buffer.
  pub const fn buffer_size() -> usize {
    Self::BUFFER_SIZE
  }

  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  /// Slots in the map.
  pub fn map_len(&self) -> usize {
    self.map_size
  }

  /// Allocated buffers, spares included.
  pub fn buffer_count(&self) -> usize {
    let (lo, hi) = self.occupied_run();
    hi - lo + 1
  }

  pub fn len(&self) -> usize {
    unsafe { self.end.distance(&self.begin) as usize }
  }

  pub fn is_empty(&self) -> bool {
    self.begin.cur == self.end.cur
  }

  pub fn begin(&self) -> Cursor<'_, T, A> {
    Cursor::new(self, self.begin)
  }

  pub fn end(&self) -> Cursor<'_, T, A> {
    Cursor::new(self, self.end)
  }

  /// Cursor at `index`; `index == len()` gives `end()`.
  ///
  /// # Panics
  ///
  /// If `index > len()`.
  pub fn cursor(
    &self,
    index: usize,
  ) -> Cursor<'_, T, A> {
    self.check_insert_index(index);
    Cursor::new(self, unsafe { self.begin.offset(index as isize) })
  }

  pub fn iter(&self) -> Iter<'_, T> {
    Iter::new(self.begin, self.end, self.len())
  }

  pub fn iter_mut(&mut self) -> IterMut<'_, T> {
    IterMut::new(self.begin, self.end, self.len())
  }

  pub fn get(
    &self,
    index: usize,
  ) -> Option<&T> {
    if index >= self.len() {
      return None;
    }
    Some(unsafe { self.get_unchecked(index) })
  }

  pub fn get_mut(
    &mut self,
    index: usize,
  ) -> Option<&mut T> {
    if index >= self.len() {
      return None;
    }
    Some(unsafe { self.get_unchecked_mut(index) })
  }

  /// # Safety
  ///
  /// `index` must be below `len()`.
  pub unsafe fn get_unchecked(
    &self,
    index: usize,
  ) -> &T {
    unsafe { &*self.begin.offset(index as isize).cur }
  }

  /// # Safety
  ///
  /// `index` must be below `len()`.
  pub unsafe fn get_unchecked_mut(
    &mut self,
    index: usize,
  ) -> &mut T {
    unsafe { &mut *self.begin.offset(index as isize).cur }
  }

  pub fn front(&self) -> Option<&T> {
    if self.is_empty() {
      return None;
    }
    Some(unsafe { &*self.begin.cur })
  }

  pub fn front_mut(&mut self) -> Option<&mut T> {
    if self.is_empty() {
      return None;
    }
    Some(unsafe { &mut *self.begin.cur })
  }

  pub fn back(&self) -> Option<&T> {
    if self.is_empty() {
      return None;
    }
    Some(unsafe { &*self.back_ptr() })
  }

  pub fn back_mut(&mut self) -> Option<&mut T> {
    if self.is_empty() {
      return None;
    }
    Some(unsafe { &mut *self.back_ptr() })
  }

  pub fn push_back(
    &mut self,
    value: T,
  ) {
    self.try_push_back(value).unwrap_or_else(|err| err.handle())
  }

  /// Appends `value`. On failure nothing changed and `value` is dropped.
  pub fn try_push_back(
    &mut self,
    value: T,
  ) -> Result<(), AllocError> {
    unsafe {
      if self.end.cur != self.end.last.sub(1) {
        self.end.cur.write(value);
        self.end.cur = self.end.cur.add(1);
      } else {
        self.require_capacity(1, Side::Back)?;
        self.end.cur.write(value);
        self.end.step_forward();
      }
    }
    Ok(())
  }

  pub fn push_front(
    &mut self,
    value: T,
  ) {
    self.try_push_front(value).unwrap_or_else(|err| err.handle())
  }

  /// Prepends `value`. On failure nothing changed and `value` is dropped.
  pub fn try_push_front(
    &mut self,
    value: T,
  ) -> Result<(), AllocError> {
    unsafe {
      if self.begin.cur != self.begin.first {
        self.begin.cur = self.begin.cur.sub(1);
      } else {
        self.require_capacity(1, Side::Front)?;
        self.begin.step_backward();
      }
      self.begin.cur.write(value);
    }
    Ok(())
  }

  /// Appends the value built by `make` and returns it.
  pub fn emplace_back(
    &mut self,
    make: impl FnOnce() -> T,
  ) -> &mut T {
    expect_alloc(self.try_emplace_back(|| Ok(make())))
  }

  pub fn try_emplace_back<E>(
    &mut self,
    make: impl FnOnce() -> Result<T, E>,
  ) -> Result<&mut T, InsertError<E>> {
    let value = make().map_err(InsertError::Construction)?;
    self.try_push_back(value)?;
    Ok(unsafe { &mut *self.back_ptr() })
  }

  /// Prepends the value built by `make` and returns it.
  pub fn emplace_front(
    &mut self,
    make: impl FnOnce() -> T,
  ) -> &mut T {
    expect_alloc(self.try_emplace_front(|| Ok(make())))
  }

  pub fn try_emplace_front<E>(
    &mut self,
    make: impl FnOnce() -> Result<T, E>,
  ) -> Result<&mut T, InsertError<E>> {
    let value = make().map_err(InsertError::Construction)?;
    self.try_push_front(value)?;
    Ok(unsafe { &mut *self.begin.cur })
  }

  /// Removes the last element. A buffer emptied by this is freed unless
  /// the slot past it already holds a spare.
  pub fn pop_back(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    unsafe {
      if self.end.cur != self.end.first {
        self.end.cur = self.end.cur.sub(1);
      } else {
        let vacated = self.end.node;
        self.end.step_backward();
        self.retire_buffer(vacated, Side::Back);
      }
      Some(self.end.cur.read())
    }
  }

  /// Removes the first element. A buffer emptied by this is freed unless
  /// the slot before it already holds a spare.
  pub fn pop_front(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    unsafe {
      let value = self.begin.cur.read();
      if self.begin.cur != self.begin.last.sub(1) {
        self.begin.cur = self.begin.cur.add(1);
      } else {
        let vacated = self.begin.node;
        self.begin.step_forward();
        self.retire_buffer(vacated, Side::Front);
      }
      Some(value)
    }
  }

  /// Inserts `value` before position `index`, shifting whichever side of
  /// the sequence is shorter.
  ///
  /// # Panics
  ///
  /// If `index > len()`.
  pub fn insert(
    &mut self,
    index: usize,
    value: T,
  ) {
    self.try_insert(index, value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_insert(
    &mut self,
    index: usize,
    value: T,
  ) -> Result<(), AllocError> {
    self.check_insert_index(index);
    unsafe {
      let gap = self.open_gap(index, 1)?;
      gap.at.cur.write(value);
    }
    Ok(())
  }

  /// Inserts the value built by `make` at `index` and returns it.
  pub fn emplace(
    &mut self,
    index: usize,
    make: impl FnOnce() -> T,
  ) -> &mut T {
    self.check_insert_index(index);
    let value = make();
    self.insert(index, value);
    unsafe { self.get_unchecked_mut(index) }
  }

  /// Inserts `count` clones of `value` at `index`.
  pub fn insert_n(
    &mut self,
    index: usize,
    count: usize,
    value: T,
  ) where
    T: Clone,
  {
    expect_alloc(self.try_insert_with(index, count, || Ok(value.clone())));
  }

  /// Inserts the items of `items` at `index`, in order.
  pub fn insert_iter<I>(
    &mut self,
    index: usize,
    items: I,
  ) where
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
  {
    let mut items = items.into_iter();
    let count = items.len();
    expect_alloc(self.try_insert_with(index, count, || match items.next() {
      Some(item) => Ok(item),
      None => panic!("ExactSizeIterator yielded fewer than its reported {count} items"),
    }));
  }

  /// Inserts a copy of `items` at `index` with one bulk copy per buffer.
  pub fn insert_slice(
    &mut self,
    index: usize,
    items: &[T],
  ) where
    T: Copy,
  {
    self.check_insert_index(index);
    if items.is_empty() {
      return;
    }
    unsafe {
      let gap = self.open_gap(index, items.len()).unwrap_or_else(|err| err.handle());
      let mut dst = gap.at;
      let mut rest = items;
      loop {
        let chunk = rest.len().min(dst.room());
        ptr::copy_nonoverlapping(rest.as_ptr(), dst.cur, chunk);
        rest = &rest[chunk..];
        if rest.is_empty() {
          break;
        }
        dst = dst.offset(chunk as isize);
      }
    }
  }

  /// Inserts `count` values produced by `make` at `index`.
  ///
  /// If `make` fails or panics, the values built so far are dropped, the
  /// shifted elements move back and buffers allocated for the insertion
  /// are released: the deque is left as it was.
  ///
  /// # Panics
  ///
  /// If `index > len()`.
  pub fn try_insert_with<E, F>(
    &mut self,
    index: usize,
    count: usize,
    mut make: F,
  ) -> Result<(), InsertError<E>>
  where
    F: FnMut() -> Result<T, E>,
  {
    self.check_insert_index(index);
    if count == 0 {
      return Ok(());
    }

    let gap = unsafe { self.open_gap(index, count)? };
    let mut slot = gap.at;
    let mut guard = FillGuard {
      deque: self,
      gap,
      written: 0,
    };
    while guard.written < count {
      let value = make().map_err(InsertError::Construction)?;
      unsafe {
        slot.cur.write(value);
        guard.written += 1;
        slot.step_forward();
      }
    }
    Ok(())
  }

  /// Removes and returns the element at `index`, shifting the shorter
  /// side.
  pub fn remove(
    &mut self,
    index: usize,
  ) -> Option<T> {
    if index >= self.len() {
      return None;
    }
    unsafe {
      let value = self.begin.offset(index as isize).cur.read();
      self.close_hole(index, 1);
      Some(value)
    }
  }

  /// Drops the element at `index`.
  ///
  /// # Panics
  ///
  /// If `index >= len()`.
  pub fn erase(
    &mut self,
    index: usize,
  ) {
    let len = self.len();
    match self.remove(index) {
      Some(value) => drop(value),
      None => panic!("erase index (is {index}) should be < len (is {len})"),
    }
  }

  /// Drops the elements in `range`. Buffers left empty stay allocated as
  /// spares until `shrink_to_fit` or `clear`.
  ///
  /// # Panics
  ///
  /// If the range is decreasing or ends past `len()`.
  pub fn erase_range<R: RangeBounds<usize>>(
    &mut self,
    range: R,
  ) {
    let (start, stop) = self.resolve_range(range);
    let count = stop - start;
    if count == 0 {
      return;
    }

    let guard = HoleGuard {
      deque: self,
      start,
      count,
    };
    unsafe { drop_range(guard.deque.begin.offset(start as isize), count) };
  }

  /// Drops elements past `len`.
  pub fn truncate(
    &mut self,
    len: usize,
  ) {
    let old_len = self.len();
    if len >= old_len {
      return;
    }
    unsafe {
      let cut = self.begin.offset(len as isize);
      self.end = cut;
      drop_range(cut, old_len - len);
    }
  }

  pub fn resize(
    &mut self,
    len: usize,
    value: T,
  ) where
    T: Clone,
  {
    let old_len = self.len();
    if len > old_len {
      self.insert_n(old_len, len - old_len, value);
    } else {
      self.truncate(len);
    }
  }

  pub fn resize_with(
    &mut self,
    len: usize,
    mut make: impl FnMut() -> T,
  ) {
    let old_len = self.len();
    if len > old_len {
      expect_alloc(self.try_insert_with(old_len, len - old_len, || Ok(make())));
    } else {
      self.truncate(len);
    }
  }

  /// Drops every element and frees every buffer except the one `begin`
  /// points into. The map keeps its size.
  pub fn clear(&mut self) {
    self.truncate(0);
    self.shrink_to_fit();
  }

  /// Frees the spare buffers outside the live range.
  pub fn shrink_to_fit(&mut self) {
    let (lo, hi) = self.occupied_run();
    let begin_index = self.slot_index(self.begin.node);
    let end_index = self.slot_index(self.end.node);
    unsafe {
      self.release_slots(lo, begin_index);
      self.release_slots(end_index + 1, hi + 1);
    }
  }

  /// Replaces the contents with `items`, reusing existing slots.
  pub fn assign<I: IntoIterator<Item = T>>(
    &mut self,
    items: I,
  ) {
    let mut items = items.into_iter();
    let mut kept = 0;
    for slot in self.iter_mut() {
      match items.next() {
        Some(item) => {
          *slot = item;
          kept += 1;
        }
        None => break,
      }
    }
    self.truncate(kept);
    self.extend(items);
  }

  /// Replaces the contents with `count` clones of `value`.
  pub fn assign_n(
    &mut self,
    count: usize,
    value: T,
  ) where
    T: Clone,
  {
    self.truncate(count);
    for slot in self.iter_mut() {
      slot.clone_from(&value);
    }
    self.resize(count, value);
  }

  pub fn swap(
    &mut self,
    other: &mut Self,
  ) {
    std::mem::swap(self, other);
  }

  // Internals.

  #[inline]
  fn slot(
    &self,
    index: usize,
  ) -> *mut *mut T {
    unsafe { self.map.as_ptr().add(index) }
  }

  #[inline]
  fn slot_index(
    &self,
    node: *mut *mut T,
  ) -> usize {
    unsafe { node.offset_from(self.map.as_ptr()) as usize }
  }

  #[inline]
  fn has_buffer(
    &self,
    index: usize,
  ) -> bool {
    unsafe { !(*self.slot(index)).is_null() }
  }

  /// First allocated map slot.
  fn run_start(&self) -> usize {
    let mut lo = self.slot_index(self.begin.node);
    while lo > 0 && self.has_buffer(lo - 1) {
      lo -= 1;
    }
    lo
  }

  /// Last allocated map slot.
  fn run_end(&self) -> usize {
    let mut hi = self.slot_index(self.end.node);
    while hi + 1 < self.map_size && self.has_buffer(hi + 1) {
      hi += 1;
    }
    hi
  }

  /// Inclusive bounds of the allocated run of map slots.
  fn occupied_run(&self) -> (usize, usize) {
    (self.run_start(), self.run_end())
  }

  /// # Safety
  ///
  /// The deque must not be empty.
  unsafe fn back_ptr(&self) -> *mut T {
    unsafe {
      if self.end.cur != self.end.first {
        self.end.cur.sub(1)
      } else {
        (*self.end.node.sub(1)).add(Self::BUFFER_SIZE - 1)
      }
    }
  }

  fn check_insert_index(
    &self,
    index: usize,
  ) {
    let len = self.len();
    assert!(index <= len, "index (is {index}) should be <= len (is {len})");
  }

  fn resolve_range<R: RangeBounds<usize>>(
    &self,
    range: R,
  ) -> (usize, usize) {
    let len = self.len();
    let start = match range.start_bound() {
      Bound::Included(&start) => start,
      Bound::Excluded(&start) => start.saturating_add(1),
      Bound::Unbounded => 0,
    };
    let stop = match range.end_bound() {
      Bound::Included(&stop) => stop.saturating_add(1),
      Bound::Excluded(&stop) => stop,
      Bound::Unbounded => len,
    };
    assert!(start <= stop, "range start (is {start}) should be <= range end (is {stop})");
    assert!(stop <= len, "range end (is {stop}) should be <= len (is {len})");
    (start, stop)
  }

  /// Ensures `count` more elements fit at `side` without touching the
  /// elements. Returns the slots of the buffers this call created.
  fn require_capacity(
    &mut self,
    count: usize,
    side: Side,
  ) -> Result<Reserved, AllocError> {
    let room = match side {
      Side::Front => self.begin.offset_in_buffer(),
      Side::Back => self.end.room() - 1,
    };
    if count <= room {
      return Ok(Reserved::NONE);
    }

    let buffers = (count - room).div_ceil(Self::BUFFER_SIZE);
    let available = match side {
      Side::Front => self.slot_index(self.begin.node),
      Side::Back => self.map_size - 1 - self.slot_index(self.end.node),
    };
    if buffers <= available {
      return self.create_buffers(buffers, side);
    }

    let (run_lo, run_hi) = self.occupied_run();
    let run_len = run_hi - run_lo + 1;
    let missing = match side {
      Side::Front => buffers - (self.slot_index(self.begin.node) - run_lo),
      Side::Back => buffers - (run_hi - self.slot_index(self.end.node)),
    };
    // A map at most half used only slides its run back to the middle.
    if run_len + missing <= self.map_size / 2 {
      self.recenter_map(run_lo, run_len, missing, side);
      self.create_buffers(buffers, side)
    } else {
      self.grow_map(run_lo, run_len, missing, side)
    }
  }

  /// Fills the `buffers` slots next to the live range at `side`, reusing
  /// spares.
  fn create_buffers(
    &mut self,
    buffers: usize,
    side: Side,
  ) -> Result<Reserved, AllocError> {
    let missing = match side {
      Side::Front => {
        let lo = self.slot_index(self.begin.node) - buffers;
        Reserved {
          lo,
          hi: self.run_start().max(lo),
        }
      }
      Side::Back => {
        let hi = self.slot_index(self.end.node) + 1 + buffers;
        Reserved {
          lo: (self.run_end() + 1).min(hi),
          hi,
        }
      }
    };

    for index in missing.lo..missing.hi {
      match allocate_array::<T, A>(&self.alloc, Self::BUFFER_SIZE) {
        Ok(buffer) => unsafe { *self.slot(index) = buffer.as_ptr() },
        Err(err) => {
          unsafe { self.release_slots(missing.lo, index) };
          return Err(err);
        }
      }
    }
    Ok(missing)
  }

  /// Slides the occupied run `[run_lo, run_lo + run_len)` inside the map so
  /// that it and `missing` empty slots at `side` sit in the middle.
  fn recenter_map(
    &mut self,
    run_lo: usize,
    run_len: usize,
    missing: usize,
    side: Side,
  ) {
    let begin_index = self.slot_index(self.begin.node);
    let end_index = self.slot_index(self.end.node);
    let new_lo = (self.map_size - run_len - missing) / 2;
    let run_start = match side {
      Side::Front => new_lo + missing,
      Side::Back => new_lo,
    };

    unsafe {
      let map = self.map.as_ptr();
      ptr::copy(map.add(run_lo), map.add(run_start), run_len);
      for index in run_lo..run_lo + run_len {
        if !(run_start..run_start + run_len).contains(&index) {
          *map.add(index) = ptr::null_mut();
        }
      }
      self.begin.node = map.add(run_start + (begin_index - run_lo));
      self.end.node = map.add(run_start + (end_index - run_lo));
    }

    debug!(map_size = self.map_size, run_len, ?side, "recentered deque map");
  }

  /// Moves the occupied run `[run_lo, run_lo + run_len)` into a larger map,
  /// centered, and creates the `missing` buffers at `side`. The old map is
  /// only freed once everything is in place.
  fn grow_map(
    &mut self,
    run_lo: usize,
    run_len: usize,
    missing: usize,
    side: Side,
  ) -> Result<Reserved, AllocError> {
    let begin_index = self.slot_index(self.begin.node);
    let end_index = self.slot_index(self.end.node);

    let old_size = self.map_size;
    let new_size = old_size
      .checked_add(missing)
      .and_then(|size| size.checked_add(INIT_MAP_SIZE))
      .ok_or(AllocError::CapacityOverflow)?
      .max(old_size.saturating_mul(2));
    let new_map = allocate_map::<T, A>(&self.alloc, new_size)?;

    let new_lo = (new_size - run_len - missing) / 2;
    let run_start = match side {
      Side::Front => new_lo + missing,
      Side::Back => new_lo,
    };
    let created = match side {
      Side::Front => Reserved {
        lo: new_lo,
        hi: run_start,
      },
      Side::Back => Reserved {
        lo: run_start + run_len,
        hi: run_start + run_len + missing,
      },
    };

    unsafe {
      ptr::copy_nonoverlapping(self.slot(run_lo), new_map.as_ptr().add(run_start), run_len);

      for index in created.lo..created.hi {
        match allocate_array::<T, A>(&self.alloc, Self::BUFFER_SIZE) {
          Ok(buffer) => *new_map.as_ptr().add(index) = buffer.as_ptr(),
          Err(err) => {
            for filled in created.lo..index {
              let buffer = NonNull::new_unchecked(*new_map.as_ptr().add(filled));
              deallocate_array(&self.alloc, buffer, Self::BUFFER_SIZE);
            }
            deallocate_array(&self.alloc, new_map, new_size);
            return Err(err);
          }
        }
      }

      deallocate_array(&self.alloc, self.map, old_size);
      self.map = new_map;
      self.map_size = new_size;
      self.begin.node = new_map.as_ptr().add(run_start + (begin_index - run_lo));
      self.end.node = new_map.as_ptr().add(run_start + (end_index - run_lo));
    }

    debug!(old_size, new_size, ?side, "grew deque map");
    Ok(created)
  }

  /// Frees the buffers of slots `[lo, hi)`.
  ///
  /// # Safety
  ///
  /// The slots must hold buffers with no live elements.
  unsafe fn release_slots(
    &mut self,
    lo: usize,
    hi: usize,
  ) {
    for index in lo..hi {
      unsafe {
        let slot = self.slot(index);
        deallocate_array(&self.alloc, NonNull::new_unchecked(*slot), Self::BUFFER_SIZE);
        *slot = ptr::null_mut();
      }
    }
  }

  /// Frees the buffer just vacated at `side` unless the slot beyond it
  /// holds a spare; freeing it then would split the run.
  unsafe fn retire_buffer(
    &mut self,
    node: *mut *mut T,
    side: Side,
  ) {
    let index = self.slot_index(node);
    let spare_beyond = match side {
      Side::Front => index > 0 && self.has_buffer(index - 1),
      Side::Back => index + 1 < self.map_size && self.has_buffer(index + 1),
    };
    if !spare_beyond {
      unsafe { self.release_slots(index, index + 1) };
    }
  }

  /// Opens `count` uninitialized slots before `index` by moving the
  /// shorter side outward. `begin`/`end` already cover the gap on return.
  unsafe fn open_gap(
    &mut self,
    index: usize,
    count: usize,
  ) -> Result<Gap<T>, AllocError> {
    let len = self.len();
    if count > isize::MAX as usize - len {
      return Err(AllocError::CapacityOverflow);
    }

    let side = if index < len / 2 { Side::Front } else { Side::Back };
    let reserved = self.require_capacity(count, side)?;

    let at = unsafe {
      match side {
        Side::Front => {
          let old_begin = self.begin;
          let new_begin = old_begin.offset(-(count as isize));
          copy_forward(old_begin, new_begin, index);
          self.begin = new_begin;
          new_begin.offset(index as isize)
        }
        Side::Back => {
          let old_end = self.end;
          let new_end = old_end.offset(count as isize);
          copy_backward(old_end, new_end, len - index);
          self.end = new_end;
          self.begin.offset(index as isize)
        }
      }
    };

    Ok(Gap {
      at,
      index,
      count,
      side,
      reserved,
    })
  }

  /// Undoes `open_gap`.
  ///
  /// # Safety
  ///
  /// The gap slots must be uninitialized again.
  unsafe fn close_gap(
    &mut self,
    gap: &Gap<T>,
  ) {
    unsafe {
      match gap.side {
        Side::Front => {
          let moved_end = self.begin.offset(gap.index as isize);
          copy_backward(moved_end, gap.at.offset(gap.count as isize), gap.index);
          self.begin = self.begin.offset(gap.count as isize);
        }
        Side::Back => {
          let tail = self.len() - gap.index - gap.count;
          copy_forward(gap.at.offset(gap.count as isize), gap.at, tail);
          self.end = self.end.offset(-(gap.count as isize));
        }
      }
      self.release_slots(gap.reserved.lo, gap.reserved.hi);
    }
  }

  /// Closes the hole left by `count` dead elements at `start` by moving
  /// the shorter side inward.
  ///
  /// # Safety
  ///
  /// The elements in the hole must already be moved out or dropped.
  unsafe fn close_hole(
    &mut self,
    start: usize,
    count: usize,
  ) {
    let len = self.len();
    unsafe {
      let hole = self.begin.offset(start as isize);
      if start < (len - count) / 2 {
        copy_backward(hole, hole.offset(count as isize), start);
        self.begin = self.begin.offset(count as isize);
      } else {
        copy_forward(hole.offset(count as isize), hole, len - start - count);
        self.end = self.end.offset(-(count as isize));
      }
    }
  }

  #[cfg(test)]
  pub(crate) fn check_invariants(&self) {
    let begin_index = self.slot_index(self.begin.node);
    let end_index = self.slot_index(self.end.node);
    assert!(begin_index <= end_index && end_index < self.map_size);

    let (lo, hi) = self.occupied_run();
    for index in 0..self.map_size {
      assert_eq!(self.has_buffer(index), (lo..=hi).contains(&index), "map slot {index}");
    }

    for cursor in [self.begin, self.end] {
      assert_eq!(cursor.first, unsafe { *cursor.node });
      assert!(cursor.first <= cursor.cur && cursor.cur < cursor.last);
    }
    assert!(unsafe { self.end.distance(&self.begin) } >= 0);
    assert_eq!(self.iter().count(), self.len());
    assert_eq!(self.iter().rev().count(), self.len());
  }
}

/// Rolls a failed `try_insert_with` back.
struct FillGuard<'a, T, A: RawAlloc> {
  deque: &'a mut Deque<T, A>,
  gap: Gap<T>,
  written: usize,
}

impl<T, A: RawAlloc> Drop for FillGuard<'_, T, A> {
  fn drop(&mut self) {
    if self.written == self.gap.count {
      return;
    }
    unsafe {
      drop_range(self.gap.at, self.written);
      self.deque.close_gap(&self.gap);
    }
  }
}

/// Closes the hole of `erase_range` even if an element's destructor
/// panics. Elements not yet dropped at that point are leaked.
struct HoleGuard<'a, T, A: RawAlloc> {
  deque: &'a mut Deque<T, A>,
  start: usize,
  count: usize,
}

impl<T, A: RawAlloc> Drop for HoleGuard<'_, T, A> {
  fn drop(&mut self) {
    unsafe { self.deque.close_hole(self.start, self.count) };
  }
}

impl<T, A: RawAlloc> Drop for Deque<T, A> {
  fn drop(&mut self) {
    unsafe {
      drop_range(self.begin, self.len());
      let (lo, hi) = self.occupied_run();
      self.release_slots(lo, hi + 1);
      deallocate_array(&self.alloc, self.map, self.map_size);
    }
  }
}

impl<T, A: RawAlloc> Index<usize> for Deque<T, A> {
  type Output = T;

  fn index(
    &self,
    index: usize,
  ) -> &T {
    match self.get(index) {
      Some(element) => element,
      None => panic!("index out of bounds: the len is {} but the index is {index}", self.len()),
    }
  }
}

impl<T, A: RawAlloc> IndexMut<usize> for Deque<T, A> {
  fn index_mut(
    &mut self,
    index: usize,
  ) -> &mut T {
    let len = self.len();
    match self.get_mut(index) {
      Some(element) => element,
      None => panic!("index out of bounds: the len is {len} but the index is {index}"),
    }
  }
}

impl<T, A: RawAlloc> Extend<T> for Deque<T, A> {
  fn extend<I: IntoIterator<Item = T>>(
    &mut self,
    items: I,
  ) {
    for item in items {
      self.push_back(item);
    }
  }
}

impl<'a, T: Copy + 'a, A: RawAlloc> Extend<&'a T> for Deque<T, A> {
  fn extend<I: IntoIterator<Item = &'a T>>(
    &mut self,
    items: I,
  ) {
    self.extend(items.into_iter().copied());
  }
}

impl<T> FromIterator<T> for Deque<T> {
  fn from_iter<I: IntoIterator<Item = T>>(items: I) -> Self {
    let mut deque = Self::new();
    deque.extend(items);
    deque
  }
}

impl<T, const N: usize> From<[T; N]> for Deque<T> {
  fn from(items: [T; N]) -> Self {
    let mut deque = Self::with_capacity(N);
    deque.extend(items);
    deque
  }
}

impl<T: Clone, A: RawAlloc + Clone> Clone for Deque<T, A> {
  fn clone(&self) -> Self {
    let mut copy = Self::with_capacity_in(self.len(), self.alloc.clone());
    copy.extend(self.iter().cloned());
    copy
  }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for Deque<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T: PartialEq<U>, U, A: RawAlloc, B: RawAlloc> PartialEq<Deque<U, B>> for Deque<T, A> {
  fn eq(
    &self,
    other: &Deque<U, B>,
  ) -> bool {
    self.len() == other.len() && self.iter().eq(other.iter())
  }
}

impl<T: PartialEq<U>, U, A: RawAlloc> PartialEq<[U]> for Deque<T, A> {
  fn eq(
    &self,
    other: &[U],
  ) -> bool {
    self.len() == other.len() && self.iter().eq(other.iter())
  }
}

impl<T: PartialEq<U>, U, A: RawAlloc, const N: usize> PartialEq<[U; N]> for Deque<T, A> {
  fn eq(
    &self,
    other: &[U; N],
  ) -> bool {
    *self == other[..]
  }
}

impl<T: Eq, A: RawAlloc> Eq for Deque<T, A> {}

impl<T: PartialOrd, A: RawAlloc> PartialOrd for Deque<T, A> {
  fn partial_cmp(
    &self,
    other: &Self,
  ) -> Option<Ordering> {
    self.iter().partial_cmp(other.iter())
  }
}

impl<T: Ord, A: RawAlloc> Ord for Deque<T, A> {
  fn cmp(
    &self,
    other: &Self,
  ) -> Ordering {
    self.iter().cmp(other.iter())
  }
}

impl<T: Hash, A: RawAlloc> Hash for Deque<T, A> {
  fn hash<H: Hasher>(
    &self,
    state: &mut H,
  ) {
    self.len().hash(state);
    for element in self {
      element.hash(state);
    }
  }
}

impl<T, A: RawAlloc> IntoIterator for Deque<T, A> {
  type Item = T;
  type IntoIter = IntoIter<T, A>;

  fn into_iter(self) -> IntoIter<T, A> {
    IntoIter::new(self)
  }
}

impl<'a, T, A: RawAlloc> IntoIterator for &'a Deque<T, A> {
  type Item = &'a T;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Iter<'a, T> {
    self.iter()
  }
}

impl<'a, T, A: RawAlloc> IntoIterator for &'a mut Deque<T, A> {
  type Item = &'a mut T;
  type IntoIter = IterMut<'a, T>;

  fn into_iter(self) -> IterMut<'a, T> {
    self.iter_mut()
  }
}

/// Builds a [`Deque`](crate::Deque) on the default pool, like `vec!`.
#[macro_export]
macro_rules! deque {
  () => {
    $crate::Deque::new()
  };
  ($value:expr; $len:expr) => {
    $crate::Deque::from_elem($value, $len)
  };
  ($($value:expr),+ $(,)?) => {
    $crate::Deque::from([$($value),+])
  };
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;
  use std::collections::hash_map::DefaultHasher;
  use std::panic::{self, AssertUnwindSafe};

  use proptest::prelude::*;

  use super::*;
  use crate::malloc::MallocAlloc;
  use crate::testing::{DropCounter, FlakySystem, PanicOnClone, Tracked};

  type Counted = MallocAlloc<FlakySystem>;

  fn counted(system: &FlakySystem) -> Counted {
    MallocAlloc::with_system(system.clone())
  }

  fn values(deque: &Deque<Tracked>) -> Vec<i32> {
    deque.iter().map(|tracked| tracked.value).collect()
  }

  #[test]
  fn test_push_pop_order() {
    let mut deque = Deque::new();
    for i in 0..1000 {
      deque.push_back(i);
      deque.push_front(-i - 1);
    }
    deque.check_invariants();
    assert_eq!(deque.len(), 2000);
    assert_eq!(deque.front(), Some(&-1000));
    assert_eq!(deque.back(), Some(&999));
    assert!(deque.iter().copied().eq(-1000..1000));

    for i in (0..1000).rev() {
      assert_eq!(deque.pop_back(), Some(i));
      assert_eq!(deque.pop_front(), Some(-i - 1));
    }
    assert!(deque.is_empty());
    assert_eq!(deque.pop_back(), None);
    assert_eq!(deque.pop_front(), None);
    deque.check_invariants();
  }

  #[test]
  fn test_erase_then_insert_in_the_middle() {
    let mut deque = deque![1, 2, 3, 4, 5];
    deque.erase_range(1..3);
    assert_eq!(deque, [1, 4, 5]);

    deque.insert_slice(1, &[9, 9]);
    assert_eq!(deque, [1, 9, 9, 4, 5]);

    deque.insert_n(4, 2, 7);
    deque.insert_iter(0, [0, 0]);
    deque.insert(deque.len(), 6);
    assert_eq!(deque, [0, 0, 1, 9, 9, 4, 7, 7, 5, 6]);

    assert_eq!(deque.remove(3), Some(9));
    deque.erase(0);
    assert_eq!(deque.remove(42), None);
    assert_eq!(deque, [0, 1, 9, 4, 7, 7, 5, 6]);
    deque.check_invariants();
  }

  #[test]
  fn test_second_buffer_appears_at_the_boundary() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    let per_buffer = Deque::<u64, Counted>::buffer_size();
    assert_eq!(per_buffer, 64);
    assert_eq!(system.calls(), 2);

    for i in 0..per_buffer as u64 - 1 {
      deque.push_back(i);
    }
    assert_eq!(deque.buffer_count(), 1);
    assert_eq!(system.calls(), 2);

    deque.push_back(63);
    assert_eq!(deque.buffer_count(), 2);
    assert_eq!(system.calls(), 3);

    deque.push_back(64);
    assert_eq!(deque.buffer_count(), 2);
    assert_eq!(deque.get(64), Some(&64));
    assert!(deque.iter().copied().eq(0..65));

    deque.pop_back();
    deque.pop_back();
    assert_eq!(deque.buffer_count(), 1);
    assert_eq!(system.frees(), 1);
    deque.check_invariants();
  }

  #[test]
  fn test_erase_leaves_spares_and_shrink_is_idempotent() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    deque.extend(0..256);
    assert_eq!(deque.buffer_count(), 5);
    assert_eq!(deque.map_len(), INIT_MAP_SIZE);

    deque.erase_range(..128);
    assert_eq!(deque.len(), 128);
    assert_eq!(deque.front(), Some(&128));
    assert_eq!(deque.buffer_count(), 5);
    deque.check_invariants();

    let freed = system.frees();
    deque.shrink_to_fit();
    assert_eq!(deque.buffer_count(), 3);
    assert_eq!(system.frees(), freed + 2);

    deque.shrink_to_fit();
    assert_eq!(deque.buffer_count(), 3);
    assert_eq!(system.frees(), freed + 2);
    assert!(deque.iter().copied().eq(128..256));
    deque.check_invariants();
  }

  #[test]
  fn test_spares_are_reused_before_allocating() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    deque.extend(0..256);
    deque.erase_range(..128);

    let calls = system.calls();
    for i in (0..128).rev() {
      deque.push_front(i);
    }
    assert_eq!(system.calls(), calls);
    assert!(deque.iter().copied().eq(0..256));
    deque.check_invariants();
  }

  #[test]
  fn test_pop_keeps_buffer_when_spare_lies_beyond() {
    let mut deque: Deque<u64> = (0..256).collect();
    deque.erase_range(..128);
    assert_eq!(deque.buffer_count(), 5);

    // The emptied front buffer stays: its outer neighbour is a spare.
    for expected in 128..192 {
      assert_eq!(deque.pop_front(), Some(expected));
    }
    assert_eq!(deque.buffer_count(), 5);
    deque.check_invariants();

    deque.shrink_to_fit();
    assert_eq!(deque.buffer_count(), 2);

    // Nothing lies beyond the back buffer, so emptying it frees it.
    assert_eq!(deque.pop_back(), Some(255));
    assert_eq!(deque.buffer_count(), 1);
    deque.check_invariants();
  }

  #[test]
  fn test_map_grows_centered_at_the_back() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    deque.extend(0..5 * 64 - 1);
    assert_eq!(deque.map_len(), 8);
    assert_eq!(deque.begin().buffer_slot(), 3);
    assert_eq!(deque.end().buffer_slot(), 7);

    let (calls, frees) = (system.calls(), system.frees());
    deque.push_back(319);
    assert_eq!(system.calls(), calls + 2);
    assert_eq!(system.frees(), frees + 1);

    assert_eq!(deque.map_len(), 17);
    assert_eq!(deque.begin().buffer_slot(), 5);
    assert_eq!(deque.end().buffer_slot(), 10);
    assert!(deque.iter().copied().eq(0..320));
    deque.check_invariants();
  }

  #[test]
  fn test_map_grows_centered_at_the_front() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    for i in (0..3 * 64).rev() {
      deque.push_front(i);
    }
    assert_eq!(deque.begin().buffer_slot(), 0);
    assert_eq!(deque.begin().offset_in_buffer(), 0);

    deque.push_front(-1i64 as u64);
    assert_eq!(deque.map_len(), 17);
    assert_eq!(deque.begin().buffer_slot(), 6);
    assert_eq!(deque.begin().offset_in_buffer(), 63);
    assert_eq!(deque.end().buffer_slot(), 10);
    assert_eq!(deque.len(), 193);
    deque.check_invariants();
  }

  #[test]
  fn test_queue_traffic_recenters_instead_of_growing() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    for i in 0..100_000 {
      deque.push_back(i);
      assert_eq!(deque.pop_front(), Some(i));
    }
    assert_eq!(deque.map_len(), INIT_MAP_SIZE);
    assert!(deque.buffer_count() <= 2);
    deque.check_invariants();

    deque.extend(0..300);
    for i in 300..10_000 {
      deque.push_back(i);
      deque.pop_front();
    }
    let settled = deque.map_len();
    for i in 10_000..200_000 {
      deque.push_back(i);
      assert_eq!(deque.pop_front(), Some(i - 300));
    }
    assert_eq!(deque.map_len(), settled);
    assert!(deque.iter().copied().eq(199_700..200_000));
    deque.check_invariants();
  }

  #[test]
  fn test_map_reallocations_grow_logarithmically() {
    let system = FlakySystem::unlimited();
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    for i in 0..512 {
      deque.push_front(i);
    }
    assert!(deque.map_len() > INIT_MAP_SIZE);

    let calls = system.calls();
    let buffers = deque.buffer_count();
    let mut map_len = deque.map_len();
    let mut growths = 0;
    for i in 0..20_000 {
      deque.push_front(i);
      deque.push_back(i);
      if deque.map_len() != map_len {
        assert!(deque.map_len() > map_len);
        map_len = deque.map_len();
        growths += 1;
      }
    }

    // Without pops there are no spares: every call is a new buffer or a new map.
    let created = deque.buffer_count() - buffers;
    assert_eq!(system.calls() - calls, created + growths);
    let bits = (usize::BITS - deque.buffer_count().leading_zeros()) as usize;
    assert!(growths >= 1);
    assert!(growths <= bits, "{growths} map reallocations for {} buffers", deque.buffer_count());
    assert!(deque.map_len() <= 4 * deque.buffer_count());
    assert_eq!(deque.len(), 40_512);
    deque.check_invariants();
  }

  #[test]
  fn test_allocation_failure_leaves_deque_untouched() {
    // Map, first buffer and four more buffers, then nothing.
    let system = FlakySystem::failing_after(6);
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    deque.extend(0..5 * 64 - 1);

    assert_eq!(
      deque.try_push_back(999),
      Err(AllocError::OutOfMemory {
        size: 17 * size_of::<usize>(),
        align: align_of::<usize>(),
      })
    );
    assert_eq!(deque.map_len(), 8);

    // The new map succeeds, its buffer does not: the new map is released.
    system.allow(1);
    let frees = system.frees();
    assert!(deque.try_push_back(999).is_err());
    assert_eq!(system.frees(), frees + 1);
    assert_eq!(deque.map_len(), 8);
    assert_eq!(deque.len(), 319);
    deque.check_invariants();

    system.allow(2);
    deque.push_back(319);
    assert_eq!(deque.map_len(), 17);
    assert!(deque.iter().copied().eq(0..320));
  }

  #[test]
  fn test_construction_failure() {
    let system = FlakySystem::failing_after(1);
    let result = Deque::<u64, _>::try_new_in(counted(&system));
    assert!(result.is_err());
    assert_eq!(system.frees(), 1);

    let system = FlakySystem::failing_after(3);
    let result = Deque::<u64, _>::try_with_capacity_in(200, counted(&system));
    assert!(result.is_err());
    assert_eq!(system.frees(), 3);
  }

  #[test]
  fn test_failed_generator_rolls_back() {
    let counter = DropCounter::default();
    for index in [3, 15] {
      let mut deque: Deque<Tracked> = (0..20).map(|v| counter.track(v)).collect();
      let buffers = deque.buffer_count();

      let mut made = 0;
      let result = deque.try_insert_with(index, 40, || {
        made += 1;
        if made == 34 { Err("refused") } else { Ok(counter.track(100)) }
      });
      assert!(matches!(result, Err(InsertError::Construction("refused"))));

      assert_eq!(counter.live(), 20);
      assert_eq!(values(&deque), (0..20).collect::<Vec<_>>());
      assert_eq!(deque.buffer_count(), buffers);
      deque.check_invariants();
    }
    assert_eq!(counter.live(), 0);
  }

  #[test]
  fn test_panicking_clone_rolls_back() {
    for index in [1, 8] {
      let mut deque: Deque<PanicOnClone> = (0..10).map(|v| PanicOnClone::new(v, usize::MAX)).collect();

      let result = panic::catch_unwind(AssertUnwindSafe(|| {
        deque.insert_n(index, 100, PanicOnClone::new(99, 70));
      }));
      assert!(result.is_err());

      assert!(deque.iter().map(|e| e.value).eq(0..10));
      deque.check_invariants();
    }
  }

  #[test]
  fn test_failed_allocation_during_insert() {
    let system = FlakySystem::failing_after(2);
    let mut deque: Deque<u64, _> = Deque::new_in(counted(&system));
    deque.extend(0..10);

    let result = deque.try_insert_with(5, 200, || Ok::<_, Infallible>(0));
    assert!(matches!(result, Err(InsertError::Alloc(AllocError::OutOfMemory { .. }))));
    assert!(deque.iter().copied().eq(0..10));
    assert_eq!(deque.buffer_count(), 1);
    deque.check_invariants();
  }

  #[test]
  fn test_emplace() {
    let mut deque: Deque<String> = Deque::new();
    deque.emplace_back(|| "b".to_string()).push('!');
    deque.emplace_front(|| "a".to_string());
    *deque.emplace(1, || "mid".to_string()) += "dle";
    assert_eq!(deque, ["a", "middle", "b!"]);

    let result = deque.try_emplace_back(|| Err::<String, _>(7));
    assert_eq!(result.unwrap_err().into_construction(), Some(7));
    assert_eq!(deque.len(), 3);
  }

  #[test]
  fn test_drops_everything_exactly_once() {
    let counter = DropCounter::default();
    {
      let mut deque: Deque<Tracked> = Deque::new();
      for i in 0..300 {
        deque.push_back(counter.track(i));
      }
      deque.erase_range(50..120);
      deque.truncate(200);
      assert_eq!(counter.live(), 200);

      let mut iter = deque.clone().into_iter();
      assert_eq!(iter.next().map(|t| t.value), Some(0));
      assert_eq!(iter.next_back().map(|t| t.value), Some(269));
      assert_eq!(counter.live(), 398);
      drop(iter);
      assert_eq!(counter.live(), 200);

      deque.clear();
      assert_eq!(counter.live(), 0);
      assert_eq!(deque.buffer_count(), 1);
      deque.push_back(counter.track(1));
    }
    assert_eq!(counter.live(), 0);
  }

  #[test]
  fn test_resize_assign_and_access() {
    let mut deque: Deque<i32> = Deque::with_len(3);
    assert_eq!(deque, [0, 0, 0]);

    deque.resize(5, 4);
    deque.resize_with(6, || 5);
    assert_eq!(deque, [0, 0, 0, 4, 4, 5]);
    deque.resize(2, 9);
    assert_eq!(deque, [0, 0]);

    deque.assign(10..14);
    assert_eq!(deque, [10, 11, 12, 13]);
    deque.assign([1]);
    assert_eq!(deque, [1]);
    deque.assign_n(3, 8);
    assert_eq!(deque, [8, 8, 8]);

    deque[1] = 2;
    *deque.front_mut().unwrap() = 1;
    *deque.back_mut().unwrap() = 3;
    for element in &mut deque {
      *element *= 10;
    }
    assert_eq!(deque, [10, 20, 30]);
    assert_eq!(deque.get(3), None);
    assert_eq!(unsafe { *deque.get_unchecked(2) }, 30);

    let mut other = deque![7; 2];
    deque.swap(&mut other);
    assert_eq!(deque, [7, 7]);
    assert_eq!(other, [10, 20, 30]);
  }

  #[test]
  #[should_panic(expected = "index out of bounds: the len is 3 but the index is 3")]
  fn test_index_out_of_range_panics() {
    let deque = deque![1, 2, 3];
    let _ = deque[3];
  }

  #[test]
  #[should_panic(expected = "should be <= len")]
  fn test_insert_past_end_panics() {
    let mut deque = deque![1, 2, 3];
    deque.insert(4, 0);
  }

  #[test]
  fn test_comparisons_and_formatting() {
    let a = deque![1, 2, 3];
    let b: Deque<i32> = (1..=3).collect();
    let c = deque![1, 2, 4];
    assert_eq!(a, b);
    assert!(a < c);
    assert_eq!(a.cmp(&c), Ordering::Less);
    assert_eq!(format!("{a:?}"), "[1, 2, 3]");

    let hash = |deque: &Deque<i32>| {
      let mut hasher = DefaultHasher::new();
      deque.hash(&mut hasher);
      hasher.finish()
    };
    assert_eq!(hash(&a), hash(&b));
    let empty: Deque<i32> = deque![];
    assert!(empty.is_empty());
  }

  #[test]
  fn test_buffer_sized_elements() {
    let mut deque: Deque<[u8; 1024]> = Deque::new();
    assert_eq!(Deque::<[u8; 1024]>::buffer_size(), 1);
    for i in 0..20u8 {
      deque.push_back([i; 1024]);
      deque.push_front([100 + i; 1024]);
    }
    deque.erase_range(5..30);
    deque.check_invariants();
    assert_eq!(deque.len(), 15);
    assert_eq!(deque[4][0], 115);
    assert_eq!(deque[5][0], 10);
  }

  #[test]
  fn test_over_aligned_elements() {
    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(align(64))]
    struct Line(u32);

    let mut deque: Deque<Line> = (0..50).map(Line).collect();
    deque.insert(10, Line(99));
    for element in &deque {
      assert_eq!(element as *const Line as usize % 64, 0);
    }
    assert_eq!(deque[10], Line(99));
  }

  #[test]
  fn test_moves_between_threads() {
    let deque: Deque<u32> = (0..1000).collect();
    let sum = std::thread::spawn(move || deque.iter().sum::<u32>()).join().unwrap();
    assert_eq!(sum, 499_500);
  }

  #[derive(Clone, Debug)]
  enum Op {
    PushBack(u32),
    PushFront(u32),
    PopBack,
    PopFront,
    Insert(usize, Vec<u32>),
    Erase(usize, usize),
    Remove(usize),
    Truncate(usize),
    ShrinkToFit,
    Clear,
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      4 => any::<u32>().prop_map(Op::PushBack),
      4 => any::<u32>().prop_map(Op::PushFront),
      2 => Just(Op::PopBack),
      2 => Just(Op::PopFront),
      2 => (any::<usize>(), prop::collection::vec(any::<u32>(), 0..40)).prop_map(|(i, v)| Op::Insert(i, v)),
      2 => (any::<usize>(), 0usize..40).prop_map(|(i, n)| Op::Erase(i, n)),
      1 => any::<usize>().prop_map(Op::Remove),
      1 => any::<usize>().prop_map(Op::Truncate),
      1 => Just(Op::ShrinkToFit),
      1 => Just(Op::Clear),
    ]
  }

  /// 128 bytes, four to a buffer.
  type Wide = [u32; 32];

  proptest! {
    #[test]
    fn behaves_like_vec_deque(ops in prop::collection::vec(op(), 1..120)) {
      let mut deque: Deque<Wide> = Deque::new();
      let mut model: VecDeque<u32> = VecDeque::new();

      for op in ops {
        match op {
          Op::PushBack(v) => {
            deque.push_back([v; 32]);
            model.push_back(v);
          }
          Op::PushFront(v) => {
            deque.push_front([v; 32]);
            model.push_front(v);
          }
          Op::PopBack => prop_assert_eq!(deque.pop_back().map(|w| w[0]), model.pop_back()),
          Op::PopFront => prop_assert_eq!(deque.pop_front().map(|w| w[0]), model.pop_front()),
          Op::Insert(i, items) => {
            let index = i % (model.len() + 1);
            deque.insert_iter(index, items.iter().map(|&v| [v; 32]));
            for (offset, &v) in items.iter().enumerate() {
              model.insert(index + offset, v);
            }
          }
          Op::Erase(i, n) => {
            let start = i % (model.len() + 1);
            let stop = (start + n).min(model.len());
            deque.erase_range(start..stop);
            model.drain(start..stop).for_each(drop);
          }
          Op::Remove(i) => {
            let index = i % (model.len() + 1);
            prop_assert_eq!(deque.remove(index).map(|w| w[0]), model.remove(index));
          }
          Op::Truncate(n) => {
            let len = n % (model.len() + 1);
            deque.truncate(len);
            model.truncate(len);
          }
          Op::ShrinkToFit => deque.shrink_to_fit(),
          Op::Clear => {
            deque.clear();
            model.clear();
          }
        }

        deque.check_invariants();
        prop_assert_eq!(deque.len(), model.len());
        prop_assert!(deque.iter().map(|w| w[0]).eq(model.iter().copied()));
      }
    }
  }
}
