//! Positions inside a segmented buffer.
//!
//! ```text
//!                map
//!   ┌─────┬─────┬─────┬─────┬─────┬─────┐
//!   │  ∅  │  ●  │  ●  │  ●  │  ∅  │  ∅  │
//!   └─────┴──┼──┴──┼──┴──┼──┴─────┴─────┘
//!            │     │     │
//!            ▼     ▼     ▼
//!         ┌─────┐┌─────┐┌─────┐
//!         │  a  ││  d  ││  g  │
//!         │  b  ││  e  ││  ·  │◀── end.cur
//!   cur ─▶│  c  ││  f  ││  ·  │
//!         └─────┘└─────┘└─────┘
//!         ▲     ▲
//!       first  last
//! ```
//!
//! A cursor is `(cur, first, last, node)`: the element, the bounds of the
//! buffer holding it, and the map slot pointing at that buffer. It moves by
//! two transitions only: advancing inside the current buffer, or crossing
//! to the adjacent map slot. `first <= cur < last` holds after every public
//! operation; `cur == last` only exists transiently inside the backward
//! copy below.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::ptr;

use crate::allocator::{DefaultAlloc, RawAlloc};

use super::Deque;

/// Bytes a buffer aims to hold.
pub const BUFFER_BYTES: usize = 512;

/// Elements per buffer: `max(1, BUFFER_BYTES / size_of::<T>())`.
pub const fn buffer_size<T>() -> usize {
  let size = size_of::<T>();
  if size < BUFFER_BYTES { BUFFER_BYTES / size } else { 1 }
}

pub(crate) struct RawCursor<T> {
  pub cur: *mut T,
  pub first: *mut T,
  pub last: *mut T,
  pub node: *mut *mut T,
}

impl<T> Clone for RawCursor<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for RawCursor<T> {}

impl<T> RawCursor<T> {
  pub const fn dangling() -> Self {
    Self {
      cur: ptr::null_mut(),
      first: ptr::null_mut(),
      last: ptr::null_mut(),
      node: ptr::null_mut(),
    }
  }

  /// Cursor at `offset` inside the buffer held by map slot `node`.
  ///
  /// # Safety
  ///
  /// `node` must be a readable map slot holding an allocated buffer.
  pub unsafe fn at(
    node: *mut *mut T,
    offset: usize,
  ) -> Self {
    let mut cursor = Self::dangling();
    unsafe {
      cursor.set_node(node);
      cursor.cur = cursor.first.add(offset);
    }
    cursor
  }

  /// Points the buffer bounds at map slot `node`, leaving `cur` alone.
  ///
  /// # Safety
  ///
  /// `node` must be a readable map slot.
  #[inline]
  pub unsafe fn set_node(
    &mut self,
    node: *mut *mut T,
  ) {
    self.node = node;
    self.first = unsafe { *node };
    self.last = self.first.wrapping_add(buffer_size::<T>());
  }

  /// Elements between `first` and `cur`.
  #[inline]
  pub fn offset_in_buffer(&self) -> usize {
    (self.cur as usize - self.first as usize) / size_of::<T>()
  }

  /// Slots from `cur` to the end of the buffer.
  #[inline]
  pub fn room(&self) -> usize {
    (self.last as usize - self.cur as usize) / size_of::<T>()
  }

  /// First transition: move within the buffer. Returns `false` when the
  /// move reached `last`, which must be followed by a crossing.
  #[inline]
  unsafe fn advance_within_buffer(&mut self) -> bool {
    self.cur = unsafe { self.cur.add(1) };
    self.cur != self.last
  }

  /// Second transition: enter the next (`delta > 0`) or previous buffer.
  #[inline]
  unsafe fn cross_to_buffer(
    &mut self,
    delta: isize,
  ) {
    unsafe { self.set_node(self.node.offset(delta)) };
    self.cur = if delta > 0 { self.first } else { self.last };
  }

  /// # Safety
  ///
  /// The position after this one must be inside the container or its end.
  #[inline]
  pub unsafe fn step_forward(&mut self) {
    unsafe {
      if !self.advance_within_buffer() {
        self.cross_to_buffer(1);
      }
    }
  }

  /// # Safety
  ///
  /// The position before this one must be inside the container.
  #[inline]
  pub unsafe fn step_backward(&mut self) {
    unsafe {
      if self.cur == self.first {
        self.cross_to_buffer(-1);
      }
      self.cur = self.cur.sub(1);
    }
  }

  /// The cursor `n` elements away. The buffer delta is a floor division
  /// so negative offsets land in the right buffer.
  ///
  /// # Safety
  ///
  /// The target position must be inside the container or its end.
  pub unsafe fn offset(
    self,
    n: isize,
  ) -> Self {
    let per_buffer = buffer_size::<T>() as isize;
    let target = n + self.offset_in_buffer() as isize;

    let mut moved = self;
    unsafe {
      if (0..per_buffer).contains(&target) {
        moved.cur = self.cur.offset(n);
      } else {
        moved.set_node(self.node.offset(target.div_euclid(per_buffer)));
        moved.cur = moved.first.add(target.rem_euclid(per_buffer) as usize);
      }
    }
    moved
  }

  /// Signed number of elements from `origin` to `self`.
  ///
  /// # Safety
  ///
  /// Both cursors must belong to the same map.
  pub unsafe fn distance(
    &self,
    origin: &Self,
  ) -> isize {
    let per_buffer = buffer_size::<T>() as isize;
    let nodes = unsafe { self.node.offset_from(origin.node) };
    per_buffer * (nodes - 1) + self.offset_in_buffer() as isize + origin.room() as isize
  }
}

/// Moves `count` elements from `src` to `dst`, front to back.
///
/// Valid when `dst` is at or before `src` or the ranges do not overlap.
///
/// # Safety
///
/// Both ranges must lie in allocated buffers of the same container.
pub(crate) unsafe fn copy_forward<T>(
  mut src: RawCursor<T>,
  mut dst: RawCursor<T>,
  mut count: usize,
) {
  while count > 0 {
    let chunk = count.min(src.room()).min(dst.room());
    unsafe {
      ptr::copy(src.cur, dst.cur, chunk);
      count -= chunk;
      if count == 0 {
        break;
      }
      src = src.offset(chunk as isize);
      dst = dst.offset(chunk as isize);
    }
  }
}

/// Moves the `count` elements ending at `src_end` so they end at
/// `dst_end`, back to front.
///
/// Valid when `dst_end` is at or after `src_end` or the ranges do not
/// overlap.
///
/// # Safety
///
/// Both ranges must lie in allocated buffers of the same container.
pub(crate) unsafe fn copy_backward<T>(
  mut src_end: RawCursor<T>,
  mut dst_end: RawCursor<T>,
  mut count: usize,
) {
  while count > 0 {
    unsafe {
      if src_end.cur == src_end.first {
        src_end.cross_to_buffer(-1);
      }
      if dst_end.cur == dst_end.first {
        dst_end.cross_to_buffer(-1);
      }
      let chunk = count.min(src_end.offset_in_buffer()).min(dst_end.offset_in_buffer());
      src_end.cur = src_end.cur.sub(chunk);
      dst_end.cur = dst_end.cur.sub(chunk);
      ptr::copy(src_end.cur, dst_end.cur, chunk);
      count -= chunk;
    }
  }
}

/// Drops `count` elements starting at `start`.
///
/// # Safety
///
/// The range must hold initialized elements that are not used again.
pub(crate) unsafe fn drop_range<T>(
  mut start: RawCursor<T>,
  mut count: usize,
) {
  if !std::mem::needs_drop::<T>() {
    return;
  }
  while count > 0 {
    let chunk = count.min(start.room());
    unsafe {
      ptr::drop_in_place(ptr::slice_from_raw_parts_mut(start.cur, chunk));
      count -= chunk;
      if count == 0 {
        break;
      }
      start = start.offset(chunk as isize);
    }
  }
}

/// Read-only random-access position in a `Deque`, from `begin()` to
/// `end()` inclusive.
///
/// Arithmetic is checked: moving outside `[begin, end]` returns `None`
/// from `offset` and panics from the operators.
pub struct Cursor<'a, T, A: RawAlloc = DefaultAlloc> {
  raw: RawCursor<T>,
  deque: &'a Deque<T, A>,
}

impl<T, A: RawAlloc> Clone for Cursor<'_, T, A> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T, A: RawAlloc> Copy for Cursor<'_, T, A> {}

impl<'a, T, A: RawAlloc> Cursor<'a, T, A> {
  pub(crate) fn new(
    deque: &'a Deque<T, A>,
    raw: RawCursor<T>,
  ) -> Self {
    Self { raw, deque }
  }

  /// Elements before this position.
  pub fn index(&self) -> usize {
    unsafe { self.raw.distance(&self.deque.begin) as usize }
  }

  /// Whether this is the past-the-end position.
  pub fn is_end(&self) -> bool {
    self.raw.cur == self.deque.end.cur
  }

  /// The element here, `None` at the end.
  pub fn get(&self) -> Option<&'a T> {
    if self.is_end() {
      return None;
    }
    Some(unsafe { &*self.raw.cur })
  }

  /// Position inside the current buffer.
  pub fn offset_in_buffer(&self) -> usize {
    self.raw.offset_in_buffer()
  }

  /// Map slot of the current buffer.
  pub fn buffer_slot(&self) -> usize {
    unsafe { self.raw.node.offset_from(self.deque.map.as_ptr()) as usize }
  }

  pub fn offset(
    &self,
    n: isize,
  ) -> Option<Self> {
    let target = (self.index() as isize).checked_add(n)?;
    if target < 0 || target as usize > self.deque.len() {
      return None;
    }
    Some(Self {
      raw: unsafe { self.raw.offset(n) },
      deque: self.deque,
    })
  }

  /// Steps forward; `false` (and no move) at the end.
  pub fn move_next(&mut self) -> bool {
    if self.is_end() {
      return false;
    }
    unsafe { self.raw.step_forward() };
    true
  }

  /// Steps backward; `false` (and no move) at the beginning.
  pub fn move_prev(&mut self) -> bool {
    if self.raw.cur == self.deque.begin.cur {
      return false;
    }
    unsafe { self.raw.step_backward() };
    true
  }

  /// Signed distance from `origin` to `self`.
  pub fn distance_from(
    &self,
    origin: &Self,
  ) -> isize {
    unsafe { self.raw.distance(&origin.raw) }
  }
}

impl<T, A: RawAlloc> Add<isize> for Cursor<'_, T, A> {
  type Output = Self;

  fn add(
    self,
    n: isize,
  ) -> Self {
    match self.offset(n) {
      Some(moved) => moved,
      None => panic!("cursor moved out of range: {} + {n}", self.index()),
    }
  }
}

impl<T, A: RawAlloc> Sub<isize> for Cursor<'_, T, A> {
  type Output = Self;

  fn sub(
    self,
    n: isize,
  ) -> Self {
    self + n.wrapping_neg()
  }
}

impl<T, A: RawAlloc> AddAssign<isize> for Cursor<'_, T, A> {
  fn add_assign(
    &mut self,
    n: isize,
  ) {
    *self = *self + n;
  }
}

impl<T, A: RawAlloc> SubAssign<isize> for Cursor<'_, T, A> {
  fn sub_assign(
    &mut self,
    n: isize,
  ) {
    *self = *self - n;
  }
}

impl<'a, T, A: RawAlloc> Sub for Cursor<'a, T, A> {
  type Output = isize;

  fn sub(
    self,
    origin: Self,
  ) -> isize {
    self.distance_from(&origin)
  }
}

impl<T, A: RawAlloc> PartialEq for Cursor<'_, T, A> {
  fn eq(
    &self,
    other: &Self,
  ) -> bool {
    self.raw.cur == other.raw.cur
  }
}

impl<T, A: RawAlloc> Eq for Cursor<'_, T, A> {}

impl<T, A: RawAlloc> PartialOrd for Cursor<'_, T, A> {
  fn partial_cmp(
    &self,
    other: &Self,
  ) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<T, A: RawAlloc> Ord for Cursor<'_, T, A> {
  fn cmp(
    &self,
    other: &Self,
  ) -> Ordering {
    self.raw.node.cmp(&other.raw.node).then(self.raw.cur.cmp(&other.raw.cur))
  }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for Cursor<'_, T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Cursor")
      .field("index", &self.index())
      .field("element", &self.get())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::pool::PoolAlloc;

  /// 128 bytes: four per buffer, so short deques already span buffers.
  type Wide = [u64; 16];

  fn wide(value: u64) -> Wide {
    [value; 16]
  }

  /// Builds `0..len` with `front` of the values pushed at the front so the
  /// first element sits at an arbitrary offset in its buffer.
  fn build(
    pool: &PoolAlloc,
    len: usize,
    front: usize,
  ) -> Deque<Wide, &PoolAlloc> {
    let front = front.min(len);
    let mut deque = Deque::new_in(pool);
    for value in (0..front).rev() {
      deque.push_front(wide(value as u64));
    }
    for value in front..len {
      deque.push_back(wide(value as u64));
    }
    deque
  }

  #[test]
  fn test_buffer_size_policy() {
    assert_eq!(buffer_size::<u8>(), 512);
    assert_eq!(buffer_size::<u64>(), 64);
    assert_eq!(buffer_size::<Wide>(), 4);
    assert_eq!(buffer_size::<[u8; 512]>(), 1);
    assert_eq!(buffer_size::<[u8; 4096]>(), 1);
  }

  #[test]
  fn test_stepping_crosses_buffers() {
    let pool = PoolAlloc::new();
    let deque = build(&pool, 10, 3);

    let mut cursor = deque.begin();
    let mut slots = Vec::new();
    for expected in 0..10u64 {
      assert_eq!(cursor.get().unwrap()[0], expected);
      slots.push(cursor.buffer_slot());
      assert!(cursor.move_next());
    }
    assert!(cursor.is_end());
    assert!(!cursor.move_next());

    // Three elements in the first buffer, then four, then three.
    let crossings = slots.windows(2).filter(|pair| pair[0] != pair[1]).count();
    assert_eq!(crossings, 2);

    for expected in (0..10u64).rev() {
      assert!(cursor.move_prev());
      assert_eq!(cursor.get().unwrap()[0], expected);
    }
    assert!(!cursor.move_prev());
  }

  #[test]
  fn test_negative_offsets_use_floor_division() {
    let pool = PoolAlloc::new();
    let deque = build(&pool, 13, 6);

    let end = deque.end();
    assert_eq!(end.index(), 13);
    for back in 1..=13isize {
      let cursor = end - back;
      assert_eq!(cursor.index() as isize, 13 - back);
      assert_eq!(cursor.get().unwrap()[0], (13 - back) as u64);
      assert!(cursor.offset_in_buffer() < buffer_size::<Wide>());
    }
    assert!(end.offset(-14).is_none());
    assert!(deque.begin().offset(14).is_none());
  }

  #[test]
  #[should_panic(expected = "cursor moved out of range")]
  fn test_operator_out_of_range_panics() {
    let pool = PoolAlloc::new();
    let deque = build(&pool, 3, 0);
    let _ = deque.begin() + 4;
  }

  #[test]
  fn test_ordering_and_difference() {
    let pool = PoolAlloc::new();
    let deque = build(&pool, 9, 2);

    let a = deque.cursor(1);
    let b = deque.cursor(7);
    assert!(a < b);
    assert_eq!(b - a, 6);
    assert_eq!(a - b, -6);
    assert_eq!(deque.end() - deque.begin(), 9);

    let mut c = a;
    c += 6;
    assert_eq!(c, b);
    c -= 6;
    assert_eq!(c, a);
  }

  #[test]
  fn test_copy_forward_and_backward_across_buffers() {
    let pool = PoolAlloc::new();
    let deque = build(&pool, 11, 1);

    unsafe {
      // Shift elements 2..9 left by three: [0,1,5,6,7,8,9,10,8,9,10].
      let src = deque.begin.offset(5);
      let dst = deque.begin.offset(2);
      copy_forward(src, dst, 6);
    }
    let values: Vec<u64> = deque.iter().map(|w| w[0]).collect();
    assert_eq!(values, [0, 1, 5, 6, 7, 8, 9, 10, 8, 9, 10]);

    unsafe {
      // Shift 1..6 right by four onto 5..10.
      let src_end = deque.begin.offset(6);
      let dst_end = deque.begin.offset(10);
      copy_backward(src_end, dst_end, 5);
    }
    let values: Vec<u64> = deque.iter().map(|w| w[0]).collect();
    assert_eq!(values, [0, 1, 5, 6, 7, 1, 5, 6, 7, 8, 10]);
  }

  proptest! {
    #[test]
    fn offset_matches_index_arithmetic(
      len in 0usize..40,
      front in 0usize..40,
      from in 0usize..41,
      to in 0usize..41,
    ) {
      let pool = PoolAlloc::new();
      let deque = build(&pool, len, front);
      let from = from.min(len);
      let to = to.min(len);

      let start = deque.cursor(from);
      let moved = start.offset(to as isize - from as isize).unwrap();
      prop_assert_eq!(moved.index(), to);
      prop_assert_eq!(moved, deque.cursor(to));
      prop_assert_eq!(moved - start, to as isize - from as isize);
      prop_assert!(moved.offset_in_buffer() < buffer_size::<Wide>());

      match moved.get() {
        Some(element) => prop_assert_eq!(element[0], to as u64),
        None => prop_assert_eq!(to, len),
      }
    }

    #[test]
    fn stepping_agrees_with_offsets(len in 1usize..30, front in 0usize..30) {
      let pool = PoolAlloc::new();
      let deque = build(&pool, len, front);

      let mut cursor = deque.begin();
      for index in 0..len {
        prop_assert_eq!(cursor, deque.begin() + index as isize);
        prop_assert_eq!(cursor.distance_from(&deque.begin()), index as isize);
        cursor.move_next();
      }
      prop_assert!(cursor.is_end());
    }
  }
}
