//! Contiguous growable array on a `RawAlloc`.
//!
//! ```text
//!   ptr ─▶ ┌────┬────┬────┬────┬────┬────┬────┬────┐
//!          │ a  │ b  │ c  │ d  │ e  │ ·  │ ·  │ ·  │
//!          └────┴────┴────┴────┴────┴────┴────┴────┘
//!          ◀──────── len ────────▶
//!          ◀────────────────── cap ─────────────────▶
//! ```
//!
//! Capacity doubles when exhausted and the storage is resized with
//! `RawAlloc::reallocate`, so blocks served by the malloc tier can grow in
//! place.

use std::alloc::Layout;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use crate::allocator::{DefaultAlloc, RawAlloc, allocate_array, deallocate_array};
use crate::error::AllocError;

pub struct Vector<T, A: RawAlloc = DefaultAlloc> {
  ptr: NonNull<T>,
  cap: usize,
  len: usize,
  alloc: A,
  _marker: PhantomData<T>,
}

unsafe impl<T: Send, A: RawAlloc + Send> Send for Vector<T, A> {}
unsafe impl<T: Sync, A: RawAlloc + Sync> Sync for Vector<T, A> {}

impl<T> Vector<T> {
  pub fn new() -> Self {
    Self::new_in(DefaultAlloc)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self::with_capacity_in(capacity, DefaultAlloc)
  }
}

impl<T> Default for Vector<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, A: RawAlloc> Vector<T, A> {
  const ELEMENT_CHECK: () = assert!(size_of::<T>() != 0, "Vector does not support zero-sized elements");

  /// Empty vector; nothing is allocated until the first push.
  pub fn new_in(alloc: A) -> Self {
    let () = Self::ELEMENT_CHECK;
    Self {
      ptr: NonNull::dangling(),
      cap: 0,
      len: 0,
      alloc,
      _marker: PhantomData,
    }
  }

  pub fn with_capacity_in(
    capacity: usize,
    alloc: A,
  ) -> Self {
    Self::try_with_capacity_in(capacity, alloc).unwrap_or_else(|err| err.handle())
  }

  pub fn try_with_capacity_in(
    capacity: usize,
    alloc: A,
  ) -> Result<Self, AllocError> {
    let mut vector = Self::new_in(alloc);
    vector.try_reserve(capacity)?;
    Ok(vector)
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn capacity(&self) -> usize {
    self.cap
  }

  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  pub fn as_slice(&self) -> &[T] {
    unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }

  pub fn as_mut_slice(&mut self) -> &mut [T] {
    unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
  }

  /// Ensures room for `additional` more elements.
  pub fn reserve(
    &mut self,
    additional: usize,
  ) {
    self.try_reserve(additional).unwrap_or_else(|err| err.handle())
  }

  /// Like `reserve`, reporting failure instead of diverging. Grows to at
  /// least twice the current capacity.
  pub fn try_reserve(
    &mut self,
    additional: usize,
  ) -> Result<(), AllocError> {
    let wanted = self.len.checked_add(additional).ok_or(AllocError::CapacityOverflow)?;
    if wanted <= self.cap {
      return Ok(());
    }
    self.set_capacity(wanted.max(self.cap.saturating_mul(2)))
  }

  /// Resizes the storage to exactly `len` elements.
  pub fn shrink_to_fit(&mut self) {
    if self.cap > self.len {
      self.set_capacity(self.len).unwrap_or_else(|err| err.handle());
    }
  }

  fn set_capacity(
    &mut self,
    new_cap: usize,
  ) -> Result<(), AllocError> {
    if new_cap == 0 {
      if self.cap > 0 {
        unsafe { deallocate_array(&self.alloc, self.ptr, self.cap) };
      }
      self.ptr = NonNull::dangling();
      self.cap = 0;
      return Ok(());
    }

    let ptr = if self.cap == 0 {
      allocate_array::<T, A>(&self.alloc, new_cap)?
    } else {
      let new_size = Layout::array::<T>(new_cap).map_err(|_| AllocError::CapacityOverflow)?.size();
      unsafe {
        let old = Layout::from_size_align_unchecked(self.cap * size_of::<T>(), align_of::<T>());
        self.alloc.reallocate(self.ptr.cast(), old, new_size)?.cast()
      }
    };
    self.ptr = ptr;
    self.cap = new_cap;
    Ok(())
  }

  pub fn push(
    &mut self,
    value: T,
  ) {
    self.try_push(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push(
    &mut self,
    value: T,
  ) -> Result<(), AllocError> {
    if self.len == self.cap {
      self.try_reserve(1)?;
    }
    unsafe { self.ptr.as_ptr().add(self.len).write(value) };
    self.len += 1;
    Ok(())
  }

  pub fn pop(&mut self) -> Option<T> {
    if self.len == 0 {
      return None;
    }
    self.len -= 1;
    Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
  }

  /// # Panics
  ///
  /// If `index > len()`.
  pub fn insert(
    &mut self,
    index: usize,
    value: T,
  ) {
    let len = self.len;
    assert!(index <= len, "insertion index (is {index}) should be <= len (is {len})");
    self.reserve(1);
    unsafe {
      let at = self.ptr.as_ptr().add(index);
      ptr::copy(at, at.add(1), len - index);
      at.write(value);
    }
    self.len += 1;
  }

  /// # Panics
  ///
  /// If `index >= len()`.
  pub fn remove(
    &mut self,
    index: usize,
  ) -> T {
    let len = self.len;
    assert!(index < len, "removal index (is {index}) should be < len (is {len})");
    unsafe {
      let at = self.ptr.as_ptr().add(index);
      let value = at.read();
      ptr::copy(at.add(1), at, len - index - 1);
      self.len -= 1;
      value
    }
  }

  pub fn truncate(
    &mut self,
    len: usize,
  ) {
    if len >= self.len {
      return;
    }
    let tail = self.len - len;
    self.len = len;
    unsafe {
      ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr().add(len), tail));
    }
  }

  pub fn clear(&mut self) {
    self.truncate(0);
  }

  pub fn resize(
    &mut self,
    len: usize,
    value: T,
  ) where
    T: Clone,
  {
    self.resize_with(len, || value.clone());
  }

  pub fn resize_with(
    &mut self,
    len: usize,
    mut make: impl FnMut() -> T,
  ) {
    if len <= self.len {
      self.truncate(len);
      return;
    }
    self.reserve(len - self.len);
    while self.len < len {
      unsafe { self.ptr.as_ptr().add(self.len).write(make()) };
      self.len += 1;
    }
  }

  pub fn extend_from_slice(
    &mut self,
    items: &[T],
  ) where
    T: Clone,
  {
    self.reserve(items.len());
    for item in items {
      unsafe { self.ptr.as_ptr().add(self.len).write(item.clone()) };
      self.len += 1;
    }
  }
}

impl<T, A: RawAlloc> Drop for Vector<T, A> {
  fn drop(&mut self) {
    unsafe {
      ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len));
      if self.cap > 0 {
        deallocate_array(&self.alloc, self.ptr, self.cap);
      }
    }
  }
}

impl<T, A: RawAlloc> Deref for Vector<T, A> {
  type Target = [T];

  fn deref(&self) -> &[T] {
    self.as_slice()
  }
}

impl<T, A: RawAlloc> DerefMut for Vector<T, A> {
  fn deref_mut(&mut self) -> &mut [T] {
    self.as_mut_slice()
  }
}

impl<T, A: RawAlloc> Extend<T> for Vector<T, A> {
  fn extend<I: IntoIterator<Item = T>>(
    &mut self,
    items: I,
  ) {
    let items = items.into_iter();
    self.reserve(items.size_hint().0);
    for item in items {
      self.push(item);
    }
  }
}

impl<T> FromIterator<T> for Vector<T> {
  fn from_iter<I: IntoIterator<Item = T>>(items: I) -> Self {
    let mut vector = Self::new();
    vector.extend(items);
    vector
  }
}

impl<T, const N: usize> From<[T; N]> for Vector<T> {
  fn from(items: [T; N]) -> Self {
    items.into_iter().collect()
  }
}

impl<T: Clone, A: RawAlloc + Clone> Clone for Vector<T, A> {
  fn clone(&self) -> Self {
    let mut copy = Self::with_capacity_in(self.len, self.alloc.clone());
    copy.extend_from_slice(self);
    copy
  }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for Vector<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    fmt::Debug::fmt(self.as_slice(), f)
  }
}

impl<T: PartialEq<U>, U, A: RawAlloc, B: RawAlloc> PartialEq<Vector<U, B>> for Vector<T, A> {
  fn eq(
    &self,
    other: &Vector<U, B>,
  ) -> bool {
    self.as_slice() == other.as_slice()
  }
}

impl<T: PartialEq<U>, U, A: RawAlloc, const N: usize> PartialEq<[U; N]> for Vector<T, A> {
  fn eq(
    &self,
    other: &[U; N],
  ) -> bool {
    self.as_slice() == &other[..]
  }
}

impl<T: Eq, A: RawAlloc> Eq for Vector<T, A> {}

impl<T: PartialOrd, A: RawAlloc> PartialOrd for Vector<T, A> {
  fn partial_cmp(
    &self,
    other: &Self,
  ) -> Option<Ordering> {
    self.as_slice().partial_cmp(other.as_slice())
  }
}

impl<T: Ord, A: RawAlloc> Ord for Vector<T, A> {
  fn cmp(
    &self,
    other: &Self,
  ) -> Ordering {
    self.as_slice().cmp(other.as_slice())
  }
}

impl<T: Hash, A: RawAlloc> Hash for Vector<T, A> {
  fn hash<H: Hasher>(
    &self,
    state: &mut H,
  ) {
    self.as_slice().hash(state);
  }
}

impl<'a, T, A: RawAlloc> IntoIterator for &'a Vector<T, A> {
  type Item = &'a T;
  type IntoIter = slice::Iter<'a, T>;

  fn into_iter(self) -> slice::Iter<'a, T> {
    self.iter()
  }
}

impl<'a, T, A: RawAlloc> IntoIterator for &'a mut Vector<T, A> {
  type Item = &'a mut T;
  type IntoIter = slice::IterMut<'a, T>;

  fn into_iter(self) -> slice::IterMut<'a, T> {
    self.iter_mut()
  }
}

impl<T, A: RawAlloc> IntoIterator for Vector<T, A> {
  type Item = T;
  type IntoIter = IntoIter<T, A>;

  fn into_iter(self) -> IntoIter<T, A> {
    let vector = ManuallyDrop::new(self);
    IntoIter {
      buf: vector.ptr,
      cap: vector.cap,
      head: 0,
      tail: vector.len,
      alloc: unsafe { ptr::read(&vector.alloc) },
    }
  }
}

/// Owning iterator of a `Vector`.
pub struct IntoIter<T, A: RawAlloc = DefaultAlloc> {
  buf: NonNull<T>,
  cap: usize,
  head: usize,
  tail: usize,
  alloc: A,
}

unsafe impl<T: Send, A: RawAlloc + Send> Send for IntoIter<T, A> {}

impl<T, A: RawAlloc> IntoIter<T, A> {
  pub fn as_slice(&self) -> &[T] {
    unsafe { slice::from_raw_parts(self.buf.as_ptr().add(self.head), self.tail - self.head) }
  }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for IntoIter<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("IntoIter").field(&self.as_slice()).finish()
  }
}

impl<T, A: RawAlloc> Iterator for IntoIter<T, A> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    if self.head == self.tail {
      return None;
    }
    let value = unsafe { self.buf.as_ptr().add(self.head).read() };
    self.head += 1;
    Some(value)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = self.tail - self.head;
    (len, Some(len))
  }
}

impl<T, A: RawAlloc> DoubleEndedIterator for IntoIter<T, A> {
  fn next_back(&mut self) -> Option<T> {
    if self.head == self.tail {
      return None;
    }
    self.tail -= 1;
    Some(unsafe { self.buf.as_ptr().add(self.tail).read() })
  }
}

impl<T, A: RawAlloc> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: RawAlloc> FusedIterator for IntoIter<T, A> {}

impl<T, A: RawAlloc> Drop for IntoIter<T, A> {
  fn drop(&mut self) {
    unsafe {
      let rest = ptr::slice_from_raw_parts_mut(self.buf.as_ptr().add(self.head), self.tail - self.head);
      ptr::drop_in_place(rest);
      if self.cap > 0 {
        deallocate_array(&self.alloc, self.buf, self.cap);
      }
    }
  }
}
