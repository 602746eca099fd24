use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::allocator::RawAlloc;

use super::Deque;
use super::cursor::RawCursor;

/// Borrowing iterator over a `Deque`, front to back.
pub struct Iter<'a, T> {
  front: RawCursor<T>,
  back: RawCursor<T>,
  remaining: usize,
  _marker: PhantomData<&'a T>,
}

unsafe impl<T: Sync> Send for Iter<'_, T> {}
unsafe impl<T: Sync> Sync for Iter<'_, T> {}

impl<T> Iter<'_, T> {
  pub(super) fn new(
    front: RawCursor<T>,
    back: RawCursor<T>,
    remaining: usize,
  ) -> Self {
    Self {
      front,
      back,
      remaining,
      _marker: PhantomData,
    }
  }
}

impl<T> Clone for Iter<'_, T> {
  fn clone(&self) -> Self {
    Self::new(self.front, self.back, self.remaining)
  }
}

impl<T> fmt::Debug for Iter<'_, T> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Iter").field("remaining", &self.remaining).finish()
  }
}

impl<'a, T> Iterator for Iter<'a, T> {
  type Item = &'a T;

  fn next(&mut self) -> Option<&'a T> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    unsafe {
      let element = &*self.front.cur;
      self.front.step_forward();
      Some(element)
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.remaining, Some(self.remaining))
  }

  /// Jumps with one cursor offset instead of stepping `n` times.
  fn nth(
    &mut self,
    n: usize,
  ) -> Option<&'a T> {
    if n >= self.remaining {
      self.front = self.back;
      self.remaining = 0;
      return None;
    }
    self.front = unsafe { self.front.offset(n as isize) };
    self.remaining -= n;
    self.next()
  }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    unsafe {
      self.back.step_backward();
      Some(&*self.back.cur)
    }
  }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Mutable iterator over a `Deque`.
pub struct IterMut<'a, T> {
  front: RawCursor<T>,
  back: RawCursor<T>,
  remaining: usize,
  _marker: PhantomData<&'a mut T>,
}

unsafe impl<T: Send> Send for IterMut<'_, T> {}
unsafe impl<T: Sync> Sync for IterMut<'_, T> {}

impl<T> IterMut<'_, T> {
  pub(super) fn new(
    front: RawCursor<T>,
    back: RawCursor<T>,
    remaining: usize,
  ) -> Self {
    Self {
      front,
      back,
      remaining,
      _marker: PhantomData,
    }
  }
}

impl<T> fmt::Debug for IterMut<'_, T> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("IterMut").field("remaining", &self.remaining).finish()
  }
}

impl<'a, T> Iterator for IterMut<'a, T> {
  type Item = &'a mut T;

  fn next(&mut self) -> Option<&'a mut T> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    unsafe {
      let element = &mut *self.front.cur;
      self.front.step_forward();
      Some(element)
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.remaining, Some(self.remaining))
  }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    unsafe {
      self.back.step_backward();
      Some(&mut *self.back.cur)
    }
  }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

/// Owning iterator; buffers are released as they empty.
pub struct IntoIter<T, A: RawAlloc> {
  deque: Deque<T, A>,
}

impl<T, A: RawAlloc> IntoIter<T, A> {
  pub(super) fn new(deque: Deque<T, A>) -> Self {
    Self { deque }
  }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for IntoIter<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("IntoIter").field(&self.deque).finish()
  }
}

impl<T, A: RawAlloc> Iterator for IntoIter<T, A> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    self.deque.pop_front()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = self.deque.len();
    (len, Some(len))
  }
}

impl<T, A: RawAlloc> DoubleEndedIterator for IntoIter<T, A> {
  fn next_back(&mut self) -> Option<T> {
    self.deque.pop_back()
  }
}

impl<T, A: RawAlloc> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: RawAlloc> FusedIterator for IntoIter<T, A> {}
