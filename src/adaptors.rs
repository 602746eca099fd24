//! Restricted interfaces over a sequence: `Stack` (LIFO) and `Queue`
//! (FIFO). Both default to a `Deque` and accept any sequence that
//! implements the operations they need.

use std::fmt;
use std::marker::PhantomData;

use crate::allocator::RawAlloc;
use crate::deque::Deque;
use crate::list::List;
use crate::vector::Vector;

/// A sequence that can grow and shrink at its back.
pub trait BackSequence {
  type Item;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn back(&self) -> Option<&Self::Item>;

  fn back_mut(&mut self) -> Option<&mut Self::Item>;

  fn push_back(
    &mut self,
    value: Self::Item,
  );

  fn pop_back(&mut self) -> Option<Self::Item>;

  fn clear(&mut self);
}

/// A sequence that can also be read and shrunk at its front.
pub trait FrontSequence: BackSequence {
  fn front(&self) -> Option<&Self::Item>;

  fn front_mut(&mut self) -> Option<&mut Self::Item>;

  fn pop_front(&mut self) -> Option<Self::Item>;
}

impl<T, A: RawAlloc> BackSequence for Deque<T, A> {
  type Item = T;

  fn len(&self) -> usize {
    Deque::len(self)
  }

  fn back(&self) -> Option<&T> {
    Deque::back(self)
  }

  fn back_mut(&mut self) -> Option<&mut T> {
    Deque::back_mut(self)
  }

  fn push_back(
    &mut self,
    value: T,
  ) {
    Deque::push_back(self, value)
  }

  fn pop_back(&mut self) -> Option<T> {
    Deque::pop_back(self)
  }

  fn clear(&mut self) {
    Deque::clear(self)
  }
}

impl<T, A: RawAlloc> FrontSequence for Deque<T, A> {
  fn front(&self) -> Option<&T> {
    Deque::front(self)
  }

  fn front_mut(&mut self) -> Option<&mut T> {
    Deque::front_mut(self)
  }

  fn pop_front(&mut self) -> Option<T> {
    Deque::pop_front(self)
  }
}

impl<T, A: RawAlloc> BackSequence for Vector<T, A> {
  type Item = T;

  fn len(&self) -> usize {
    Vector::len(self)
  }

  fn back(&self) -> Option<&T> {
    self.last()
  }

  fn back_mut(&mut self) -> Option<&mut T> {
    self.last_mut()
  }

  fn push_back(
    &mut self,
    value: T,
  ) {
    self.push(value)
  }

  fn pop_back(&mut self) -> Option<T> {
    self.pop()
  }

  fn clear(&mut self) {
    Vector::clear(self)
  }
}

impl<T, A: RawAlloc> BackSequence for List<T, A> {
  type Item = T;

  fn len(&self) -> usize {
    List::len(self)
  }

  fn back(&self) -> Option<&T> {
    List::back(self)
  }

  fn back_mut(&mut self) -> Option<&mut T> {
    List::back_mut(self)
  }

  fn push_back(
    &mut self,
    value: T,
  ) {
    List::push_back(self, value)
  }

  fn pop_back(&mut self) -> Option<T> {
    List::pop_back(self)
  }

  fn clear(&mut self) {
    List::clear(self)
  }
}

impl<T, A: RawAlloc> FrontSequence for List<T, A> {
  fn front(&self) -> Option<&T> {
    List::front(self)
  }

  fn front_mut(&mut self) -> Option<&mut T> {
    List::front_mut(self)
  }

  fn pop_front(&mut self) -> Option<T> {
    List::pop_front(self)
  }
}

/// Last in, first out.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stack<T, C: BackSequence<Item = T> = Deque<T>> {
  seq: C,
  _marker: PhantomData<T>,
}

impl<T, C: BackSequence<Item = T> + Default> Stack<T, C> {
  pub fn new() -> Self {
    Self::from_container(C::default())
  }
}

impl<T, C: BackSequence<Item = T> + Default> Default for Stack<T, C> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, C: BackSequence<Item = T>> Stack<T, C> {
  /// Uses `seq` as the storage; its back becomes the top.
  pub fn from_container(seq: C) -> Self {
    Self {
      seq,
      _marker: PhantomData,
    }
  }

  pub fn into_inner(self) -> C {
    self.seq
  }

  pub fn len(&self) -> usize {
    self.seq.len()
  }

  pub fn is_empty(&self) -> bool {
    self.seq.is_empty()
  }

  pub fn top(&self) -> Option<&T> {
    self.seq.back()
  }

  pub fn top_mut(&mut self) -> Option<&mut T> {
    self.seq.back_mut()
  }

  pub fn push(
    &mut self,
    value: T,
  ) {
    self.seq.push_back(value);
  }

  pub fn pop(&mut self) -> Option<T> {
    self.seq.pop_back()
  }

  pub fn clear(&mut self) {
    self.seq.clear();
  }

  pub fn swap(
    &mut self,
    other: &mut Self,
  ) {
    std::mem::swap(&mut self.seq, &mut other.seq);
  }
}

impl<T, C: BackSequence<Item = T>> Extend<T> for Stack<T, C> {
  fn extend<I: IntoIterator<Item = T>>(
    &mut self,
    items: I,
  ) {
    for item in items {
      self.push(item);
    }
  }
}

impl<T, C: BackSequence<Item = T> + fmt::Debug> fmt::Debug for Stack<T, C> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("Stack").field(&self.seq).finish()
  }
}

/// First in, first out.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Queue<T, C: FrontSequence<Item = T> = Deque<T>> {
  seq: C,
  _marker: PhantomData<T>,
}

impl<T, C: FrontSequence<Item = T> + Default> Queue<T, C> {
  pub fn new() -> Self {
    Self::from_container(C::default())
  }
}

impl<T, C: FrontSequence<Item = T> + Default> Default for Queue<T, C> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, C: FrontSequence<Item = T>> Queue<T, C> {
  /// Uses `seq` as the storage; its front is the next element out.
  pub fn from_container(seq: C) -> Self {
    Self {
      seq,
      _marker: PhantomData,
    }
  }

  pub fn into_inner(self) -> C {
    self.seq
  }

  pub fn len(&self) -> usize {
    self.seq.len()
  }

  pub fn is_empty(&self) -> bool {
    self.seq.is_empty()
  }

  pub fn front(&self) -> Option<&T> {
    self.seq.front()
  }

  pub fn front_mut(&mut self) -> Option<&mut T> {
    self.seq.front_mut()
  }

  pub fn back(&self) -> Option<&T> {
    self.seq.back()
  }

  pub fn back_mut(&mut self) -> Option<&mut T> {
    self.seq.back_mut()
  }

  pub fn push(
    &mut self,
    value: T,
  ) {
    self.seq.push_back(value);
  }

  pub fn pop(&mut self) -> Option<T> {
    self.seq.pop_front()
  }

  pub fn clear(&mut self) {
    self.seq.clear();
  }

  pub fn swap(
    &mut self,
    other: &mut Self,
  ) {
    std::mem::swap(&mut self.seq, &mut other.seq);
  }
}

impl<T, C: FrontSequence<Item = T>> Extend<T> for Queue<T, C> {
  fn extend<I: IntoIterator<Item = T>>(
    &mut self,
    items: I,
  ) {
    for item in items {
      self.push(item);
    }
  }
}

impl<T, C: FrontSequence<Item = T> + fmt::Debug> fmt::Debug for Queue<T, C> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("Queue").field(&self.seq).finish()
  }
}
