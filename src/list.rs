//! Doubly linked list whose nodes come from a `RawAlloc`.
//!
//! ```text
//!   head                                    tail
//!    │                                       │
//!    ▼                                       ▼
//!  ┌──────┐ next  ┌──────┐ next  ┌──────┐
//!  │  a   │──────▶│  b   │──────▶│  c   │──▶ ∅
//!  │      │◀──────│      │◀──────│      │
//!  └──────┘  prev └──────┘  prev └──────┘
//! ```
//!
//! Nodes are small fixed-size blocks, the case the pool's free lists are
//! built for. `sort` relinks nodes without allocating.

use std::alloc::Layout;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::allocator::{DefaultAlloc, RawAlloc};
use crate::error::AllocError;

type Link<T> = Option<NonNull<Node<T>>>;

struct Node<T> {
  prev: Link<T>,
  next: Link<T>,
  value: T,
}

pub struct List<T, A: RawAlloc = DefaultAlloc> {
  head: Link<T>,
  tail: Link<T>,
  len: usize,
  alloc: A,
  _marker: PhantomData<Node<T>>,
}

unsafe impl<T: Send, A: RawAlloc + Send> Send for List<T, A> {}
unsafe impl<T: Sync, A: RawAlloc + Sync> Sync for List<T, A> {}

impl<T> List<T> {
  pub fn new() -> Self {
    Self::new_in(DefaultAlloc)
  }
}

impl<T> Default for List<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, A: RawAlloc> List<T, A> {
  pub fn new_in(alloc: A) -> Self {
    Self {
      head: None,
      tail: None,
      len: 0,
      alloc,
      _marker: PhantomData,
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  fn new_node(
    &self,
    value: T,
  ) -> Result<NonNull<Node<T>>, AllocError> {
    let node = self.alloc.allocate(Layout::new::<Node<T>>())?.cast::<Node<T>>();
    unsafe {
      node.as_ptr().write(Node {
        prev: None,
        next: None,
        value,
      })
    };
    Ok(node)
  }

  /// Frees `node` and returns its value.
  ///
  /// # Safety
  ///
  /// `node` must be unlinked and come from `new_node`.
  unsafe fn free_node(
    &self,
    node: NonNull<Node<T>>,
  ) -> T {
    unsafe {
      let value = node.as_ptr().read().value;
      self.alloc.deallocate(node.cast(), Layout::new::<Node<T>>());
      value
    }
  }

  /// Links `node` before `next` (at the back when `next` is `None`).
  unsafe fn link_before(
    &mut self,
    node: NonNull<Node<T>>,
    next: Link<T>,
  ) {
    unsafe {
      let prev = match next {
        Some(next) => (*next.as_ptr()).prev,
        None => self.tail,
      };
      (*node.as_ptr()).prev = prev;
      (*node.as_ptr()).next = next;
      match prev {
        Some(prev) => (*prev.as_ptr()).next = Some(node),
        None => self.head = Some(node),
      }
      match next {
        Some(next) => (*next.as_ptr()).prev = Some(node),
        None => self.tail = Some(node),
      }
    }
    self.len += 1;
  }

  unsafe fn unlink(
    &mut self,
    node: NonNull<Node<T>>,
  ) {
    unsafe {
      let prev = (*node.as_ptr()).prev;
      let next = (*node.as_ptr()).next;
      match prev {
        Some(prev) => (*prev.as_ptr()).next = next,
        None => self.head = next,
      }
      match next {
        Some(next) => (*next.as_ptr()).prev = prev,
        None => self.tail = prev,
      }
    }
    self.len -= 1;
  }

  /// Node at `index`, walking from the nearer end.
  fn node_at(
    &self,
    index: usize,
  ) -> Link<T> {
    if index >= self.len {
      return None;
    }
    unsafe {
      if index <= self.len / 2 {
        let mut node = self.head;
        for _ in 0..index {
          node = node.and_then(|n| (*n.as_ptr()).next);
        }
        node
      } else {
        let mut node = self.tail;
        for _ in index + 1..self.len {
          node = node.and_then(|n| (*n.as_ptr()).prev);
        }
        node
      }
    }
  }

  pub fn front(&self) -> Option<&T> {
    self.head.map(|node| unsafe { &(*node.as_ptr()).value })
  }

  pub fn front_mut(&mut self) -> Option<&mut T> {
    self.head.map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  pub fn back(&self) -> Option<&T> {
    self.tail.map(|node| unsafe { &(*node.as_ptr()).value })
  }

  pub fn back_mut(&mut self) -> Option<&mut T> {
    self.tail.map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  pub fn get(
    &self,
    index: usize,
  ) -> Option<&T> {
    self.node_at(index).map(|node| unsafe { &(*node.as_ptr()).value })
  }

  pub fn push_back(
    &mut self,
    value: T,
  ) {
    self.try_push_back(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push_back(
    &mut self,
    value: T,
  ) -> Result<(), AllocError> {
    let node = self.new_node(value)?;
    unsafe { self.link_before(node, None) };
    Ok(())
  }

  pub fn push_front(
    &mut self,
    value: T,
  ) {
    self.try_push_front(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push_front(
    &mut self,
    value: T,
  ) -> Result<(), AllocError> {
    let node = self.new_node(value)?;
    unsafe { self.link_before(node, self.head) };
    Ok(())
  }

  pub fn pop_front(&mut self) -> Option<T> {
    let node = self.head?;
    unsafe {
      self.unlink(node);
      Some(self.free_node(node))
    }
  }

  pub fn pop_back(&mut self) -> Option<T> {
    let node = self.tail?;
    unsafe {
      self.unlink(node);
      Some(self.free_node(node))
    }
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
    let next = self.node_at(index);
    let node = self.new_node(value).unwrap_or_else(|err| err.handle());
    unsafe { self.link_before(node, next) };
  }

  pub fn remove(
    &mut self,
    index: usize,
  ) -> Option<T> {
    let node = self.node_at(index)?;
    unsafe {
      self.unlink(node);
      Some(self.free_node(node))
    }
  }

  pub fn clear(&mut self) {
    while self.pop_front().is_some() {}
  }

  pub fn contains(
    &self,
    value: &T,
  ) -> bool
  where
    T: PartialEq,
  {
    self.iter().any(|element| element == value)
  }

  /// Moves every element of `other` to the back of `self`, leaving
  /// `other` empty. Nodes are re-created in `self`'s allocator.
  pub fn append(
    &mut self,
    other: &mut Self,
  ) {
    while let Some(value) = other.pop_front() {
      self.push_back(value);
    }
  }

  pub fn reverse(&mut self) {
    let mut node = self.head;
    while let Some(current) = node {
      unsafe {
        let current = &mut *current.as_ptr();
        std::mem::swap(&mut current.prev, &mut current.next);
        node = current.prev;
      }
    }
    std::mem::swap(&mut self.head, &mut self.tail);
  }

  /// Removes the elements for which `keep` returns `false`.
  pub fn retain(
    &mut self,
    mut keep: impl FnMut(&T) -> bool,
  ) {
    let mut node = self.head;
    while let Some(current) = node {
      unsafe {
        node = (*current.as_ptr()).next;
        if !keep(&(*current.as_ptr()).value) {
          self.unlink(current);
          drop(self.free_node(current));
        }
      }
    }
  }

  /// Removes consecutive repeated elements.
  pub fn dedup(&mut self)
  where
    T: PartialEq,
  {
    self.dedup_by(|a, b| a == b);
  }

  /// Removes each element `same(previous_kept, element)` matches.
  pub fn dedup_by(
    &mut self,
    mut same: impl FnMut(&T, &T) -> bool,
  ) {
    let Some(mut kept) = self.head else {
      return;
    };
    unsafe {
      while let Some(current) = (*kept.as_ptr()).next {
        if same(&(*kept.as_ptr()).value, &(*current.as_ptr()).value) {
          self.unlink(current);
          drop(self.free_node(current));
        } else {
          kept = current;
        }
      }
    }
  }

  /// Stable merge sort by relinking nodes.
  pub fn sort(&mut self)
  where
    T: Ord,
  {
    self.sort_by(|a, b| a < b);
  }

  /// Bottom-up merge sort: runs of 1, 2, 4, ... nodes are kept in bins and
  /// merged as they fill. If `is_less` panics, every node is still linked
  /// back into the list, in an unspecified order.
  pub fn sort_by(
    &mut self,
    mut is_less: impl FnMut(&T, &T) -> bool,
  ) {
    let input = self.head;
    let mut guard = Relink {
      list: self,
      chains: Chains::new(input),
    };
    unsafe { guard.chains.sort(&mut is_less) };
  }

  /// Merges the sorted `other` into the sorted `self`; elements of `self`
  /// come first among equals. `other` is left empty.
  pub fn merge(
    &mut self,
    other: &mut Self,
  ) where
    T: Ord,
  {
    self.merge_by(other, |a, b| a < b);
  }

  pub fn merge_by(
    &mut self,
    other: &mut Self,
    mut is_less: impl FnMut(&T, &T) -> bool,
  ) {
    let split = self.len;
    self.append(other);
    if split == 0 || split == self.len {
      return;
    }

    let mut guard = Relink {
      list: self,
      chains: Chains::new(None),
    };
    unsafe {
      let (left, right) = split_chain(guard.list.head, split);
      guard.chains.carry = guard.chains.merge(left, right, &mut is_less);
    }
  }

  /// Rebuilds `prev` links and `tail` from a `next` chain.
  unsafe fn relink(
    &mut self,
    chain: Link<T>,
  ) {
    self.head = chain;
    let mut prev: Link<T> = None;
    let mut node = chain;
    while let Some(current) = node {
      unsafe {
        (*current.as_ptr()).prev = prev;
        node = (*current.as_ptr()).next;
      }
      prev = Some(current);
    }
    self.tail = prev;
  }

  pub fn iter(&self) -> Iter<'_, T> {
    Iter {
      head: self.head,
      tail: self.tail,
      len: self.len,
      _marker: PhantomData,
    }
  }

  pub fn iter_mut(&mut self) -> IterMut<'_, T> {
    IterMut {
      head: self.head,
      tail: self.tail,
      len: self.len,
      _marker: PhantomData,
    }
  }
}

/// Cuts the chain after `count` nodes.
unsafe fn split_chain<T>(
  head: Link<T>,
  count: usize,
) -> (Link<T>, Link<T>) {
  let mut last = head;
  for _ in 1..count {
    last = last.and_then(|node| unsafe { (*node.as_ptr()).next });
  }
  let Some(last) = last else {
    return (head, None);
  };
  unsafe {
    let rest = (*last.as_ptr()).next.take();
    (head, rest)
  }
}

/// Runs in bin `i` hold `2^i` nodes; enough bins for any list that fits in
/// memory.
const SORT_BINS: usize = usize::BITS as usize;

/// `next` chains of a list being sorted or merged. Every node of the list
/// sits in exactly one of them whenever the comparator runs.
struct Chains<T> {
  input: Link<T>,
  carry: Link<T>,
  bins: [Link<T>; SORT_BINS],
  left: Link<T>,
  right: Link<T>,
  merged: Link<T>,
  merged_tail: Link<T>,
}

impl<T> Chains<T> {
  fn new(input: Link<T>) -> Self {
    Self {
      input,
      carry: None,
      bins: [None; SORT_BINS],
      left: None,
      right: None,
      merged: None,
      merged_tail: None,
    }
  }

  /// Sorts `input` into `carry`.
  unsafe fn sort(
    &mut self,
    is_less: &mut impl FnMut(&T, &T) -> bool,
  ) {
    let mut fill = 0;
    while let Some(node) = self.input {
      unsafe {
        self.input = (*node.as_ptr()).next.take();
        self.carry = Some(node);
        let mut bin = 0;
        while bin < fill && self.bins[bin].is_some() {
          let earlier = self.bins[bin].take();
          let later = self.carry.take();
          self.carry = self.merge(earlier, later, is_less);
          bin += 1;
        }
        self.bins[bin] = self.carry.take();
        if bin == fill {
          fill += 1;
        }
      }
    }

    for bin in 0..fill {
      let earlier = self.bins[bin].take();
      let later = self.carry.take();
      self.carry = unsafe { self.merge(earlier, later, is_less) };
    }
  }

  /// Stable merge of two sorted chains; `earlier` wins ties.
  unsafe fn merge(
    &mut self,
    earlier: Link<T>,
    later: Link<T>,
    is_less: &mut impl FnMut(&T, &T) -> bool,
  ) -> Link<T> {
    self.left = earlier;
    self.right = later;
    unsafe {
      while let (Some(l), Some(r)) = (self.left, self.right) {
        let node = if is_less(&(*r.as_ptr()).value, &(*l.as_ptr()).value) {
          self.right = (*r.as_ptr()).next;
          r
        } else {
          self.left = (*l.as_ptr()).next;
          l
        };
        match self.merged_tail {
          Some(tail) => (*tail.as_ptr()).next = Some(node),
          None => self.merged = Some(node),
        }
        self.merged_tail = Some(node);
      }

      let rest = self.left.take().or(self.right.take());
      match self.merged_tail.take() {
        Some(tail) => (*tail.as_ptr()).next = rest,
        None => self.merged = rest,
      }
    }
    self.merged.take()
  }

  /// Joins every chain into one.
  unsafe fn gather(&mut self) -> Link<T> {
    unsafe {
      // The tail of a merge in progress still links into its source chain.
      if let Some(tail) = self.merged_tail.take() {
        (*tail.as_ptr()).next = None;
      }

      let mut head: Link<T> = None;
      let mut tail: Link<T> = None;
      let pending = [self.merged.take(), self.left.take(), self.right.take(), self.carry.take(), self.input.take()];
      let bins = self.bins.iter_mut().map(Option::take);
      for chain in pending.into_iter().chain(bins).flatten() {
        match tail {
          Some(last) => (*last.as_ptr()).next = Some(chain),
          None => head = Some(chain),
        }
        let mut last = chain;
        while let Some(next) = (*last.as_ptr()).next {
          last = next;
        }
        tail = Some(last);
      }
      head
    }
  }
}

/// Puts a list's nodes back together from its `Chains`, on success and on
/// unwind alike.
struct Relink<'a, T, A: RawAlloc> {
  list: &'a mut List<T, A>,
  chains: Chains<T>,
}

impl<T, A: RawAlloc> Drop for Relink<'_, T, A> {
  fn drop(&mut self) {
    unsafe {
      let chain = self.chains.gather();
      self.list.relink(chain);
    }
  }
}

impl<T, A: RawAlloc> Drop for List<T, A> {
  fn drop(&mut self) {
    self.clear();
  }
}

pub struct Iter<'a, T> {
  head: Link<T>,
  tail: Link<T>,
  len: usize,
  _marker: PhantomData<&'a T>,
}

impl<T> Clone for Iter<'_, T> {
  fn clone(&self) -> Self {
    Self {
      head: self.head,
      tail: self.tail,
      len: self.len,
      _marker: PhantomData,
    }
  }
}

impl<'a, T> Iterator for Iter<'a, T> {
  type Item = &'a T;

  fn next(&mut self) -> Option<&'a T> {
    if self.len == 0 {
      return None;
    }
    self.head.map(|node| unsafe {
      let node = &*node.as_ptr();
      self.len -= 1;
      self.head = node.next;
      &node.value
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.len, Some(self.len))
  }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.len == 0 {
      return None;
    }
    self.tail.map(|node| unsafe {
      let node = &*node.as_ptr();
      self.len -= 1;
      self.tail = node.prev;
      &node.value
    })
  }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

pub struct IterMut<'a, T> {
  head: Link<T>,
  tail: Link<T>,
  len: usize,
  _marker: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
  type Item = &'a mut T;

  fn next(&mut self) -> Option<&'a mut T> {
    if self.len == 0 {
      return None;
    }
    self.head.map(|node| unsafe {
      let node = &mut *node.as_ptr();
      self.len -= 1;
      self.head = node.next;
      &mut node.value
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.len, Some(self.len))
  }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.len == 0 {
      return None;
    }
    self.tail.map(|node| unsafe {
      let node = &mut *node.as_ptr();
      self.len -= 1;
      self.tail = node.prev;
      &mut node.value
    })
  }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

pub struct IntoIter<T, A: RawAlloc = DefaultAlloc> {
  list: List<T, A>,
}

impl<T, A: RawAlloc> Iterator for IntoIter<T, A> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    self.list.pop_front()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.list.len, Some(self.list.len))
  }
}

impl<T, A: RawAlloc> DoubleEndedIterator for IntoIter<T, A> {
  fn next_back(&mut self) -> Option<T> {
    self.list.pop_back()
  }
}

impl<T, A: RawAlloc> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: RawAlloc> FusedIterator for IntoIter<T, A> {}

impl<T, A: RawAlloc> IntoIterator for List<T, A> {
  type Item = T;
  type IntoIter = IntoIter<T, A>;

  fn into_iter(self) -> IntoIter<T, A> {
    IntoIter { list: self }
  }
}

impl<'a, T, A: RawAlloc> IntoIterator for &'a List<T, A> {
  type Item = &'a T;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Iter<'a, T> {
    self.iter()
  }
}

impl<'a, T, A: RawAlloc> IntoIterator for &'a mut List<T, A> {
  type Item = &'a mut T;
  type IntoIter = IterMut<'a, T>;

  fn into_iter(self) -> IterMut<'a, T> {
    self.iter_mut()
  }
}

impl<T, A: RawAlloc> Extend<T> for List<T, A> {
  fn extend<I: IntoIterator<Item = T>>(
    &mut self,
    items: I,
  ) {
    for item in items {
      self.push_back(item);
    }
  }
}

impl<T> FromIterator<T> for List<T> {
  fn from_iter<I: IntoIterator<Item = T>>(items: I) -> Self {
    let mut list = Self::new();
    list.extend(items);
    list
  }
}

impl<T, const N: usize> From<[T; N]> for List<T> {
  fn from(items: [T; N]) -> Self {
    items.into_iter().collect()
  }
}

impl<T: Clone, A: RawAlloc + Clone> Clone for List<T, A> {
  fn clone(&self) -> Self {
    let mut copy = Self::new_in(self.alloc.clone());
    copy.extend(self.iter().cloned());
    copy
  }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for List<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T: PartialEq, A: RawAlloc> PartialEq for List<T, A> {
  fn eq(
    &self,
    other: &Self,
  ) -> bool {
    self.len == other.len && self.iter().eq(other.iter())
  }
}

impl<T: PartialEq<U>, U, A: RawAlloc, const N: usize> PartialEq<[U; N]> for List<T, A> {
  fn eq(
    &self,
    other: &[U; N],
  ) -> bool {
    self.len == N && self.iter().eq(other.iter())
  }
}

impl<T: Eq, A: RawAlloc> Eq for List<T, A> {}

impl<T: PartialOrd, A: RawAlloc> PartialOrd for List<T, A> {
  fn partial_cmp(
    &self,
    other: &Self,
  ) -> Option<Ordering> {
    self.iter().partial_cmp(other.iter())
  }
}

impl<T: Ord, A: RawAlloc> Ord for List<T, A> {
  fn cmp(
    &self,
    other: &Self,
  ) -> Ordering {
    self.iter().cmp(other.iter())
  }
}

impl<T: Hash, A: RawAlloc> Hash for List<T, A> {
  fn hash<H: Hasher>(
    &self,
    state: &mut H,
  ) {
    self.len.hash(state);
    for element in self {
      element.hash(state);
    }
  }
}
