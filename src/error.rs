use std::alloc::{self, Layout};

use thiserror::Error;

/// Failure to obtain memory from either allocator tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The system allocator refused the request and the out-of-memory
  /// handler (if any) could not release enough memory.
  #[error("out of memory: {size} bytes (align {align}) unavailable after out-of-memory handler retries")]
  OutOfMemory { size: usize, align: usize },

  /// The requested element count does not fit in a `Layout`.
  #[error("capacity overflow")]
  CapacityOverflow,
}

impl AllocError {
  pub(crate) fn out_of_memory(layout: Layout) -> Self {
    Self::OutOfMemory {
      size: layout.size(),
      align: layout.align(),
    }
  }

  /// Diverges the way the standard collections do on allocation failure.
  pub(crate) fn handle(self) -> ! {
    match self {
      Self::OutOfMemory { size, align } => match Layout::from_size_align(size, align) {
        Ok(layout) => alloc::handle_alloc_error(layout),
        Err(_) => panic!("out of memory: {size} bytes"),
      },
      Self::CapacityOverflow => panic!("capacity overflow"),
    }
  }
}

/// Rejected `PoolConfig` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("size-class alignment {0} must be a power of two no smaller than a pointer")]
  BadAlign(usize),

  #[error("max_bytes {max_bytes} must be a non-zero multiple of the alignment {align}")]
  BadMaxBytes { max_bytes: usize, align: usize },

  #[error("refill batch must hold at least one block")]
  EmptyRefillBatch,

  #[error("refill batch {refill_batch} of {max_bytes}-byte blocks does not fit a growth request")]
  RefillTooLarge { refill_batch: usize, max_bytes: usize },

  #[error("growth shift {0} is wider than a machine word")]
  BadGrowthShift(u32),
}

/// Failure of a multi-element insertion whose elements come from a
/// fallible generator. The container is restored before this is returned.
#[derive(Debug, Error)]
pub enum InsertError<E> {
  #[error(transparent)]
  Alloc(#[from] AllocError),

  #[error("element construction failed: {0}")]
  Construction(E),
}

impl<E> InsertError<E> {
  /// The construction error, if the failure came from the generator.
  pub fn into_construction(self) -> Option<E> {
    match self {
      Self::Construction(err) => Some(err),
      Self::Alloc(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    let err = AllocError::OutOfMemory { size: 64, align: 8 };
    assert_eq!(
      err.to_string(),
      "out of memory: 64 bytes (align 8) unavailable after out-of-memory handler retries"
    );

    let err: InsertError<&str> = InsertError::Construction("boom");
    assert_eq!(err.to_string(), "element construction failed: boom");

    let err: InsertError<&str> = AllocError::CapacityOverflow.into();
    assert_eq!(err.to_string(), "capacity overflow");
    assert!(err.into_construction().is_none());
  }

  #[test]
  #[should_panic(expected = "capacity overflow")]
  fn test_capacity_overflow_panics() {
    AllocError::CapacityOverflow.handle();
  }
}
