/// Rounds `$value` up to the next multiple of `$align`, which must be a
/// power of two.
///
/// ```rust
/// use rstl::align_to;
///
/// assert_eq!(align_to!(1, 8), 8);
/// assert_eq!(align_to!(8, 8), 8);
/// assert_eq!(align_to!(121, 8), 128);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Index of the size-class bucket serving `bytes`, for buckets spaced
/// `align` bytes apart. `bytes` must be non-zero.
#[inline]
pub(crate) const fn bucket_index(
  bytes: usize,
  align: usize,
) -> usize {
  (bytes + align - 1) / align - 1
}

#[cfg(test)]
mod tests {
  use super::bucket_index;

  #[test]
  fn test_align_to_size_classes() {
    for size in 1..=128usize {
      let rounded = align_to!(size, 8);
      assert_eq!(rounded % 8, 0);
      assert!(rounded >= size && rounded - size < 8);
    }
    assert_eq!(align_to!(0, 16), 0);
    assert_eq!(align_to!(17, 16), 32);
  }

  #[test]
  fn test_bucket_index() {
    assert_eq!(bucket_index(1, 8), 0);
    assert_eq!(bucket_index(8, 8), 0);
    assert_eq!(bucket_index(9, 8), 1);
    assert_eq!(bucket_index(128, 8), 15);
    assert_eq!(bucket_index(64, 16), 3);
  }
}
