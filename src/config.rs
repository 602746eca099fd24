use std::mem;

use crate::align_to;
use crate::error::ConfigError;

/// Size-class alignment and bucket spacing.
pub const ALIGN: usize = 8;

/// Largest request served from the free lists; anything bigger goes to
/// the malloc tier.
pub const MAX_BYTES: usize = 128;

/// Number of free lists with the default configuration.
pub const NFREELISTS: usize = MAX_BYTES / ALIGN;

/// Blocks requested from the pool region per refill.
pub const REFILL_BATCH: usize = 20;

/// `pool_total_acquired >> GROWTH_SHIFT` is added to every growth request.
pub const GROWTH_SHIFT: u32 = 4;

/// Tuning for `PoolAlloc`. All fields have the classic defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
  /// Bucket spacing and block alignment. Must be a power of two and at
  /// least pointer sized so a free block can hold its link.
  pub align: usize,

  /// Largest request served from the buckets. Multiple of `align`.
  pub max_bytes: usize,

  /// Blocks carved per refill. Default: 20.
  pub refill_batch: usize,

  /// Growth requests are `2 * wanted + (acquired >> growth_shift)`.
  /// Default: 4.
  pub growth_shift: u32,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      align: ALIGN,
      max_bytes: MAX_BYTES,
      refill_batch: REFILL_BATCH,
      growth_shift: GROWTH_SHIFT,
    }
  }
}

impl PoolConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !self.align.is_power_of_two() || self.align < mem::size_of::<*mut u8>() {
      return Err(ConfigError::BadAlign(self.align));
    }
    if self.max_bytes == 0 || self.max_bytes % self.align != 0 {
      return Err(ConfigError::BadMaxBytes {
        max_bytes: self.max_bytes,
        align: self.align,
      });
    }
    if self.refill_batch == 0 {
      return Err(ConfigError::EmptyRefillBatch);
    }
    // A growth request asks for twice a full batch of the largest class.
    let batch_bytes = self.refill_batch.checked_mul(self.max_bytes).and_then(|bytes| bytes.checked_mul(2));
    if !batch_bytes.is_some_and(|bytes| bytes <= isize::MAX as usize) {
      return Err(ConfigError::RefillTooLarge {
        refill_batch: self.refill_batch,
        max_bytes: self.max_bytes,
      });
    }
    if self.growth_shift >= usize::BITS {
      return Err(ConfigError::BadGrowthShift(self.growth_shift));
    }
    Ok(())
  }

  /// Number of size-class buckets.
  #[must_use]
  pub fn bucket_count(&self) -> usize {
    self.max_bytes / self.align
  }

  /// Bytes of a growth request that wants `wanted` bytes after
  /// `acquired` bytes were already taken from the system.
  #[must_use]
  pub(crate) fn growth_request(
    &self,
    wanted: usize,
    acquired: usize,
  ) -> usize {
    let extra = align_to!(acquired >> self.growth_shift, self.align);
    wanted.saturating_mul(2).saturating_add(extra)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = PoolConfig::default();
    assert_eq!(config.validate(), Ok(()));
    assert_eq!(config.bucket_count(), NFREELISTS);
    assert_eq!(NFREELISTS, 16);
  }

  #[test]
  fn test_rejects_bad_values() {
    let mut config = PoolConfig::default();
    config.align = 12;
    assert_eq!(config.validate(), Err(ConfigError::BadAlign(12)));

    config.align = 2;
    assert_eq!(config.validate(), Err(ConfigError::BadAlign(2)));

    let mut config = PoolConfig::default();
    config.max_bytes = 100;
    assert!(matches!(config.validate(), Err(ConfigError::BadMaxBytes { .. })));

    let mut config = PoolConfig::default();
    config.refill_batch = 0;
    assert_eq!(config.validate(), Err(ConfigError::EmptyRefillBatch));

    let mut config = PoolConfig::default();
    config.refill_batch = usize::MAX / 4;
    assert_eq!(
      config.validate(),
      Err(ConfigError::RefillTooLarge {
        refill_batch: usize::MAX / 4,
        max_bytes: MAX_BYTES,
      })
    );
    config.refill_batch = isize::MAX as usize / (2 * MAX_BYTES);
    assert_eq!(config.validate(), Ok(()));

    let mut config = PoolConfig::default();
    config.growth_shift = 64;
    assert_eq!(config.validate(), Err(ConfigError::BadGrowthShift(64)));
  }

  #[test]
  fn test_growth_is_superlinear_in_acquired_bytes() {
    let config = PoolConfig::default();
    assert_eq!(config.growth_request(160, 0), 320);
    // 1000 >> 4 = 62, rounded to 64.
    assert_eq!(config.growth_request(160, 1000), 384);

    let small = config.growth_request(160, 1 << 10);
    let large = config.growth_request(160, 1 << 20);
    assert!(large > small);
  }
}
