//! Per-entry replay decisions and partition-owner routing.
//!
//! The skip checks are pure reads against the immutable [`Watermarks`];
//! the owning shard is a hash of the partition key, so the same partition
//! always lands on the same shard regardless of which shard wrote the
//! segment.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::catalog::TableId;
use crate::position::ReplayPosition;
use crate::watermark::Watermarks;

/// What to do with one decoded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Below the shard's global minimum: already durable everywhere.
  SkipGlobalMin,
  /// At or below the table's flushed high-water mark.
  SkipFlushed,
  /// Not yet durable: dispatch and apply.
  Apply,
}

/// Skip/apply decisions plus key-based shard routing.
pub struct Router {
  watermarks: Arc<Watermarks>,
  shard_count: u32,
}

impl Router {
  /// # Panics
  ///
  /// Panics if `shard_count` is zero.
  pub fn new(watermarks: Arc<Watermarks>, shard_count: u32) -> Self {
    assert!(shard_count > 0, "shard_count must be greater than zero");
    Self { watermarks, shard_count }
  }

  /// Decides whether the entry at `position` for `table` is already
  /// durable.
  ///
  /// The table check uses `<=`: a position equal to the flushed
  /// high-water mark is by definition already durable.
  pub fn disposition(&self, position: ReplayPosition, table: TableId) -> Disposition {
    if position < self.watermarks.global_min(position.shard_id) {
      return Disposition::SkipGlobalMin;
    }

    if let Some(flushed) = self.watermarks.table_max(position.shard_id, table) {
      if position <= flushed {
        return Disposition::SkipFlushed;
      }
    }

    Disposition::Apply
  }

  /// Routes a partition key to the shard that owns it.
  ///
  /// # Determinism
  ///
  /// The same key will always route to the same shard.
  #[inline]
  pub fn owning_shard(&self, partition_key: &[u8]) -> u32 {
    let mut hasher = DefaultHasher::new();
    partition_key.hash(&mut hasher);
    (hasher.finish() % self.shard_count as u64) as u32
  }

  /// Returns the total number of shards.
  pub fn shard_count(&self) -> u32 {
    self.shard_count
  }

  pub fn watermarks(&self) -> &Watermarks {
    &self.watermarks
  }
}
