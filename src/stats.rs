use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Replay counters, accumulated per shard and reduced with `+`.
///
/// Addition is component-wise and commutative, so the final aggregate is
/// independent of shard completion order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  /// Mutations applied to the storage engine.
  pub applied: u64,
  /// Entries already durable (below a watermark) and not re-applied.
  pub skipped: u64,
  /// Entries that could not be decoded or applied.
  pub invalid: u64,
  /// Unreadable trailing bytes across all segments.
  pub corrupt_bytes: u64,
}

impl AddAssign for Stats {
  fn add_assign(&mut self, other: Self) {
    self.applied += other.applied;
    self.skipped += other.skipped;
    self.invalid += other.invalid;
    self.corrupt_bytes += other.corrupt_bytes;
  }
}

impl Add for Stats {
  type Output = Self;

  fn add(mut self, other: Self) -> Self {
    self += other;
    self
  }
}

impl Sum for Stats {
  fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
    iter.fold(Self::default(), Add::add)
  }
}
