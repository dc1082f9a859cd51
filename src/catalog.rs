//! Capability interfaces the replay core consumes.
//!
//! The core never talks to a concrete storage engine. It depends on the
//! narrow [`Catalog`] trait: enough surface to build watermarks (table
//! files' flush positions, truncation records), look up live schemas, and
//! ship mutations into the engine's apply path.

use std::fmt;

use uuid::Uuid;

use crate::entry::Cell;
use crate::error::Result;
use crate::position::ReplayPosition;
use crate::schema::TableSchema;

/// Opaque 128-bit table identifier. Equality and hash only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(Uuid);

impl TableId {
  pub fn new(id: Uuid) -> Self {
    Self(id)
  }

  pub fn from_bytes(bytes: [u8; 16]) -> Self {
    Self(Uuid::from_bytes(bytes))
  }

  pub fn into_bytes(self) -> [u8; 16] {
    self.0.into_bytes()
  }
}

impl fmt::Display for TableId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// One write against one partition of one table, expressed in the table's
/// live column ids. This is what the storage engine's apply path receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
  pub table_id: TableId,
  pub partition_key: Vec<u8>,
  pub cells: Vec<Cell>,
}

/// The storage engine surface the replayer depends on.
///
/// `apply` must be idempotent under cell timestamps (last-write-wins), not
/// under bytes: replaying the same mutation twice must converge to the same
/// state.
pub trait Catalog: Send + Sync {
  /// Every table the live catalogue knows.
  fn tables(&self) -> Vec<TableId>;

  /// The replay position recorded in each on-disk table file's metadata
  /// for `table`. Each position carries the shard that flushed it.
  fn flushed_positions(&self, table: TableId) -> Vec<ReplayPosition>;

  /// Positions at which the operator truncated `table`, one per
  /// truncation record.
  fn truncated_positions(&self, table: TableId) -> Vec<ReplayPosition>;

  /// The live schema of `table`, or `None` if the table was dropped.
  fn schema(&self, table: TableId) -> Option<TableSchema>;

  /// Applies one mutation. Runs on the shard that owns the mutation's
  /// partition.
  fn apply(&self, mutation: Mutation) -> Result<()>;
}
