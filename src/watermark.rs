//! Durable-position watermarks, computed once before replay.
//!
//! For every `(shard, table)` the watermark is the highest replay position
//! already durable on disk: the max over the flush positions recorded in
//! the table's on-disk files, folded with the positions of any operator
//! truncations. Entries at or below it are skipped. The per-shard global
//! minimum lets whole segments (or segment prefixes) be skipped without
//! decoding.

use std::collections::HashMap;

use crate::catalog::{Catalog, TableId};
use crate::position::ReplayPosition;

/// Immutable watermark maps, shared read-only across all shards.
///
/// Keys are raw shard ids as recorded on disk: after resharding these may
/// exceed the current shard count, which only affects where segments are
/// processed, not how watermarks are looked up.
#[derive(Debug, Default)]
pub struct Watermarks {
  table_max: HashMap<u32, HashMap<TableId, ReplayPosition>>,
  global_min: HashMap<u32, ReplayPosition>,
}

impl Watermarks {
  /// Builds watermarks from the live catalogue.
  pub fn build(catalog: &dyn Catalog) -> Self {
    let tables = catalog.tables();

    let mut table_max: HashMap<u32, HashMap<TableId, ReplayPosition>> = HashMap::new();
    for &table in &tables {
      let flushed = catalog.flushed_positions(table);
      let truncated = catalog.truncated_positions(table);

      for position in flushed.into_iter().chain(truncated) {
        tracing::trace!(target: "emberlog", "table {} durable at {}", table, position);
        let slot = table_max
          .entry(position.shard_id)
          .or_default()
          .entry(table)
          .or_default();
        *slot = (*slot).max(position);
      }
    }

    let mut global_min: HashMap<u32, ReplayPosition> = HashMap::new();
    for (&shard, per_table) in &table_max {
      if let Some(&min) = per_table.values().min() {
        global_min.insert(shard, min);
      }
    }

    // A table known to the catalogue but with no durable position on some
    // shard means nothing of it is flushed there: the shard's global
    // minimum must drop to the empty position, or its entries would be
    // skipped as durable. Per-table maxima are unaffected (a missing
    // entry already reads as the empty position).
    for &table in &tables {
      for (&shard, per_table) in &table_max {
        if !per_table.contains_key(&table) {
          global_min.insert(shard, ReplayPosition::empty(shard));
        }
      }
    }

    for (shard, position) in &global_min {
      tracing::debug!(target: "emberlog", "minimum position for shard {}: {}", shard, position);
    }
    for (shard, per_table) in &table_max {
      for (table, position) in per_table {
        tracing::debug!(target: "emberlog", "replay position for shard/table {}/{}: {}", shard, table, position);
      }
    }

    Self { table_max, global_min }
  }

  /// The highest position already durable for `(shard, table)`, if any
  /// file or truncation record exists.
  pub fn table_max(&self, shard: u32, table: TableId) -> Option<ReplayPosition> {
    self.table_max.get(&shard).and_then(|m| m.get(&table)).copied()
  }

  /// The per-shard global minimum. A shard with no durable state at all
  /// reads as the empty position: everything must be replayed.
  pub fn global_min(&self, shard: u32) -> ReplayPosition {
    self
      .global_min
      .get(&shard)
      .copied()
      .unwrap_or_else(|| ReplayPosition::empty(shard))
  }
}
