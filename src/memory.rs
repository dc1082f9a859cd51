//! In-memory storage engine implementing the [`Catalog`] capability
//! surface.
//!
//! Cells merge last-write-wins by timestamp, so applying the same mutation
//! twice converges to the same state, which is what lets the replayer
//! re-apply safely. The test suite and benches drive replay against this
//! engine.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::catalog::{Catalog, Mutation, TableId};
use crate::entry::Cell;
use crate::error::{Error, Result};
use crate::position::ReplayPosition;
use crate::schema::TableSchema;

/// A stored cell value: timestamp plus optional bytes (`None` = tombstone).
type StoredCell = (u64, Option<Vec<u8>>);

#[derive(Debug, Default)]
struct Partition {
  cells: HashMap<u32, StoredCell>,
}

struct TableState {
  schema: TableSchema,
  flushed: Vec<ReplayPosition>,
  truncated: Vec<ReplayPosition>,
  partitions: HashMap<Vec<u8>, Partition>,
}

/// An in-memory table catalogue with an LWW apply path.
#[derive(Default)]
pub struct MemoryCatalog {
  tables: RwLock<HashMap<TableId, TableState>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a table with its live schema.
  pub fn create_table(&self, id: TableId, schema: TableSchema) {
    self.tables.write().insert(
      id,
      TableState {
        schema,
        flushed: Vec::new(),
        truncated: Vec::new(),
        partitions: HashMap::new(),
      },
    );
  }

  /// Removes a table from the catalogue, as a DROP TABLE would.
  pub fn drop_table(&self, id: TableId) {
    self.tables.write().remove(&id);
  }

  /// Replaces a table's live schema, keeping its data. Models an ALTER
  /// between the original write and replay.
  pub fn set_schema(&self, id: TableId, schema: TableSchema) {
    if let Some(state) = self.tables.write().get_mut(&id) {
      state.schema = schema;
    }
  }

  /// Records the replay position an on-disk table file was flushed at.
  pub fn record_flush(&self, id: TableId, position: ReplayPosition) {
    if let Some(state) = self.tables.write().get_mut(&id) {
      state.flushed.push(position);
    }
  }

  /// Records an operator truncation of `id` up to `position`.
  pub fn record_truncation(&self, id: TableId, position: ReplayPosition) {
    if let Some(state) = self.tables.write().get_mut(&id) {
      state.truncated.push(position);
    }
  }

  /// Reads one cell back; outer `None` means the cell was never written.
  pub fn cell(&self, id: TableId, partition_key: &[u8], column_id: u32) -> Option<Option<Vec<u8>>> {
    let tables = self.tables.read();
    let state = tables.get(&id)?;
    let partition = state.partitions.get(partition_key)?;
    partition.cells.get(&column_id).map(|(_, value)| value.clone())
  }

  /// Number of partitions holding data for `id`.
  pub fn partition_count(&self, id: TableId) -> usize {
    self
      .tables
      .read()
      .get(&id)
      .map(|state| state.partitions.len())
      .unwrap_or(0)
  }

  /// A stable snapshot of a table's contents, for equality assertions.
  pub fn snapshot(&self, id: TableId) -> Vec<(Vec<u8>, Vec<(u32, u64, Option<Vec<u8>>)>)> {
    let tables = self.tables.read();
    let Some(state) = tables.get(&id) else {
      return Vec::new();
    };

    let mut partitions: Vec<_> = state
      .partitions
      .iter()
      .map(|(key, partition)| {
        let mut cells: Vec<_> = partition
          .cells
          .iter()
          .map(|(&column, (ts, value))| (column, *ts, value.clone()))
          .collect();
        cells.sort_by_key(|(column, _, _)| *column);
        (key.clone(), cells)
      })
      .collect();
    partitions.sort_by(|(a, _), (b, _)| a.cmp(b));
    partitions
  }
}

impl Catalog for MemoryCatalog {
  fn tables(&self) -> Vec<TableId> {
    self.tables.read().keys().copied().collect()
  }

  fn flushed_positions(&self, table: TableId) -> Vec<ReplayPosition> {
    self
      .tables
      .read()
      .get(&table)
      .map(|state| state.flushed.clone())
      .unwrap_or_default()
  }

  fn truncated_positions(&self, table: TableId) -> Vec<ReplayPosition> {
    self
      .tables
      .read()
      .get(&table)
      .map(|state| state.truncated.clone())
      .unwrap_or_default()
  }

  fn schema(&self, table: TableId) -> Option<TableSchema> {
    self.tables.read().get(&table).map(|state| state.schema.clone())
  }

  fn apply(&self, mutation: Mutation) -> Result<()> {
    let mut tables = self.tables.write();
    let state = tables
      .get_mut(&mutation.table_id)
      .ok_or(Error::NoSuchTable(mutation.table_id))?;

    for cell in &mutation.cells {
      if state.schema.mapping.column(cell.column_id).is_none() {
        return Err(Error::Apply(format!(
          "unknown column id {} for table {}",
          cell.column_id, mutation.table_id
        )));
      }
    }

    let partition = state
      .partitions
      .entry(mutation.partition_key)
      .or_default();

    for Cell { column_id, timestamp, value } in mutation.cells {
      match partition.cells.get(&column_id) {
        // Last write wins; ties keep the resident value, so re-applying
        // the same cell is a no-op.
        Some((existing_ts, _)) if *existing_ts >= timestamp => {}
        _ => {
          partition.cells.insert(column_id, (timestamp, value));
        }
      }
    }

    Ok(())
  }
}
