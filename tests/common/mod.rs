#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use emberlog::{
  Cell, ColumnKind, ColumnMapping, ColumnSpec, ColumnType, MemoryCatalog, MutationEntry,
  ReplayOptions, ReplayPosition, Replayer, SchemaVersion, SegmentDescriptor, SegmentWriter,
  TableId, TableSchema,
};

pub struct TestEnv {
  pub catalog: Arc<MemoryCatalog>,
  pub opts: ReplayOptions,
  // The TempDir guard must be kept alive to prevent premature deletion of the directory.
  pub _dir: TempDir,
  pub root: PathBuf,
}

impl TestEnv {
  pub fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    Self {
      catalog: Arc::new(MemoryCatalog::new()),
      opts: ReplayOptions::default(),
      _dir: dir,
      root,
    }
  }

  pub fn replayer(&self, shard_count: u32) -> Replayer {
    Replayer::create(self.catalog.clone(), self.opts.clone(), shard_count).unwrap()
  }

  /// Writes a segment file containing `entries` and returns its path plus
  /// the position of each entry.
  pub fn write_segment(
    &self,
    segment_id: u64,
    shard_id: u32,
    entries: &[MutationEntry],
  ) -> (PathBuf, Vec<ReplayPosition>) {
    let mut writer =
      SegmentWriter::create(&self.root, SegmentDescriptor::new(segment_id, shard_id)).unwrap();

    let mut positions = Vec::with_capacity(entries.len());
    for entry in entries {
      positions.push(writer.append(entry, &self.opts).unwrap());
    }
    writer.sync().unwrap();

    (writer.path().to_path_buf(), positions)
  }
}

pub fn table_id(n: u128) -> TableId {
  TableId::new(Uuid::from_u128(n))
}

pub fn version(n: u128) -> SchemaVersion {
  SchemaVersion::new(Uuid::from_u128(n))
}

/// Partition key column plus one regular text column ("v", id 1).
pub fn basic_mapping() -> ColumnMapping {
  ColumnMapping::new(vec![
    ColumnSpec { id: 0, name: "pk".into(), kind: ColumnKind::PartitionKey, ctype: ColumnType::Blob },
    ColumnSpec { id: 1, name: "v".into(), kind: ColumnKind::Regular, ctype: ColumnType::Text },
  ])
}

pub fn basic_schema(v: u128) -> TableSchema {
  TableSchema::new(version(v), basic_mapping())
}

/// One write of column "v" for `key`, without an embedded mapping.
pub fn entry(table: TableId, v: u128, key: &[u8], ts: u64, value: &[u8]) -> MutationEntry {
  MutationEntry {
    table_id: table,
    schema_version: version(v),
    partition_key: key.to_vec(),
    cells: vec![Cell { column_id: 1, timestamp: ts, value: Some(value.to_vec()) }],
    embedded_mapping: None,
  }
}

/// Same as [`entry`] but carrying the basic mapping, as a writer does
/// shortly after observing a schema change.
pub fn entry_with_mapping(table: TableId, v: u128, key: &[u8], ts: u64, value: &[u8]) -> MutationEntry {
  MutationEntry {
    embedded_mapping: Some(basic_mapping()),
    ..entry(table, v, key, ts, value)
  }
}
