//! Replaying entries written under older schema versions.

mod common;

use common::*;
use emberlog::{Cell, ColumnKind, ColumnMapping, ColumnSpec, ColumnType, MutationEntry, Stats, TableSchema};

/// The basic schema plus one added nullable text column, under new ids.
fn evolved_schema(v: u128) -> TableSchema {
  TableSchema::new(
    version(v),
    ColumnMapping::new(vec![
      ColumnSpec { id: 10, name: "pk".into(), kind: ColumnKind::PartitionKey, ctype: ColumnType::Blob },
      ColumnSpec { id: 11, name: "v".into(), kind: ColumnKind::Regular, ctype: ColumnType::Text },
      ColumnSpec { id: 12, name: "note".into(), kind: ColumnKind::Regular, ctype: ColumnType::Text },
    ]),
  )
}

#[test]
fn test_old_entry_translated_onto_live_schema() {
  let env = TestEnv::new();
  let t = table_id(1);
  // Live schema is V2; the entry was written under V1 and carries its
  // mapping.
  env.catalog.create_table(t, evolved_schema(20));

  let (path, _) = env.write_segment(1, 0, &[entry_with_mapping(t, 10, b"k", 5, b"old-data")]);

  let stats = env.replayer(1).recover(&[path]).unwrap();

  assert_eq!(stats, Stats { applied: 1, skipped: 0, invalid: 0, corrupt_bytes: 0 });
  // The "v" cell landed under its new column id.
  assert_eq!(env.catalog.cell(t, b"k", 11), Some(Some(b"old-data".to_vec())));
  // The added column has no value: never written.
  assert_eq!(env.catalog.cell(t, b"k", 12), None);
}

#[test]
fn test_unknown_version_without_mapping_is_invalid() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  // First entry's version was never seen and it carries no mapping; the
  // second is fine. Replay must continue past the first.
  let entries = vec![
    entry(t, 77, b"k1", 1, b"unreadable"),
    entry_with_mapping(t, 10, b"k2", 2, b"fine"),
  ];
  let (path, _) = env.write_segment(1, 0, &entries);

  let stats = env.replayer(1).recover(&[path]).unwrap();

  assert_eq!(stats, Stats { applied: 1, skipped: 0, invalid: 1, corrupt_bytes: 0 });
  assert_eq!(env.catalog.cell(t, b"k1", 1), None);
  assert_eq!(env.catalog.cell(t, b"k2", 1), Some(Some(b"fine".to_vec())));
}

#[test]
fn test_mapping_learned_from_earlier_entry() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  // Only the first entry embeds the mapping; later entries of the same
  // version rely on the shard's cache.
  let entries = vec![
    entry_with_mapping(t, 10, b"k1", 1, b"a"),
    entry(t, 10, b"k2", 2, b"b"),
    entry(t, 10, b"k3", 3, b"c"),
  ];
  let (path, _) = env.write_segment(1, 0, &entries);

  let stats = env.replayer(1).recover(&[path]).unwrap();
  assert_eq!(stats, Stats { applied: 3, skipped: 0, invalid: 0, corrupt_bytes: 0 });
}

#[test]
fn test_schema_cache_is_shard_local() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  // Shard 0's segment teaches version 10; shard 1's segment uses it
  // without embedding. Caches are per shard, so shard 1 cannot decode.
  let (path0, _) = env.write_segment(1, 0, &[entry_with_mapping(t, 10, b"k1", 1, b"a")]);
  let (path1, _) = env.write_segment(1, 1, &[entry(t, 10, b"k2", 2, b"b")]);

  let stats = env.replayer(2).recover(&[path0, path1]).unwrap();

  assert_eq!(stats.applied, 1);
  assert_eq!(stats.invalid, 1);
}

#[test]
fn test_same_version_applies_without_translation() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  let (path, _) = env.write_segment(1, 0, &[entry_with_mapping(t, 10, b"k", 1, b"same")]);

  let stats = env.replayer(1).recover(&[path]).unwrap();
  assert_eq!(stats.applied, 1);
  assert_eq!(env.catalog.cell(t, b"k", 1), Some(Some(b"same".to_vec())));
}

#[test]
fn test_dropped_column_cells_are_discarded() {
  let env = TestEnv::new();
  let t = table_id(1);
  // Live schema kept only the partition key; "v" was dropped.
  env.catalog.create_table(
    t,
    TableSchema::new(
      version(30),
      ColumnMapping::new(vec![ColumnSpec {
        id: 0,
        name: "pk".into(),
        kind: ColumnKind::PartitionKey,
        ctype: ColumnType::Blob,
      }]),
    ),
  );

  let (path, _) = env.write_segment(1, 0, &[entry_with_mapping(t, 10, b"k", 1, b"gone")]);

  let stats = env.replayer(1).recover(&[path]).unwrap();

  // The mutation still applies (empty after translation), the dropped
  // column's cell does not resurface.
  assert_eq!(stats.applied, 1);
  assert_eq!(env.catalog.cell(t, b"k", 1), None);
}

#[test]
fn test_incompatible_type_change_counts_invalid() {
  let env = TestEnv::new();
  let t = table_id(1);
  // "v" changed Text -> Int: not a supported widening.
  env.catalog.create_table(
    t,
    TableSchema::new(
      version(40),
      ColumnMapping::new(vec![
        ColumnSpec { id: 0, name: "pk".into(), kind: ColumnKind::PartitionKey, ctype: ColumnType::Blob },
        ColumnSpec { id: 1, name: "v".into(), kind: ColumnKind::Regular, ctype: ColumnType::Int },
      ]),
    ),
  );

  let (path, _) = env.write_segment(1, 0, &[entry_with_mapping(t, 10, b"k", 1, b"text")]);

  let stats = env.replayer(1).recover(&[path]).unwrap();
  assert_eq!(stats.applied, 0);
  assert_eq!(stats.invalid, 1);
}

#[test]
fn test_tombstone_survives_translation() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, evolved_schema(20));

  let deletion = MutationEntry {
    table_id: t,
    schema_version: version(10),
    partition_key: b"k".to_vec(),
    cells: vec![Cell { column_id: 1, timestamp: 9, value: None }],
    embedded_mapping: Some(basic_mapping()),
  };
  let (path, _) = env.write_segment(1, 0, &[deletion]);

  let stats = env.replayer(1).recover(&[path]).unwrap();

  assert_eq!(stats.applied, 1);
  assert_eq!(env.catalog.cell(t, b"k", 11), Some(None));
}
