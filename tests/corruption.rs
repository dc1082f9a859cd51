//! Crash-interrupted and corrupted segment handling.

mod common;

use std::fs;

use common::*;
use emberlog::{Error, Stats};

#[test]
fn test_corrupt_tail_is_counted_not_fatal() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  let entries: Vec<_> = (0..3)
    .map(|n| entry_with_mapping(t, 10, format!("k{}", n).as_bytes(), n, b"x"))
    .collect();
  let (path, _) = env.write_segment(1, 0, &entries);

  // A crash-interrupted append: garbage after the last whole frame.
  let mut bytes = fs::read(&path).unwrap();
  bytes.extend_from_slice(&[0xA5; 40]);
  fs::write(&path, &bytes).unwrap();

  let stats = env.replayer(1).recover(&[path]).unwrap();

  assert_eq!(stats, Stats { applied: 3, skipped: 0, invalid: 0, corrupt_bytes: 40 });
}

#[test]
fn test_mid_segment_corruption_ends_the_segment() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  let entries: Vec<_> = (0..3)
    .map(|n| entry_with_mapping(t, 10, format!("k{}", n).as_bytes(), n, b"x"))
    .collect();
  let (path, positions) = env.write_segment(1, 0, &entries);

  // Corrupt the second frame's header. Everything from there on is
  // unreadable, valid-looking later frames included.
  let mut bytes = fs::read(&path).unwrap();
  let file_len = bytes.len() as u64;
  bytes[positions[1].offset as usize] ^= 0xFF;
  fs::write(&path, &bytes).unwrap();

  let stats = env.replayer(1).recover(&[path]).unwrap();

  assert_eq!(stats.applied, 1);
  assert_eq!(stats.corrupt_bytes, file_len - positions[1].offset as u64);
  assert_eq!(env.catalog.cell(t, b"k0", 1), Some(Some(b"x".to_vec())));
  assert_eq!(env.catalog.cell(t, b"k2", 1), None);
}

#[test]
fn test_corruption_in_one_file_does_not_stop_others() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  let (bad_path, _) = env.write_segment(1, 0, &[entry_with_mapping(t, 10, b"bad", 1, b"x")]);
  let (good_path, _) = env.write_segment(2, 0, &[entry_with_mapping(t, 10, b"good", 1, b"y")]);

  // Truncate the bad file mid-frame.
  let bytes = fs::read(&bad_path).unwrap();
  fs::write(&bad_path, &bytes[..bytes.len() - 3]).unwrap();

  let stats = env.replayer(1).recover(&[bad_path, good_path]).unwrap();

  assert_eq!(stats.applied, 1);
  assert!(stats.corrupt_bytes > 0);
  assert_eq!(env.catalog.cell(t, b"good", 1), Some(Some(b"y".to_vec())));
}

#[test]
fn test_garbage_only_file() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  let path = env.root.join("segment-1-0.log");
  fs::write(&path, [0xFF; 123]).unwrap();

  let stats = env.replayer(1).recover(&[path]).unwrap();
  assert_eq!(stats, Stats { applied: 0, skipped: 0, invalid: 0, corrupt_bytes: 123 });
}

#[test]
fn test_malformed_entry_payload_counts_invalid() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  // A well-framed payload that is not a decodable mutation, between two
  // good entries: one bad entry must not end the segment.
  let mut writer = emberlog::SegmentWriter::create(
    &env.root,
    emberlog::SegmentDescriptor::new(1, 0),
  )
  .unwrap();
  writer.append(&entry_with_mapping(t, 10, b"a", 1, b"x"), &env.opts).unwrap();
  writer.append_payload(b"not a mutation", &env.opts).unwrap();
  writer.append(&entry(t, 10, b"b", 2, b"y"), &env.opts).unwrap();
  writer.sync().unwrap();
  let path = writer.path().to_path_buf();

  let stats = env.replayer(1).recover(&[path]).unwrap();

  assert_eq!(stats, Stats { applied: 2, skipped: 0, invalid: 1, corrupt_bytes: 0 });
  assert_eq!(env.catalog.cell(t, b"b", 1), Some(Some(b"y".to_vec())));
}

#[test]
fn test_missing_segment_file_is_fatal() {
  let env = TestEnv::new();
  let t = table_id(1);
  env.catalog.create_table(t, basic_schema(10));

  let path = env.root.join("segment-7-0.log");
  let res = env.replayer(1).recover(&[path]);

  assert!(matches!(res, Err(Error::Io(_))));
}
