use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// A location within one shard's write-ahead log.
///
/// Ordering is lexicographic on `(segment_id, offset)`. The `shard_id` is
/// carried out-of-band from the segment filename: it partitions the
/// namespace, so positions are only meaningfully compared within the same
/// shard. The default value is the empty position, which sorts below every
/// position a writer can produce (segment ids are allocated from 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplayPosition {
  /// Identifier of the segment file, monotone per shard.
  pub segment_id: u64,
  /// Byte offset of the entry's frame within the segment.
  pub offset: u32,
  /// The shard that wrote the segment.
  pub shard_id: u32,
}

impl ReplayPosition {
  pub fn new(segment_id: u64, offset: u32, shard_id: u32) -> Self {
    Self { segment_id, offset, shard_id }
  }

  /// The empty position for a shard: below everything the shard ever wrote.
  pub fn empty(shard_id: u32) -> Self {
    Self { segment_id: 0, offset: 0, shard_id }
  }
}

impl fmt::Display for ReplayPosition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}@{}", self.shard_id, self.segment_id, self.offset)
  }
}

impl From<SegmentDescriptor> for ReplayPosition {
  fn from(d: SegmentDescriptor) -> Self {
    Self { segment_id: d.segment_id, offset: 0, shard_id: d.shard_id }
  }
}

/// The identity of a segment file, parsed from its name.
///
/// `parse` and `filename` form a bijection; the filename syntax is the WAL
/// writer's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentDescriptor {
  pub segment_id: u64,
  pub shard_id: u32,
}

impl SegmentDescriptor {
  pub fn new(segment_id: u64, shard_id: u32) -> Self {
    Self { segment_id, shard_id }
  }

  /// Parses a descriptor from a segment path.
  /// Format: `segment-<segment_id>-<shard_id>.log`
  pub fn parse(path: &Path) -> Result<Self> {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| Error::InvalidSegmentName(path.display().to_string()))?;

    Self::parse_name(name).ok_or_else(|| Error::InvalidSegmentName(name.to_string()))
  }

  fn parse_name(name: &str) -> Option<Self> {
    let rest = name.strip_prefix("segment-")?.strip_suffix(".log")?;
    let (id, shard) = rest.split_once('-')?;
    Some(Self {
      segment_id: id.parse::<u64>().ok()?,
      shard_id: shard.parse::<u32>().ok()?,
    })
  }

  /// Generates the segment filename for this descriptor.
  pub fn filename(&self) -> String {
    format!("segment-{}-{}.log", self.segment_id, self.shard_id)
  }
}
