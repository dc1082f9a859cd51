/// Defines the strategy used for reading segment files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
  /// Uses standard `File::seek` and `File::read`.
  /// Safe, reliable, and respectful of memory limits.
  StandardIo,

  /// Memory-maps the segment files.
  /// Fastest for raw/uncompressed reads.
  /// WARNING: Counts against open file limits and carries SIGBUS risks.
  Mmap,
}

/// Defines the compression algorithm used for frame payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
  /// No compression. Raw binary copy.
  None,

  /// Uses the LZ4 Frame format.
  /// Good balance of speed and ratio.
  #[cfg(feature = "compression")]
  Lz4,
}

/// Tuning knobs for the replay pipeline.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
  /// Size of the buffer used for reading/scanning segment files.
  /// Default: 128 KB.
  pub read_buffer_size: usize,

  /// How segment files are read from disk.
  /// Default: `StandardIo`.
  pub read_strategy: ReadStrategy,

  /// Bound on each shard's cross-shard apply mailbox. A source shard
  /// that fills a destination mailbox drains its own inbox while it
  /// retries, so replay memory stays proportional to
  /// `shard_count * dispatch_queue_depth`.
  /// Default: 128.
  pub dispatch_queue_depth: usize,

  /// Compression applied by the segment writer.
  /// Default: `None`.
  pub compression: CompressionType,

  /// If an entry is smaller than this (in bytes), it is written
  /// uncompressed even if `compression` is enabled.
  /// Default: 1 KB.
  pub min_compression_size: usize,
}

impl Default for ReplayOptions {
  fn default() -> Self {
    Self {
      read_buffer_size: 128 * 1024, // 128 KB
      read_strategy: ReadStrategy::StandardIo,
      dispatch_queue_depth: 128,
      compression: CompressionType::None,
      min_compression_size: 1024, // 1 KB
    }
  }
}
