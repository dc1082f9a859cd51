//! The replay orchestrator.
//!
//! `create` computes the watermarks; `recover` fans segment files out to
//! one worker thread per shard, runs each shard's files serially, and
//! reduces the per-shard statistics.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Sender};

use crate::catalog::Catalog;
use crate::config::ReplayOptions;
use crate::error::{Error, Result};
use crate::position::SegmentDescriptor;
use crate::router::Router;
use crate::shard::{ApplyTask, ShardWorker};
use crate::stats::Stats;
use crate::watermark::Watermarks;

/// Replays commit-log segments against a storage engine.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use std::sync::Arc;
/// use emberlog::{MemoryCatalog, ReplayOptions, Replayer};
///
/// # fn main() -> emberlog::Result<()> {
/// let catalog = Arc::new(MemoryCatalog::new());
/// // ... register tables and their flush positions ...
///
/// let replayer = Replayer::create(catalog, ReplayOptions::default(), 4)?;
/// let stats = replayer.recover(&[PathBuf::from("segment-1-0.log")])?;
/// println!("applied {} mutations", stats.applied);
/// # Ok(())
/// # }
/// ```
pub struct Replayer {
  catalog: Arc<dyn Catalog>,
  router: Arc<Router>,
  options: ReplayOptions,
}

impl Replayer {
  /// Builds the watermarks from the catalogue and constructs a replayer
  /// for `shard_count` shards.
  ///
  /// # Errors
  ///
  /// Returns `Error::Config` if `shard_count` is zero.
  pub fn create(catalog: Arc<dyn Catalog>, options: ReplayOptions, shard_count: u32) -> Result<Self> {
    if shard_count == 0 {
      return Err(Error::Config("shard_count must be greater than zero".into()));
    }

    let watermarks = Arc::new(Watermarks::build(catalog.as_ref()));
    let router = Arc::new(Router::new(watermarks, shard_count));

    Ok(Self { catalog, router, options })
  }

  pub fn shard_count(&self) -> u32 {
    self.router.shard_count()
  }

  /// The watermarks this replayer was built with.
  pub fn watermarks(&self) -> &Watermarks {
    self.router.watermarks()
  }

  /// Replays `files` and returns the aggregated statistics.
  ///
  /// Files are assigned to shards by their writing shard id (locality,
  /// not a correctness requirement); each shard processes its files
  /// serially, in the order supplied. Entries are applied on the shard
  /// that owns their partition key.
  ///
  /// # Errors
  ///
  /// - `Error::InvalidSegmentName` if any path is not a segment file name;
  ///   nothing is replayed.
  /// - `Error::Io` if a segment cannot be read (device failure). Tail
  ///   corruption is not an error; it is reported via
  ///   [`Stats::corrupt_bytes`].
  pub fn recover(&self, files: &[PathBuf]) -> Result<Stats> {
    if files.is_empty() {
      return Ok(Stats::default());
    }

    tracing::info!(
      target: "emberlog",
      "Replaying {}",
      files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>().join(", ")
    );

    let shard_count = self.router.shard_count() as usize;

    // Pre-compute work per shard.
    let mut assignments: Vec<Vec<PathBuf>> = vec![Vec::new(); shard_count];
    for file in files {
      let descriptor = SegmentDescriptor::parse(file)?;
      assignments[descriptor.shard_id as usize % shard_count].push(file.clone());
    }

    let mut senders = Vec::with_capacity(shard_count);
    let mut receivers = Vec::with_capacity(shard_count);
    for _ in 0..shard_count {
      let (tx, rx) = bounded::<ApplyTask>(self.options.dispatch_queue_depth);
      senders.push(tx);
      receivers.push(rx);
    }

    let catalog = self.catalog.as_ref();
    let router = self.router.as_ref();
    let options = &self.options;

    let results: Vec<Result<Stats>> = thread::scope(|scope| {
      let mut handles = Vec::with_capacity(shard_count);

      for (shard, (inbox, shard_files)) in receivers.into_iter().zip(assignments).enumerate() {
        let outboxes: Vec<Option<Sender<ApplyTask>>> = senders
          .iter()
          .enumerate()
          .map(|(peer, tx)| (peer != shard).then(|| tx.clone()))
          .collect();

        handles.push(scope.spawn(move || {
          let worker = ShardWorker::new(shard as u32, catalog, router, options, inbox, outboxes);
          worker.run(&shard_files)
        }));
      }

      // Workers hold their own clones; releasing ours lets the mailboxes
      // disconnect once every worker is done sending.
      drop(senders);

      handles
        .into_iter()
        .map(|handle| match handle.join() {
          Ok(result) => result,
          Err(panic) => std::panic::resume_unwind(panic),
        })
        .collect()
    });

    let mut total = Stats::default();
    for result in results {
      total += result?;
    }

    tracing::info!(
      target: "emberlog",
      "Log replay complete, {} replayed mutations ({} invalid, {} skipped)",
      total.applied,
      total.invalid,
      total.skipped
    );

    Ok(total)
  }

  /// Replays a single segment file.
  pub fn recover_file(&self, file: &Path) -> Result<Stats> {
    self.recover(&[file.to_path_buf()])
  }
}
