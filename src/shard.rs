//! Per-shard replay workers.
//!
//! Each shard is one OS thread. A worker streams its assigned segments
//! serially, decides skip/apply per entry, applies entries it owns inline,
//! and ships the rest to the owning shard's mailbox. Mailboxes are bounded;
//! a worker that cannot send drains its own inbox while it retries, so the
//! fleet cannot deadlock and replay memory stays bounded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, TrySendError};

use crate::catalog::{Catalog, Mutation, TableId};
use crate::config::ReplayOptions;
use crate::entry::{Cell, MutationEntry};
use crate::error::{Error, Result};
use crate::position::{ReplayPosition, SegmentDescriptor};
use crate::router::{Disposition, Router};
use crate::schema::{self, ColumnMapping, SchemaCache, SchemaVersion};
use crate::segment::SegmentReader;
use crate::stats::Stats;

/// A decoded entry en route to the shard that owns its partition, together
/// with the column mapping it was written under.
pub(crate) struct ApplyTask {
  pub table_id: TableId,
  pub schema_version: SchemaVersion,
  pub partition_key: Vec<u8>,
  pub cells: Vec<Cell>,
  pub mapping: Arc<ColumnMapping>,
  pub position: ReplayPosition,
}

pub(crate) struct ShardWorker<'a> {
  shard: u32,
  catalog: &'a dyn Catalog,
  router: &'a Router,
  options: &'a ReplayOptions,
  cache: SchemaCache,
  stats: Stats,
  inbox: Receiver<ApplyTask>,
  /// One sender per peer shard; `None` at our own index.
  outboxes: Vec<Option<Sender<ApplyTask>>>,
}

impl<'a> ShardWorker<'a> {
  pub fn new(
    shard: u32,
    catalog: &'a dyn Catalog,
    router: &'a Router,
    options: &'a ReplayOptions,
    inbox: Receiver<ApplyTask>,
    outboxes: Vec<Option<Sender<ApplyTask>>>,
  ) -> Self {
    Self {
      shard,
      catalog,
      router,
      options,
      cache: SchemaCache::new(),
      stats: Stats::default(),
      inbox,
      outboxes,
    }
  }

  /// Replays this shard's files, then drains inbound applies until every
  /// peer has released its senders.
  ///
  /// The drain runs even when a segment failed fatally: peers may be
  /// blocked on our mailbox, and they must observe the disconnect.
  pub fn run(mut self, files: &[PathBuf]) -> Result<Stats> {
    let result = self.replay_files(files);

    self.outboxes.clear();
    while let Ok(task) = self.inbox.recv() {
      self.apply(task);
    }

    result.map(|()| self.stats)
  }

  fn replay_files(&mut self, files: &[PathBuf]) -> Result<()> {
    for file in files {
      self.replay_segment(file)?;
    }
    Ok(())
  }

  fn replay_segment(&mut self, path: &Path) -> Result<()> {
    let descriptor = SegmentDescriptor::parse(path)?;
    let position = ReplayPosition::from(descriptor);
    let global_min = self.router.watermarks().global_min(position.shard_id);

    // Whole segments below the global minimum need not even be opened.
    if position.segment_id < global_min.segment_id {
      tracing::debug!(target: "emberlog::shard", "skipping replay of fully-flushed {}", path.display());
      return Ok(());
    }
    // The durable prefix of the boundary segment is seeked over; entries
    // after the seek point still go through the per-entry checks.
    let start_offset = if position.segment_id == global_min.segment_id {
      global_min.offset
    } else {
      0
    };

    tracing::debug!(target: "emberlog::shard", "Replaying {}", path.display());
    let before = self.stats;

    let mut reader = SegmentReader::open(path, self.options, start_offset)?;
    while let Some((buf, position)) = reader.next_entry()? {
      self.process(&buf, position);
      self.drain_inbox();
    }

    let corrupt = reader.corrupt_bytes();
    self.stats.corrupt_bytes += corrupt;
    if corrupt != 0 {
      tracing::warn!(
        target: "emberlog::shard",
        "Corrupted file: {}. {} bytes skipped.",
        path.display(),
        corrupt
      );
    }

    tracing::debug!(
      target: "emberlog::shard",
      "Log replay of {} complete, {} replayed mutations ({} invalid, {} skipped)",
      path.display(),
      self.stats.applied - before.applied,
      self.stats.invalid - before.invalid,
      self.stats.skipped - before.skipped
    );

    Ok(())
  }

  fn process(&mut self, buf: &[u8], position: ReplayPosition) {
    let entry = match MutationEntry::decode(buf) {
      Ok(entry) => entry,
      Err(e) => {
        self.stats.invalid += 1;
        tracing::warn!(target: "emberlog::shard", "error replaying at {}: {}", position, e);
        return;
      }
    };

    match self.router.disposition(position, entry.table_id) {
      Disposition::SkipGlobalMin => {
        tracing::trace!(target: "emberlog::shard", "entry {} is less than global min position. skipping", position);
        self.stats.skipped += 1;
        return;
      }
      Disposition::SkipFlushed => {
        tracing::trace!(
          target: "emberlog::shard",
          "entry {} at {} is older than its table's replay position. skipping",
          entry.table_id,
          position
        );
        self.stats.skipped += 1;
        return;
      }
      Disposition::Apply => {}
    }

    let mapping = match self.cache.resolve(entry.schema_version, entry.embedded_mapping) {
      Ok(mapping) => mapping,
      Err(e) => {
        self.stats.invalid += 1;
        tracing::warn!(target: "emberlog::shard", "error replaying at {}: {}", position, e);
        return;
      }
    };

    let task = ApplyTask {
      table_id: entry.table_id,
      schema_version: entry.schema_version,
      partition_key: entry.partition_key,
      cells: entry.cells,
      mapping,
      position,
    };

    let dest = self.router.owning_shard(&task.partition_key);
    if dest == self.shard {
      self.apply(task);
    } else {
      self.dispatch(dest, task);
    }
  }

  fn dispatch(&mut self, dest: u32, mut task: ApplyTask) {
    loop {
      let Some(sender) = &self.outboxes[dest as usize] else {
        // Own slot: cannot happen, dispatch is only called for dest != self.
        self.apply(task);
        return;
      };

      match sender.try_send(task) {
        Ok(()) => return,
        Err(TrySendError::Full(returned)) => {
          task = returned;
          // Keep our own mailbox moving while the peer catches up.
          self.drain_inbox();
          std::thread::yield_now();
        }
        Err(TrySendError::Disconnected(returned)) => {
          // A peer's mailbox only disconnects after every sender is gone,
          // and we still hold one. Never expected; drop the entry loudly
          // rather than apply it on the wrong shard.
          self.stats.invalid += 1;
          tracing::error!(
            target: "emberlog::shard",
            "shard {} mailbox disconnected, dropping entry at {}",
            dest,
            returned.position
          );
          return;
        }
      }
    }
  }

  fn drain_inbox(&mut self) {
    while let Ok(task) = self.inbox.try_recv() {
      self.apply(task);
    }
  }

  /// Applies one entry on this (partition-owning) shard.
  fn apply(&mut self, task: ApplyTask) {
    let live = match self.catalog.schema(task.table_id) {
      Some(schema) => schema,
      None => {
        // Table dropped since the write; historical behavior is to
        // ignore these without counting them.
        tracing::trace!(
          target: "emberlog::shard",
          "table {} no longer exists, dropping entry at {}",
          task.table_id,
          task.position
        );
        return;
      }
    };

    let cells = if live.version == task.schema_version {
      task.cells
    } else {
      tracing::debug!(
        target: "emberlog::shard",
        "translating entry at {} from schema {} to {}",
        task.position,
        task.schema_version,
        live.version
      );
      match schema::translate(&task.mapping, &live.mapping, &task.cells) {
        Ok(cells) => cells,
        Err(e) => {
          self.stats.invalid += 1;
          tracing::warn!(target: "emberlog::shard", "error replaying at {}: {}", task.position, e);
          return;
        }
      }
    };

    let mutation = Mutation {
      table_id: task.table_id,
      partition_key: task.partition_key,
      cells,
    };

    match self.catalog.apply(mutation) {
      Ok(()) => self.stats.applied += 1,
      Err(Error::NoSuchTable(table)) => {
        tracing::trace!(
          target: "emberlog::shard",
          "table {} no longer exists, dropping entry at {}",
          table,
          task.position
        );
      }
      Err(e) => {
        self.stats.invalid += 1;
        tracing::warn!(target: "emberlog::shard", "error replaying at {}: {}", task.position, e);
      }
    }
  }
}
