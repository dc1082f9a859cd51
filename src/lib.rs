//! # EmberLog
//!
//! `emberlog` is the commit-log replay core of a sharded, log-structured
//! database. On process start, before serving traffic, it scans the
//! write-ahead log segments recovered from disk and re-applies every
//! mutation not already durable in the on-disk table files.
//!
//! ## Key Properties
//!
//! * **Watermark-driven skipping**: per `(shard, table)` flush positions
//!   and truncation records decide what is already durable.
//! * **Corruption containment**: a torn or corrupt segment tail ends that
//!   segment's replay and is accounted, never fatal.
//! * **Schema evolution**: entries written under an older schema version
//!   are translated through their embedded column mapping onto the live
//!   schema.
//! * **Shard-parallel, partition-correct**: one worker thread per shard;
//!   every mutation is applied on the shard that owns its partition key,
//!   even after resharding.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use emberlog::{MemoryCatalog, ReplayOptions, Replayer};
//!
//! # fn main() -> emberlog::Result<()> {
//! let catalog = Arc::new(MemoryCatalog::new());
//! let replayer = Replayer::create(catalog, ReplayOptions::default(), 8)?;
//!
//! let files = vec![
//!     PathBuf::from("commitlog/segment-11-0.log"),
//!     PathBuf::from("commitlog/segment-12-1.log"),
//! ];
//! let stats = replayer.recover(&files)?;
//! println!(
//!     "applied {}, skipped {}, invalid {}, corrupt bytes {}",
//!     stats.applied, stats.skipped, stats.invalid, stats.corrupt_bytes
//! );
//! # Ok(())
//! # }
//! ```

mod catalog;
mod config;
mod entry;
mod error;
mod frame;
mod memory;
mod position;
mod replayer;
mod router;
mod schema;
mod segment;
mod shard;
mod stats;
mod watermark;

// Re-exports for the flat public API
pub use catalog::{Catalog, Mutation, TableId};
pub use config::{CompressionType, ReadStrategy, ReplayOptions};
pub use entry::{Cell, MutationEntry};
pub use error::{Error, Result};
pub use memory::MemoryCatalog;
pub use position::{ReplayPosition, SegmentDescriptor};
pub use replayer::Replayer;
pub use router::{Disposition, Router};
pub use schema::{
  ColumnKind, ColumnMapping, ColumnSpec, ColumnType, SchemaCache, SchemaVersion, TableSchema,
};
pub use segment::{SegmentReader, SegmentWriter};
pub use stats::Stats;
pub use watermark::Watermarks;
