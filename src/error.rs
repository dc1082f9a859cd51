use std::io;
use thiserror::Error;

use crate::catalog::TableId;
use crate::schema::SchemaVersion;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O Error: {0}")]
  Io(#[from] io::Error),

  #[error("Data Corruption: {0}")]
  Corruption(String),

  #[error("CRC32 Checksum Mismatch: expected {expected:#x}, got {actual:#x} at offset {offset}")]
  CrcMismatch { expected: u32, actual: u32, offset: u64 },

  #[error("Invalid segment file name: {0}")]
  InvalidSegmentName(String),

  #[error("Malformed mutation payload: {0}")]
  MalformedPayload(String),

  #[error("Unknown schema version {0} and no embedded column mapping")]
  UnknownSchemaVersion(SchemaVersion),

  #[error("No such table: {0}")]
  NoSuchTable(TableId),

  #[error("Apply rejected by storage engine: {0}")]
  Apply(String),

  #[error("Configuration Error: {0}")]
  Config(String),
}
