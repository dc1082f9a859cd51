//! Schema snapshots and the per-shard schema version cache.
//!
//! A mutation is encoded under the column mapping that was live when it was
//! written. Replay may happen under a newer schema, so the reader keeps a
//! memo of `schema version -> column mapping`, learned lazily from entries
//! that embed their mapping, and uses it to re-bind old payloads onto the
//! current schema.

use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::entry::Cell;
use crate::error::{Error, Result};

/// Opaque identifier of a table schema snapshot (a hash of the schema).
/// Equality only; versions have no order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaVersion(Uuid);

impl SchemaVersion {
  pub fn new(id: Uuid) -> Self {
    Self(id)
  }

  pub fn from_bytes(bytes: [u8; 16]) -> Self {
    Self(Uuid::from_bytes(bytes))
  }

  pub fn into_bytes(self) -> [u8; 16] {
    self.0.into_bytes()
  }
}

impl fmt::Display for SchemaVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// The role a column plays in the table's primary key structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnKind {
  PartitionKey = 0x00,
  Clustering = 0x01,
  Regular = 0x02,
  Static = 0x03,
}

impl TryFrom<u8> for ColumnKind {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0x00 => Ok(ColumnKind::PartitionKey),
      0x01 => Ok(ColumnKind::Clustering),
      0x02 => Ok(ColumnKind::Regular),
      0x03 => Ok(ColumnKind::Static),
      _ => Err(Error::MalformedPayload(format!("Unknown column kind: {}", v))),
    }
  }
}

/// Storage type of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
  Blob = 0x00,
  Text = 0x01,
  Int = 0x02,
  Bigint = 0x03,
  Uuid = 0x04,
  Timestamp = 0x05,
  Boolean = 0x06,
  Double = 0x07,
}

impl TryFrom<u8> for ColumnType {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0x00 => Ok(ColumnType::Blob),
      0x01 => Ok(ColumnType::Text),
      0x02 => Ok(ColumnType::Int),
      0x03 => Ok(ColumnType::Bigint),
      0x04 => Ok(ColumnType::Uuid),
      0x05 => Ok(ColumnType::Timestamp),
      0x06 => Ok(ColumnType::Boolean),
      0x07 => Ok(ColumnType::Double),
      _ => Err(Error::MalformedPayload(format!("Unknown column type: {}", v))),
    }
  }
}

impl ColumnType {
  /// Whether a value written as `self` can be read back as `target`.
  /// Identity always holds; the only widening the engine supports is
  /// `Int -> Bigint`.
  fn widens_to(self, target: ColumnType) -> bool {
    self == target || (self == ColumnType::Int && target == ColumnType::Bigint)
  }
}

/// One column of a schema snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
  pub id: u32,
  pub name: String,
  pub kind: ColumnKind,
  pub ctype: ColumnType,
}

/// An immutable snapshot of a table's columns, sufficient to decode a
/// mutation written under the matching schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
  columns: Vec<ColumnSpec>,
}

impl ColumnMapping {
  pub fn new(columns: Vec<ColumnSpec>) -> Self {
    Self { columns }
  }

  pub fn columns(&self) -> &[ColumnSpec] {
    &self.columns
  }

  pub fn column(&self, id: u32) -> Option<&ColumnSpec> {
    self.columns.iter().find(|c| c.id == id)
  }

  pub fn column_by_name(&self, name: &str) -> Option<&ColumnSpec> {
    self.columns.iter().find(|c| c.name == name)
  }

  /// Serializes the mapping block:
  /// `[count: u16]` then per column `[id: u32][kind: u8][type: u8][name_len: u16][name]`.
  pub fn encode_into<W: Write>(&self, buf: &mut W) -> Result<()> {
    if self.columns.len() > u16::MAX as usize {
      return Err(Error::Config(format!("Too many columns in mapping: {}", self.columns.len())));
    }

    buf.write_u16::<LittleEndian>(self.columns.len() as u16).map_err(Error::Io)?;
    for col in &self.columns {
      buf.write_u32::<LittleEndian>(col.id).map_err(Error::Io)?;
      buf.write_u8(col.kind as u8).map_err(Error::Io)?;
      buf.write_u8(col.ctype as u8).map_err(Error::Io)?;

      let name = col.name.as_bytes();
      if name.len() > u16::MAX as usize {
        return Err(Error::Config(format!("Column name too long: {}", col.name.len())));
      }
      buf.write_u16::<LittleEndian>(name.len() as u16).map_err(Error::Io)?;
      buf.write_all(name).map_err(Error::Io)?;
    }
    Ok(())
  }

  /// Parses a mapping block from an entry payload.
  pub fn decode_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
    let count = cursor
      .read_u16::<LittleEndian>()
      .map_err(|_| Error::MalformedPayload("Truncated mapping: missing column count".into()))?;

    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
      let id = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::MalformedPayload("Truncated mapping: missing column id".into()))?;
      let kind = ColumnKind::try_from(
        cursor
          .read_u8()
          .map_err(|_| Error::MalformedPayload("Truncated mapping: missing column kind".into()))?,
      )?;
      let ctype = ColumnType::try_from(
        cursor
          .read_u8()
          .map_err(|_| Error::MalformedPayload("Truncated mapping: missing column type".into()))?,
      )?;
      let name_len = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| Error::MalformedPayload("Truncated mapping: missing name length".into()))?
        as usize;

      let mut name_buf = vec![0u8; name_len];
      cursor
        .read_exact(&mut name_buf)
        .map_err(|_| Error::MalformedPayload("Truncated mapping: incomplete column name".into()))?;
      let name = String::from_utf8(name_buf)
        .map_err(|e| Error::MalformedPayload(format!("Invalid UTF-8 in column name: {}", e)))?;

      columns.push(ColumnSpec { id, name, kind, ctype });
    }

    Ok(Self { columns })
  }
}

/// The live schema of a table as the catalogue currently knows it.
#[derive(Debug, Clone)]
pub struct TableSchema {
  pub version: SchemaVersion,
  pub mapping: Arc<ColumnMapping>,
}

impl TableSchema {
  pub fn new(version: SchemaVersion, mapping: ColumnMapping) -> Self {
    Self { version, mapping: Arc::new(mapping) }
  }
}

/// Per-shard memo of `schema version -> column mapping`.
///
/// Strictly shard-local and monotone: a version is inserted once and never
/// replaced with a different mapping.
#[derive(Debug, Default)]
pub struct SchemaCache {
  map: HashMap<SchemaVersion, Arc<ColumnMapping>>,
}

impl SchemaCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolves the mapping for `version`.
  ///
  /// A cached mapping always wins. On a miss the embedded mapping, if any,
  /// is inserted and returned; without one the entry is undecodable.
  pub fn resolve(
    &mut self,
    version: SchemaVersion,
    embedded: Option<ColumnMapping>,
  ) -> Result<Arc<ColumnMapping>> {
    if let Some(mapping) = self.map.get(&version) {
      return Ok(mapping.clone());
    }

    match embedded {
      Some(mapping) => {
        let mapping = Arc::new(mapping);
        self.map.insert(version, mapping.clone());
        Ok(mapping)
      }
      None => Err(Error::UnknownSchemaVersion(version)),
    }
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }
}

/// Re-binds cells decoded under `source` onto the `live` schema.
///
/// Columns are matched by name: a cell whose column no longer exists in the
/// live schema is dropped, and live columns with no incoming cell simply
/// stay absent. A kind mismatch or unsupported type change rejects the
/// whole mutation.
pub fn translate(source: &ColumnMapping, live: &ColumnMapping, cells: &[Cell]) -> Result<Vec<Cell>> {
  let mut out = Vec::with_capacity(cells.len());

  for cell in cells {
    let src_col = source.column(cell.column_id).ok_or_else(|| {
      Error::Apply(format!("cell references column id {} absent from its own mapping", cell.column_id))
    })?;

    let live_col = match live.column_by_name(&src_col.name) {
      Some(col) => col,
      // Column dropped since the entry was written
      None => continue,
    };

    if src_col.kind != live_col.kind {
      return Err(Error::Apply(format!(
        "column {} changed kind ({:?} -> {:?})",
        src_col.name, src_col.kind, live_col.kind
      )));
    }
    if !src_col.ctype.widens_to(live_col.ctype) {
      return Err(Error::Apply(format!(
        "column {} has incompatible type change ({:?} -> {:?})",
        src_col.name, src_col.ctype, live_col.ctype
      )));
    }

    out.push(Cell {
      column_id: live_col.id,
      timestamp: cell.timestamp,
      value: cell.value.clone(),
    });
  }

  Ok(out)
}
