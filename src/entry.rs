//! Wire codec for one commit-log entry.
//!
//! ## Binary Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ TABLE_ID       │ 16 bytes │ Table UUID                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ SCHEMA_VERSION │ 16 bytes │ Version UUID                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ FLAGS          │ 1 byte   │ bit 0: embedded column mapping   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ PK_LEN         │ 2 bytes  │ Partition key length (u16 LE)    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ PARTITION_KEY  │ N bytes  │                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ MAPPING        │ variable │ Present iff FLAGS bit 0          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CELL_COUNT     │ 2 bytes  │ u16 LE                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CELLS          │ variable │ See cell structure               │
//! └──────────────────────────────────────────────────────────────┘
//!
//! Cell structure:
//! [COLUMN_ID: u32] [TIMESTAMP: u64] [LIVE: u8] [LIVE=1 → VALUE_LEN: u32, VALUE]
//! ```
//!
//! A cell with `LIVE = 0` is a tombstone: the column was deleted at
//! `TIMESTAMP`.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::catalog::TableId;
use crate::error::{Error, Result};
use crate::schema::{ColumnMapping, SchemaVersion};

const FLAG_EMBEDDED_MAPPING: u8 = 0x01;

/// One column write inside a mutation. `value: None` is a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
  pub column_id: u32,
  pub timestamp: u64,
  pub value: Option<Vec<u8>>,
}

/// A decoded commit-log entry, still expressed in the column ids of the
/// schema version it was written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEntry {
  pub table_id: TableId,
  pub schema_version: SchemaVersion,
  pub partition_key: Vec<u8>,
  pub cells: Vec<Cell>,
  /// Present iff the writer observed a schema change shortly before
  /// writing this entry.
  pub embedded_mapping: Option<ColumnMapping>,
}

impl MutationEntry {
  /// Serializes the entry into a frame payload.
  pub fn encode(&self) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + self.partition_key.len());

    buf.write_all(&self.table_id.into_bytes()).map_err(Error::Io)?;
    buf.write_all(&self.schema_version.into_bytes()).map_err(Error::Io)?;

    let flags = if self.embedded_mapping.is_some() { FLAG_EMBEDDED_MAPPING } else { 0 };
    buf.write_u8(flags).map_err(Error::Io)?;

    if self.partition_key.len() > u16::MAX as usize {
      return Err(Error::Config(format!(
        "Partition key too long: {} bytes",
        self.partition_key.len()
      )));
    }
    buf.write_u16::<LittleEndian>(self.partition_key.len() as u16).map_err(Error::Io)?;
    buf.write_all(&self.partition_key).map_err(Error::Io)?;

    if let Some(mapping) = &self.embedded_mapping {
      mapping.encode_into(&mut buf)?;
    }

    if self.cells.len() > u16::MAX as usize {
      return Err(Error::Config(format!("Too many cells: {}", self.cells.len())));
    }
    buf.write_u16::<LittleEndian>(self.cells.len() as u16).map_err(Error::Io)?;
    for cell in &self.cells {
      buf.write_u32::<LittleEndian>(cell.column_id).map_err(Error::Io)?;
      buf.write_u64::<LittleEndian>(cell.timestamp).map_err(Error::Io)?;
      match &cell.value {
        Some(value) => {
          buf.write_u8(1).map_err(Error::Io)?;
          buf.write_u32::<LittleEndian>(value.len() as u32).map_err(Error::Io)?;
          buf.write_all(value).map_err(Error::Io)?;
        }
        None => buf.write_u8(0).map_err(Error::Io)?,
      }
    }

    Ok(buf)
  }

  /// Decodes one framed entry payload.
  pub fn decode(buf: &[u8]) -> Result<Self> {
    let mut cursor = Cursor::new(buf);

    let table_id = TableId::from_bytes(read_uuid(&mut cursor, "table id")?);
    let schema_version = SchemaVersion::from_bytes(read_uuid(&mut cursor, "schema version")?);

    let flags = cursor
      .read_u8()
      .map_err(|_| Error::MalformedPayload("Truncated entry: missing flags".into()))?;
    if flags & !FLAG_EMBEDDED_MAPPING != 0 {
      return Err(Error::MalformedPayload(format!("Unknown entry flags: {:#x}", flags)));
    }

    let pk_len = cursor
      .read_u16::<LittleEndian>()
      .map_err(|_| Error::MalformedPayload("Truncated entry: missing key length".into()))?
      as usize;
    let mut partition_key = vec![0u8; pk_len];
    cursor
      .read_exact(&mut partition_key)
      .map_err(|_| Error::MalformedPayload("Truncated entry: incomplete partition key".into()))?;

    let embedded_mapping = if flags & FLAG_EMBEDDED_MAPPING != 0 {
      Some(ColumnMapping::decode_from(&mut cursor)?)
    } else {
      None
    };

    let cell_count = cursor
      .read_u16::<LittleEndian>()
      .map_err(|_| Error::MalformedPayload("Truncated entry: missing cell count".into()))?;

    let mut cells = Vec::with_capacity(cell_count as usize);
    for _ in 0..cell_count {
      let column_id = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::MalformedPayload("Truncated cell: missing column id".into()))?;
      let timestamp = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| Error::MalformedPayload("Truncated cell: missing timestamp".into()))?;
      let live = cursor
        .read_u8()
        .map_err(|_| Error::MalformedPayload("Truncated cell: missing liveness byte".into()))?;

      let value = match live {
        0 => None,
        1 => {
          let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::MalformedPayload("Truncated cell: missing value length".into()))?
            as usize;
          if len > buf.len() {
            return Err(Error::MalformedPayload(format!("Cell value length {} exceeds payload", len)));
          }
          let mut value = vec![0u8; len];
          cursor
            .read_exact(&mut value)
            .map_err(|_| Error::MalformedPayload("Truncated cell: incomplete value".into()))?;
          Some(value)
        }
        other => {
          return Err(Error::MalformedPayload(format!("Invalid cell liveness byte: {}", other)));
        }
      };

      cells.push(Cell { column_id, timestamp, value });
    }

    if cursor.position() != buf.len() as u64 {
      return Err(Error::MalformedPayload(format!(
        "Trailing garbage after entry: {} bytes",
        buf.len() as u64 - cursor.position()
      )));
    }

    Ok(Self { table_id, schema_version, partition_key, cells, embedded_mapping })
  }
}

fn read_uuid(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<[u8; 16]> {
  let mut bytes = [0u8; 16];
  cursor
    .read_exact(&mut bytes)
    .map_err(|_| Error::MalformedPayload(format!("Truncated entry: missing {}", what)))?;
  Ok(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::{ColumnKind, ColumnSpec, ColumnType};
  use uuid::Uuid;

  fn sample_entry(with_mapping: bool) -> MutationEntry {
    let mapping = ColumnMapping::new(vec![
      ColumnSpec { id: 0, name: "pk".into(), kind: ColumnKind::PartitionKey, ctype: ColumnType::Blob },
      ColumnSpec { id: 1, name: "v".into(), kind: ColumnKind::Regular, ctype: ColumnType::Text },
    ]);

    MutationEntry {
      table_id: TableId::new(Uuid::new_v4()),
      schema_version: SchemaVersion::new(Uuid::new_v4()),
      partition_key: b"user_42".to_vec(),
      cells: vec![
        Cell { column_id: 1, timestamp: 100, value: Some(b"hello".to_vec()) },
        Cell { column_id: 1, timestamp: 200, value: None },
      ],
      embedded_mapping: with_mapping.then_some(mapping),
    }
  }

  #[test]
  fn test_roundtrip_without_mapping() {
    let entry = sample_entry(false);
    let buf = entry.encode().unwrap();
    assert_eq!(MutationEntry::decode(&buf).unwrap(), entry);
  }

  #[test]
  fn test_roundtrip_with_mapping() {
    let entry = sample_entry(true);
    let buf = entry.encode().unwrap();
    assert_eq!(MutationEntry::decode(&buf).unwrap(), entry);
  }

  #[test]
  fn test_rejects_truncation_at_every_boundary() {
    let entry = sample_entry(true);
    let buf = entry.encode().unwrap();

    // Chop off progressively larger tails; every prefix must fail cleanly.
    for len in 0..buf.len() {
      let res = MutationEntry::decode(&buf[..len]);
      assert!(
        matches!(res, Err(Error::MalformedPayload(_))),
        "prefix of {} bytes decoded unexpectedly",
        len
      );
    }
  }

  #[test]
  fn test_rejects_trailing_garbage() {
    let entry = sample_entry(false);
    let mut buf = entry.encode().unwrap();
    buf.extend_from_slice(b"junk");

    assert!(matches!(MutationEntry::decode(&buf), Err(Error::MalformedPayload(_))));
  }

  #[test]
  fn test_rejects_unknown_flags() {
    let entry = sample_entry(false);
    let mut buf = entry.encode().unwrap();
    buf[32] |= 0x80; // flags byte follows the two UUIDs

    assert!(matches!(MutationEntry::decode(&buf), Err(Error::MalformedPayload(_))));
  }

  #[test]
  fn test_rejects_overlong_value_length() {
    let entry = MutationEntry {
      cells: vec![Cell { column_id: 0, timestamp: 1, value: Some(vec![1, 2, 3]) }],
      ..sample_entry(false)
    };
    let mut buf = entry.encode().unwrap();

    // Inflate the value length field of the only cell. The cell layout is
    // [id:4][ts:8][live:1][len:4], so the length sits 7 bytes before the end
    // of the 3-byte value.
    let len_pos = buf.len() - 3 - 4;
    buf[len_pos..len_pos + 4].copy_from_slice(&u32::MAX.to_le_bytes());

    assert!(matches!(MutationEntry::decode(&buf), Err(Error::MalformedPayload(_))));
  }
}
