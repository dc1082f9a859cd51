//! On-disk frame format for commit-log entries.
//!
//! Each entry the WAL writer appends is wrapped in one frame. The replay
//! reader consumes frames one at a time and verifies the checksum before
//! handing the payload to the entry decoder.

use crate::config::{CompressionType, ReplayOptions};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{self, Read, Write};

#[cfg(feature = "compression")]
use lz4_flex::frame::{FrameDecoder, FrameEncoder};

pub const FRAME_MAGIC: u32 = 0x52424D45; // "EMBR"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
  Raw = 0x00,
  Lz4 = 0x01,
}

impl TryFrom<u8> for FrameType {
  type Error = Error;
  fn try_from(v: u8) -> Result<Self> {
    match v {
      0x00 => Ok(FrameType::Raw),
      0x01 => Ok(FrameType::Lz4),
      _ => Err(Error::Corruption(format!("Unknown frame type: {}", v))),
    }
  }
}

/// The exact binary layout of a frame header on disk (17 bytes).
///
/// [Magic: 4]
/// [CRC32: 4]
/// [Type: 1]
/// [Disk Size: 4]
/// [Raw Size: 4]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
  pub crc: u32,
  pub frame_type: FrameType,
  pub disk_size: u32,
  pub raw_size: u32,
}

impl FrameHeader {
  pub const SIZE: usize = 4 + 4 + 1 + 4 + 4; // 17 bytes

  pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(FRAME_MAGIC)?;
    writer.write_u32::<LittleEndian>(self.crc)?;
    writer.write_u8(self.frame_type as u8)?;
    writer.write_u32::<LittleEndian>(self.disk_size)?;
    writer.write_u32::<LittleEndian>(self.raw_size)?;
    Ok(())
  }

  pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != FRAME_MAGIC {
      return Err(Error::Corruption(format!("Invalid Frame Magic: {:#x}", magic)));
    }

    let crc = reader.read_u32::<LittleEndian>()?;
    let type_byte = reader.read_u8()?;
    let frame_type = FrameType::try_from(type_byte)?;
    let disk_size = reader.read_u32::<LittleEndian>()?;
    let raw_size = reader.read_u32::<LittleEndian>()?;

    Ok(Self { crc, frame_type, disk_size, raw_size })
  }
}

/// Calculates CRC32 for the frame content (excluding the Magic and CRC field itself).
pub fn calculate_checksum(frame_type: FrameType, raw_size: u32, payload: &[u8]) -> u32 {
  let mut hasher = Hasher::new();
  hasher.update(&[frame_type as u8]);
  hasher.update(&(payload.len() as u32).to_le_bytes());
  hasher.update(&raw_size.to_le_bytes());
  hasher.update(payload);
  hasher.finalize()
}

/// Frames a raw entry payload for disk, compressing it when configured and
/// when compression actually saves space.
pub fn encode_frame(raw: &[u8], options: &ReplayOptions) -> Result<Vec<u8>> {
  let raw_size = raw.len() as u32;
  let (frame_type, disk_payload) = compress_if_needed(raw, options)?;

  let crc = calculate_checksum(frame_type, raw_size, &disk_payload);
  let header = FrameHeader {
    crc,
    frame_type,
    disk_size: disk_payload.len() as u32,
    raw_size,
  };

  let mut buf = Vec::with_capacity(FrameHeader::SIZE + disk_payload.len());
  header.write(&mut buf).map_err(Error::Io)?;
  buf.extend_from_slice(&disk_payload);
  Ok(buf)
}

fn compress_if_needed<'a>(
  raw: &'a [u8],
  options: &ReplayOptions,
) -> Result<(FrameType, std::borrow::Cow<'a, [u8]>)> {
  if options.compression == CompressionType::None || raw.len() < options.min_compression_size {
    return Ok((FrameType::Raw, std::borrow::Cow::Borrowed(raw)));
  }

  #[cfg(feature = "compression")]
  {
    if options.compression == CompressionType::Lz4 {
      let mut encoder = FrameEncoder::new(Vec::new());
      encoder.write_all(raw).map_err(Error::Io)?;

      let compressed = encoder
        .finish()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;

      // Only use compression if we actually saved space
      if compressed.len() < raw.len() {
        return Ok((FrameType::Lz4, std::borrow::Cow::Owned(compressed)));
      }
    }
  }

  Ok((FrameType::Raw, std::borrow::Cow::Borrowed(raw)))
}

/// Restores a frame payload to its raw bytes.
pub fn decompress(ft: FrameType, data: &[u8], _raw_size: u32) -> Result<std::borrow::Cow<'_, [u8]>> {
  match ft {
    FrameType::Raw => Ok(std::borrow::Cow::Borrowed(data)),
    FrameType::Lz4 => {
      #[cfg(feature = "compression")]
      {
        let mut decoder = FrameDecoder::new(data);
        let mut out = Vec::with_capacity(_raw_size as usize);
        decoder.read_to_end(&mut out).map_err(Error::Io)?;
        Ok(std::borrow::Cow::Owned(out))
      }
      #[cfg(not(feature = "compression"))]
      {
        Err(Error::Config("LZ4 frame found but compression feature disabled".into()))
      }
    }
  }
}
