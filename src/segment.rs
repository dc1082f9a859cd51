//! Streaming access to one commit-log segment file.
//!
//! [`SegmentReader`] yields framed entry payloads one at a time together
//! with the replay position of each frame's first byte. It never buffers
//! the whole segment. Unreadable trailing bytes (a crash-interrupted
//! append, or any corruption, since the reader does not resynchronize)
//! end the stream cleanly and are accounted as `corrupt_bytes`.
//!
//! [`SegmentWriter`] is the matching producer, used by tooling, tests and
//! benches to synthesize segments in the writer's format.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::config::{ReadStrategy, ReplayOptions};
use crate::entry::MutationEntry;
use crate::error::{Error, Result};
use crate::frame::{self, FrameHeader};
use crate::position::{ReplayPosition, SegmentDescriptor};

enum ReadSource {
  Io(BufReader<File>),
  Mmap(Mmap),
}

/// Reads a segment file frame by frame from a starting offset.
///
/// The sequence is not restartable; open a fresh reader to re-read.
pub struct SegmentReader {
  descriptor: SegmentDescriptor,
  file_len: u64,
  cursor: u64,
  corrupt_bytes: u64,
  done: bool,
  src: ReadSource,
}

impl SegmentReader {
  /// Opens `path` and seeks to `start_offset`.
  ///
  /// The descriptor is parsed from the filename; a name the WAL writer
  /// could not have produced is `Error::InvalidSegmentName`. An I/O
  /// failure here is a device error and is fatal to replay.
  pub fn open(path: &Path, options: &ReplayOptions, start_offset: u32) -> Result<Self> {
    let descriptor = SegmentDescriptor::parse(path)?;
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let src = match options.read_strategy {
      ReadStrategy::Mmap => {
        // Safety: segments are immutable once closed; the writer never
        // touches a file handed to replay.
        let mmap = unsafe { Mmap::map(&file)? };
        ReadSource::Mmap(mmap)
      }
      ReadStrategy::StandardIo => {
        let mut reader = BufReader::with_capacity(options.read_buffer_size, file);
        reader.seek(SeekFrom::Start(start_offset as u64))?;
        ReadSource::Io(reader)
      }
    };

    Ok(Self {
      descriptor,
      file_len,
      cursor: start_offset as u64,
      corrupt_bytes: 0,
      done: false,
      src,
    })
  }

  pub fn descriptor(&self) -> SegmentDescriptor {
    self.descriptor
  }

  /// Unreadable trailing bytes. Final once the reader has returned `None`.
  pub fn corrupt_bytes(&self) -> u64 {
    self.corrupt_bytes
  }

  /// Yields the next framed entry payload and its position, or `None` at
  /// the end of the readable prefix.
  ///
  /// Returns `Err` only for genuine I/O failures; corrupt or truncated
  /// frames terminate the stream and are reported via `corrupt_bytes`.
  pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, ReplayPosition)>> {
    if self.done {
      return Ok(None);
    }

    let frame_start = self.cursor;
    let remaining = self.file_len.saturating_sub(frame_start);

    if remaining == 0 {
      self.done = true;
      return Ok(None);
    }
    if remaining < FrameHeader::SIZE as u64 {
      return Ok(self.corrupt_tail(frame_start));
    }

    let header = match self.read_header() {
      Ok(h) => h,
      Err(Error::Io(e)) if e.kind() != io::ErrorKind::UnexpectedEof => return Err(Error::Io(e)),
      Err(_) => return Ok(self.corrupt_tail(frame_start)),
    };

    if header.disk_size as u64 > remaining - FrameHeader::SIZE as u64 {
      return Ok(self.corrupt_tail(frame_start));
    }

    let payload = match self.read_payload(frame_start, header.disk_size as usize) {
      Ok(p) => p,
      Err(Error::Io(e)) if e.kind() != io::ErrorKind::UnexpectedEof => return Err(Error::Io(e)),
      Err(_) => return Ok(self.corrupt_tail(frame_start)),
    };

    let crc = frame::calculate_checksum(header.frame_type, header.raw_size, &payload);
    if crc != header.crc {
      return Ok(self.corrupt_tail(frame_start));
    }

    let raw = match frame::decompress(header.frame_type, &payload, header.raw_size) {
      Ok(raw) => raw.into_owned(),
      Err(Error::Config(e)) => return Err(Error::Config(e)),
      // The frame is checksummed, so a decoder failure means the writer
      // produced garbage: treat it like any other unreadable tail.
      Err(_) => return Ok(self.corrupt_tail(frame_start)),
    };

    self.cursor = frame_start + FrameHeader::SIZE as u64 + header.disk_size as u64;

    let position = ReplayPosition::new(
      self.descriptor.segment_id,
      frame_start as u32,
      self.descriptor.shard_id,
    );
    Ok(Some((raw, position)))
  }

  fn read_header(&mut self) -> Result<FrameHeader> {
    match &mut self.src {
      ReadSource::Io(reader) => FrameHeader::read(reader),
      ReadSource::Mmap(mmap) => {
        let mut slice = &mmap[self.cursor as usize..];
        FrameHeader::read(&mut slice)
      }
    }
  }

  fn read_payload(&mut self, frame_start: u64, disk_size: usize) -> Result<Vec<u8>> {
    match &mut self.src {
      ReadSource::Io(reader) => {
        let mut payload = vec![0u8; disk_size];
        reader.read_exact(&mut payload)?;
        Ok(payload)
      }
      ReadSource::Mmap(mmap) => {
        let start = frame_start as usize + FrameHeader::SIZE;
        Ok(mmap[start..start + disk_size].to_vec())
      }
    }
  }

  fn corrupt_tail(&mut self, frame_start: u64) -> Option<(Vec<u8>, ReplayPosition)> {
    self.corrupt_bytes = self.file_len - frame_start;
    self.done = true;
    None
  }
}

/// Appends framed entries to a segment file.
pub struct SegmentWriter {
  descriptor: SegmentDescriptor,
  path: PathBuf,
  file: BufWriter<File>,
  offset: u64,
}

impl SegmentWriter {
  /// Creates `segment-<id>-<shard>.log` under `dir`.
  pub fn create(dir: &Path, descriptor: SegmentDescriptor) -> Result<Self> {
    let path = dir.join(descriptor.filename());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let offset = file.metadata()?.len();

    Ok(Self {
      descriptor,
      path,
      file: BufWriter::new(file),
      offset,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Frames and appends one entry; returns the position of the frame start.
  pub fn append(&mut self, entry: &MutationEntry, options: &ReplayOptions) -> Result<ReplayPosition> {
    let payload = entry.encode()?;
    self.append_payload(&payload, options)
  }

  /// Frames and appends a pre-encoded entry payload.
  pub fn append_payload(&mut self, payload: &[u8], options: &ReplayOptions) -> Result<ReplayPosition> {
    let framed = frame::encode_frame(payload, options)?;
    let position = ReplayPosition::new(
      self.descriptor.segment_id,
      self.offset as u32,
      self.descriptor.shard_id,
    );

    self.file.write_all(&framed).map_err(Error::Io)?;
    self.offset += framed.len() as u64;
    Ok(position)
  }

  /// Flushes buffered frames and syncs file data to disk.
  pub fn sync(&mut self) -> Result<()> {
    self.file.flush().map_err(Error::Io)?;
    self.file.get_ref().sync_data().map_err(Error::Io)?;
    Ok(())
  }
}
