//! StoreStream — one store presented as a seekable, readable byte stream.
//!
//! Contract:
//! - size is fixed at construction; position stays within [0, size].
//! - seek to any target in [0, size] succeeds (size itself means "at end");
//!   anything else is OutOfBounds and leaves position untouched.
//! - read(n) returns exactly min(n, size - position) bytes or fails; there is no
//!   short read except at end of stream, where the result is empty.
//! - read_buffer_at_offset validates the offset before reading and only moves
//!   the cursor (to offset + returned length) on success.
//! - a block source failure is an Io error and leaves position unchanged;
//!   callers still re-seek before retrying.
//!
//! Every cursor-moving method takes &mut self: one stream, one reader.
//! Independent readers open independent streams over a shared source.

use std::io;

use log::{debug, trace};

use crate::error::{Result, StoreError};
use crate::metrics::{record_io_error, record_out_of_bounds, record_stream_read, record_stream_seek};
use crate::source::BlockSource;

/// Reference point for seek.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    FromStart,
    FromCurrent,
    FromEnd,
}

impl Whence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Whence::FromStart => "SEEK_SET",
            Whence::FromCurrent => "SEEK_CUR",
            Whence::FromEnd => "SEEK_END",
        }
    }
}

pub struct StoreStream<S> {
    source: S,
    size: u64,
    position: u64,
}

impl<S: BlockSource> StoreStream<S> {
    pub fn new(source: S) -> Self {
        let size = source.size();
        Self {
            source,
            size,
            position: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current cursor.
    pub fn get_offset(&self) -> u64 {
        self.position
    }

    /// Move the cursor; returns the new position.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base: i128 = match whence {
            Whence::FromStart => 0,
            Whence::FromCurrent => self.position as i128,
            Whence::FromEnd => self.size as i128,
        };
        self.seek_to(base + offset as i128)
    }

    /// Read up to `max_size` bytes at the cursor.
    pub fn read(&mut self, max_size: usize) -> Result<Vec<u8>> {
        let len = self.effective_len(self.position, max_size);
        let mut buf = vec![0u8; len];
        self.fetch_at(self.position, &mut buf)?;
        self.position += len as u64;
        Ok(buf)
    }

    /// Read into `buf` at the cursor; returns the number of bytes read.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.effective_len(self.position, buf.len());
        self.fetch_at(self.position, &mut buf[..len])?;
        self.position += len as u64;
        Ok(len)
    }

    /// Positional read of up to `size` bytes at `offset`; leaves the cursor
    /// after the returned bytes.
    pub fn read_buffer_at_offset(&mut self, size: usize, offset: u64) -> Result<Vec<u8>> {
        if offset > self.size {
            record_out_of_bounds();
            debug!(
                "store stream: positional read at {} beyond size {}",
                offset, self.size
            );
            return Err(StoreError::out_of_bounds(offset, self.size));
        }
        let len = self.effective_len(offset, size);
        let mut buf = vec![0u8; len];
        self.fetch_at(offset, &mut buf)?;
        self.position = offset + len as u64;
        Ok(buf)
    }

    // ----------------- internal helpers -----------------

    fn seek_to(&mut self, target: i128) -> Result<u64> {
        if target < 0 || target > self.size as i128 {
            record_out_of_bounds();
            debug!(
                "store stream: seek target {} outside [0, {}], position stays {}",
                target, self.size, self.position
            );
            return Err(StoreError::out_of_bounds(target, self.size));
        }
        self.position = target as u64;
        record_stream_seek();
        Ok(self.position)
    }

    fn effective_len(&self, offset: u64, max: usize) -> usize {
        let remaining = self.size.saturating_sub(offset);
        (max as u64).min(remaining) as usize
    }

    fn fetch_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            record_stream_read(0);
            return Ok(());
        }
        if let Err(e) = self.source.fetch(offset, buf) {
            record_io_error();
            debug!(
                "store stream: fetch of {} bytes at {} failed: {}",
                buf.len(),
                offset,
                e
            );
            return Err(StoreError::io(offset, buf.len(), e));
        }
        record_stream_read(buf.len());
        trace!("store stream: read {} bytes at {}", buf.len(), offset);
        Ok(())
    }
}

fn into_io_error(e: StoreError) -> io::Error {
    match e {
        StoreError::Io { source, .. } => source,
        other => io::Error::new(io::ErrorKind::InvalidInput, other),
    }
}

impl<S: BlockSource> io::Read for StoreStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(into_io_error)
    }
}

/// Unlike files, seeking past the end is rejected.
impl<S: BlockSource> io::Seek for StoreStream<S> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target: i128 = match pos {
            io::SeekFrom::Start(n) => n as i128,
            io::SeekFrom::Current(d) => self.position as i128 + d as i128,
            io::SeekFrom::End(d) => self.size as i128 + d as i128,
        };
        self.seek_to(target).map_err(into_io_error)
    }
}
