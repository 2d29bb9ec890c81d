//! block — block descriptors and binary block lists.
//!
//! A block list is a flat sequence of 32-byte little-endian entries:
//!   [original_offset u64][relative_offset u64][offset u64][flags u32][bitmap u32]
//! An all-zero entry is an empty slot and is skipped by readers.
//!
//! Submodules:
//! - tree.rs: BlockTree (per-store index by original offset, insert/merge rules).

mod tree;

pub use tree::{BlockEntry, BlockTree};

use std::fs::OpenOptions;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::consts::{
    BLOCK_LIST_ENTRY_SIZE, BLOCK_MASK, FLAG_FORWARDER, FLAG_NOT_USED, FLAG_OVERLAY,
};
use crate::error::StoreError;

/// One copy-on-write record of a store.
///
/// - copy (no flags): the pre-snapshot block at `original_offset` lives at `offset` on the volume.
/// - FORWARDER: the block's data is found at `relative_offset` in the next newer store.
/// - OVERLAY: sectors with their `bitmap` bit set live at `offset`; other sectors fall through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub original_offset: u64,
    #[serde(default)]
    pub relative_offset: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub bitmap: u32,
}

impl BlockDescriptor {
    pub fn copy(original_offset: u64, offset: u64) -> Self {
        Self {
            original_offset,
            relative_offset: 0,
            offset,
            flags: 0,
            bitmap: 0,
        }
    }

    pub fn forwarder(original_offset: u64, relative_offset: u64) -> Self {
        Self {
            original_offset,
            relative_offset,
            offset: 0,
            flags: FLAG_FORWARDER,
            bitmap: 0,
        }
    }

    pub fn overlay(original_offset: u64, offset: u64, bitmap: u32) -> Self {
        Self {
            original_offset,
            relative_offset: 0,
            offset,
            flags: FLAG_OVERLAY,
            bitmap,
        }
    }

    pub fn is_forwarder(&self) -> bool {
        self.flags & FLAG_FORWARDER != 0
    }

    pub fn is_overlay(&self) -> bool {
        self.flags & FLAG_OVERLAY != 0
    }

    pub fn is_not_used(&self) -> bool {
        self.flags & FLAG_NOT_USED != 0
    }

    /// Block-aligned original offset.
    pub fn block_offset(&self) -> u64 {
        self.original_offset & !BLOCK_MASK
    }

    pub fn kind(&self) -> &'static str {
        if self.is_not_used() {
            "unused"
        } else if self.is_overlay() {
            "overlay"
        } else if self.is_forwarder() {
            "forwarder"
        } else {
            "copy"
        }
    }
}

/// Decode one entry. Ok(None) for an empty (all-zero) entry.
pub fn decode_entry(buf: &[u8]) -> Result<Option<BlockDescriptor>, StoreError> {
    if buf.len() < BLOCK_LIST_ENTRY_SIZE {
        return Err(StoreError::Format(format!(
            "block list entry too short: {} < {}",
            buf.len(),
            BLOCK_LIST_ENTRY_SIZE
        )));
    }
    let entry = &buf[..BLOCK_LIST_ENTRY_SIZE];
    if entry.iter().all(|&b| b == 0) {
        return Ok(None);
    }
    Ok(Some(BlockDescriptor {
        original_offset: LittleEndian::read_u64(&entry[0..8]),
        relative_offset: LittleEndian::read_u64(&entry[8..16]),
        offset: LittleEndian::read_u64(&entry[16..24]),
        flags: LittleEndian::read_u32(&entry[24..28]),
        bitmap: LittleEndian::read_u32(&entry[28..32]),
    }))
}

pub fn encode_entry(d: &BlockDescriptor) -> [u8; BLOCK_LIST_ENTRY_SIZE] {
    let mut out = [0u8; BLOCK_LIST_ENTRY_SIZE];
    LittleEndian::write_u64(&mut out[0..8], d.original_offset);
    LittleEndian::write_u64(&mut out[8..16], d.relative_offset);
    LittleEndian::write_u64(&mut out[16..24], d.offset);
    LittleEndian::write_u32(&mut out[24..28], d.flags);
    LittleEndian::write_u32(&mut out[28..32], d.bitmap);
    out
}

/// Iterator over the descriptors of a block list stream.
/// Empty entries are skipped; a trailing partial entry is an error.
pub struct BlockListReader<R> {
    inner: R,
    entry_index: u64,
    done: bool,
}

impl<R: Read> BlockListReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            entry_index: 0,
            done: false,
        }
    }

    /// Fill one entry; Ok(false) on clean EOF at an entry boundary.
    fn read_entry(&mut self, buf: &mut [u8; BLOCK_LIST_ENTRY_SIZE]) -> Result<bool, StoreError> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let off = self.entry_index * BLOCK_LIST_ENTRY_SIZE as u64;
                    return Err(StoreError::io(off, BLOCK_LIST_ENTRY_SIZE, e));
                }
            }
        }
        if filled == 0 {
            return Ok(false);
        }
        if filled < buf.len() {
            return Err(StoreError::Format(format!(
                "partial block list entry {} ({} of {} bytes)",
                self.entry_index,
                filled,
                BLOCK_LIST_ENTRY_SIZE
            )));
        }
        Ok(true)
    }
}

impl<R: Read> Iterator for BlockListReader<R> {
    type Item = Result<BlockDescriptor, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0u8; BLOCK_LIST_ENTRY_SIZE];
        while !self.done {
            match self.read_entry(&mut buf) {
                Ok(false) => self.done = true,
                Ok(true) => {
                    self.entry_index += 1;
                    match decode_entry(&buf) {
                        Ok(Some(d)) => return Some(Ok(d)),
                        Ok(None) => continue,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Read all descriptors from a block list file.
pub fn read_block_list(path: &Path) -> Result<Vec<BlockDescriptor>> {
    let f = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open block list {}", path.display()))?;
    let mut out = Vec::new();
    for d in BlockListReader::new(BufReader::new(f)) {
        out.push(d.with_context(|| format!("read block list {}", path.display()))?);
    }
    Ok(out)
}

/// Write descriptors as a block list file (truncating).
pub fn write_block_list(path: &Path, descriptors: &[BlockDescriptor]) -> Result<()> {
    let f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .with_context(|| format!("create block list {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for d in descriptors {
        w.write_all(&encode_entry(d))?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn entry_layout_is_little_endian() {
        let d = BlockDescriptor {
            original_offset: 0xc0008000,
            relative_offset: 0x0419c000,
            offset: 0x38241c000,
            flags: 0x88,
            bitmap: 0xff000000,
        };
        let raw = encode_entry(&d);
        assert_eq!(&raw[0..8], &0xc0008000u64.to_le_bytes());
        assert_eq!(&raw[24..28], &0x88u32.to_le_bytes());
        assert_eq!(decode_entry(&raw).unwrap(), Some(d));
    }

    #[test]
    fn empty_entry_decodes_to_none() {
        assert_eq!(decode_entry(&[0u8; 32]).unwrap(), None);
        assert!(matches!(decode_entry(&[0u8; 8]), Err(StoreError::Format(_))));
    }

    #[test]
    fn reader_skips_empty_entries() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&encode_entry(&BlockDescriptor::copy(0x4000, 0x10000)));
        raw.extend_from_slice(&[0u8; 32]);
        raw.extend_from_slice(&encode_entry(&BlockDescriptor::forwarder(0x8000, 0xc000)));

        let got: Vec<_> = BlockListReader::new(Cursor::new(raw))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(got.len(), 2);
        assert!(got[1].is_forwarder());
        assert_eq!(got[1].relative_offset, 0xc000);
    }

    #[test]
    fn reader_rejects_partial_tail() {
        let mut raw = encode_entry(&BlockDescriptor::copy(0, 0x4000)).to_vec();
        raw.extend_from_slice(&[1u8; 7]);
        let mut it = BlockListReader::new(Cursor::new(raw));
        assert!(it.next().unwrap().is_ok());
        assert!(matches!(it.next(), Some(Err(StoreError::Format(_)))));
        assert!(it.next().is_none());
    }

    #[test]
    fn kinds() {
        assert_eq!(BlockDescriptor::copy(0, 0).kind(), "copy");
        assert_eq!(BlockDescriptor::overlay(0, 0, 1).kind(), "overlay");
        assert_eq!(BlockDescriptor::forwarder(0, 0x4000).kind(), "forwarder");
        let unused = BlockDescriptor {
            flags: FLAG_NOT_USED | FLAG_OVERLAY,
            ..Default::default()
        };
        assert_eq!(unused.kind(), "unused");
        assert_eq!(BlockDescriptor::copy(0x4123, 0).block_offset(), 0x4000);
    }
}
