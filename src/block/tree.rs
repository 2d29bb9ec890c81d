//! BlockTree — per-store index of block descriptors keyed by block-aligned original offset.
//!
//! Insert rules:
//! - NOT_USED descriptors are ignored.
//! - A forwarder pointing at its own offset is ignored.
//! - Overlays for the same block merge: bitmaps are OR-ed into the first overlay.
//! - Copy/forwarder descriptors replace the previous copy/forwarder of the block;
//!   an existing overlay stays attached (overlay sectors take precedence on read).
//! - Misaligned offsets are a Format error in strict mode, otherwise skipped with a warning.
//! - A misaligned copy/overlay data offset is a Format error in strict mode; otherwise the
//!   descriptor is kept with a warning and reads that overflow it fail.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::consts::BLOCK_MASK;
use crate::error::StoreError;

use super::BlockDescriptor;

/// Everything a store knows about one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockEntry {
    /// Copy or forwarder record.
    pub descriptor: Option<BlockDescriptor>,
    /// Merged overlay record.
    pub overlay: Option<BlockDescriptor>,
}

#[derive(Clone, Debug, Default)]
pub struct BlockTree {
    map: BTreeMap<u64, BlockEntry>,
    strict: bool,
}

impl BlockTree {
    pub fn new(strict: bool) -> Self {
        Self {
            map: BTreeMap::new(),
            strict,
        }
    }

    /// Build a tree from descriptors in list order (later records win).
    pub fn from_descriptors<'a, I>(descriptors: I, strict: bool) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = &'a BlockDescriptor>,
    {
        let mut tree = Self::new(strict);
        for d in descriptors {
            tree.insert(d)?;
        }
        Ok(tree)
    }

    /// Insert one descriptor. Ok(true) if the tree changed.
    pub fn insert(&mut self, d: &BlockDescriptor) -> Result<bool, StoreError> {
        if d.is_not_used() {
            debug!("block tree: skip unused descriptor at 0x{:x}", d.original_offset);
            return Ok(false);
        }
        if d.original_offset & BLOCK_MASK != 0 {
            return self.misaligned(d, "original offset", d.original_offset);
        }

        if !d.is_forwarder() && d.offset & BLOCK_MASK != 0 {
            if self.strict {
                return Err(StoreError::Format(format!(
                    "{} at 0x{:x} has misaligned data offset 0x{:x}",
                    d.kind(),
                    d.original_offset,
                    d.offset
                )));
            }
            warn!(
                "block tree: {} at 0x{:x} has misaligned data offset 0x{:x}",
                d.kind(),
                d.original_offset,
                d.offset
            );
        }

        if d.is_overlay() {
            let entry = self.map.entry(d.original_offset).or_default();
            match entry.overlay.as_mut() {
                Some(ov) => {
                    ov.bitmap |= d.bitmap;
                    debug!(
                        "block tree: merged overlay at 0x{:x}, bitmap=0x{:08x}",
                        d.original_offset, ov.bitmap
                    );
                }
                None => entry.overlay = Some(*d),
            }
            return Ok(true);
        }

        if d.is_forwarder() {
            if d.relative_offset == d.original_offset {
                debug!("block tree: skip self-forwarder at 0x{:x}", d.original_offset);
                return Ok(false);
            }
            if d.relative_offset & BLOCK_MASK != 0 {
                return self.misaligned(d, "relative offset", d.relative_offset);
            }
        }

        let entry = self.map.entry(d.original_offset).or_default();
        if let Some(prev) = entry.descriptor {
            debug!(
                "block tree: replace {} at 0x{:x} with {}",
                prev.kind(),
                d.original_offset,
                d.kind()
            );
        }
        entry.descriptor = Some(*d);
        Ok(true)
    }

    pub fn get(&self, block_offset: u64) -> Option<&BlockEntry> {
        self.map.get(&block_offset)
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &BlockEntry)> {
        self.map.iter().map(|(k, v)| (*k, v))
    }

    fn misaligned(&self, d: &BlockDescriptor, what: &str, value: u64) -> Result<bool, StoreError> {
        if self.strict {
            return Err(StoreError::Format(format!(
                "{} {} 0x{:x} is not block aligned",
                d.kind(),
                what,
                value
            )));
        }
        warn!(
            "block tree: skip {} with misaligned {} 0x{:x}",
            d.kind(),
            what,
            value
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(original: u64, relative: u64, offset: u64, flags: u32, bitmap: u32) -> BlockDescriptor {
        BlockDescriptor {
            original_offset: original,
            relative_offset: relative,
            offset,
            flags,
            bitmap,
        }
    }

    #[test]
    fn misaligned_data_offset_strict_and_lenient() {
        let bad = desc(0x4000, 0, u64::MAX - 5, 0, 0);
        let mut strict = BlockTree::new(true);
        assert!(matches!(strict.insert(&bad), Err(StoreError::Format(_))));
        assert!(strict.is_empty());

        let mut lenient = BlockTree::new(false);
        assert!(lenient.insert(&bad).unwrap());
        assert_eq!(lenient.get(0x4000).unwrap().descriptor.unwrap().offset, u64::MAX - 5);

        // forwarders do not use the data offset
        assert!(strict.insert(&desc(0x8000, 0xc000, 0x123, 0x1, 0)).unwrap());
    }

    #[test]
    fn insert_sequence_merges_and_replaces() {
        let mut t = BlockTree::new(true);

        assert!(t.insert(&desc(0xc0008000, 0x0419c000, 0x38241c000, 0, 0)).unwrap());
        // unknown high flags behave like a plain copy
        assert!(t.insert(&desc(0xb7f20000, 0x0006c000, 0x37e2ec000, 0x88, 0)).unwrap());

        // overlay, then overlapping overlay with another bitmap
        t.insert(&desc(0xb7f1c000, 0x0004c000, 0x37e2cc000, 0x2, 0xff000000)).unwrap();
        t.insert(&desc(0xb7f1c000, 0x00000001, 0x37e2cc000, 0x2, 0x00ff0000)).unwrap();
        let e = t.get(0xb7f1c000).unwrap();
        assert_eq!(e.overlay.unwrap().bitmap, 0xffff0000);
        assert!(e.descriptor.is_none());

        // copy lands next to the overlay
        t.insert(&desc(0xb7f1c000, 0x04184000, 0x382404000, 0, 0)).unwrap();
        let e = t.get(0xb7f1c000).unwrap();
        assert_eq!(e.descriptor.unwrap().offset, 0x382404000);
        assert!(e.overlay.is_some());

        // extend an existing copy with overlays
        t.insert(&desc(0xb7f20000, 0x00050000, 0x37e2d0000, 0x2, 0x000000ff)).unwrap();
        t.insert(&desc(0xb7f20000, 0x00000001, 0x37e2d0000, 0x2, 0x0000ff00)).unwrap();
        let e = t.get(0xb7f20000).unwrap();
        assert_eq!(e.overlay.unwrap().bitmap, 0x0000ffff);
        assert_eq!(e.descriptor.unwrap().flags, 0x88);

        // self-forwarder ignored
        assert!(!t.insert(&desc(0xbbed8000, 0xbbed8000, 0x3823b8000, 0x1, 0)).unwrap());
        assert!(t.get(0xbbed8000).is_none());

        // forwarder replaces the copy, reverse forwarder is its own entry
        t.insert(&desc(0xb7f1c000, 0x0004c000, 0x37e2cc000, 0x1, 0)).unwrap();
        t.insert(&desc(0x0004c000, 0xb7f1c000, 0x37e2cc000, 0x1, 0)).unwrap();
        assert!(t.get(0xb7f1c000).unwrap().descriptor.unwrap().is_forwarder());
        assert_eq!(
            t.get(0x0004c000).unwrap().descriptor.unwrap().relative_offset,
            0xb7f1c000
        );

        assert_eq!(t.len(), 4);
        let keys: Vec<u64> = t.iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn unused_descriptors_are_ignored() {
        let mut t = BlockTree::new(true);
        assert!(!t.insert(&desc(0x4000, 0, 0x8000, 0x4, 0)).unwrap());
        assert!(t.is_empty());
    }

    #[test]
    fn misaligned_strict_vs_lenient() {
        let bad = desc(0x4001, 0, 0x8000, 0, 0);
        let mut strict = BlockTree::new(true);
        assert!(matches!(strict.insert(&bad), Err(StoreError::Format(_))));

        let mut lenient = BlockTree::new(false);
        assert!(!lenient.insert(&bad).unwrap());
        assert!(lenient.is_empty());

        let bad_fwd = BlockDescriptor::forwarder(0x4000, 0x8010);
        assert!(strict.insert(&bad_fwd).is_err());
        assert!(!lenient.insert(&bad_fwd).unwrap());
    }

    #[test]
    fn from_descriptors_later_wins() {
        let list = [
            BlockDescriptor::copy(0x4000, 0x100000),
            BlockDescriptor::copy(0x4000, 0x200000),
        ];
        let t = BlockTree::from_descriptors(list.iter(), false).unwrap();
        assert_eq!(t.get(0x4000).unwrap().descriptor.unwrap().offset, 0x200000);
    }
}
