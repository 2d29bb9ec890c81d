//! overlay — copy-on-write resolution of store bytes across the store chain.
//!
//! Stores are ordered oldest first. Reading logical offset O of store i:
//! 1. past the newest store -> current volume at O;
//! 2. overlay sector bit set -> volume at overlay.offset + in_block;
//! 3. copy descriptor        -> volume at descriptor.offset + in_block;
//! 4. forwarder              -> store i+1 at relative_offset + in_block;
//! 5. nothing recorded       -> store i+1 at O.
//!
//! All store data lives on the volume itself, so every run ends up as a
//! volume fetch. Runs never cross a block or an overlay bitmap edge.
//! The store index grows on every step, so resolution always terminates.

use std::io;
use std::sync::Arc;

use log::trace;

use crate::block::BlockTree;
use crate::consts::{BLOCK_MASK, BLOCK_SIZE, SECTORS_PER_BLOCK, SECTOR_SIZE};
use crate::metrics::{
    record_copied_block_read, record_forwarder_hop, record_overlay_sector_read,
    record_passthrough_read,
};
use crate::source::{check_range, BlockSource};

/// Where a resolved run comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Overlay,
    Copy,
    Volume,
}

/// A contiguous run of store bytes mapped onto the volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub volume_offset: u64,
    pub len: u64,
    pub origin: Origin,
    /// Forwarders followed to get here.
    pub hops: u32,
}

/// State of `sector` in an overlay bitmap and how many sectors (including it)
/// share that state up to the end of the block.
fn bitmap_run(bitmap: u32, sector: u64) -> (bool, u64) {
    let set = |s: u64| bitmap & (1u32 << s) != 0;
    let state = set(sector);
    let mut n = 1;
    while sector + n < SECTORS_PER_BLOCK && set(sector + n) == state {
        n += 1;
    }
    (state, n)
}

/// `base + in_block` for a descriptor data offset; overflow means a corrupt descriptor.
fn data_offset(base: u64, in_block: u64) -> io::Result<u64> {
    base.checked_add(in_block).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("block data offset 0x{:x} + 0x{:x} overflows", base, in_block),
        )
    })
}

/// The current volume plus the block trees of all stores, oldest first.
pub struct OverlayChain<V> {
    volume: V,
    trees: Vec<BlockTree>,
}

impl<V: BlockSource> OverlayChain<V> {
    pub fn new(volume: V, trees: Vec<BlockTree>) -> Self {
        Self { volume, trees }
    }

    pub fn volume(&self) -> &V {
        &self.volume
    }

    /// Logical size of every store (the volume size).
    pub fn size(&self) -> u64 {
        self.volume.size()
    }

    pub fn number_of_stores(&self) -> usize {
        self.trees.len()
    }

    pub fn tree(&self, store: usize) -> Option<&BlockTree> {
        self.trees.get(store)
    }

    /// Resolve logical `offset` of `store` to a volume run.
    /// A data offset that overflows is InvalidData.
    pub fn locate(&self, store: usize, offset: u64) -> io::Result<Location> {
        let in_block = offset & BLOCK_MASK;
        let mut block = offset & !BLOCK_MASK;
        let mut limit = BLOCK_SIZE - in_block;
        let mut hops = 0u32;
        let mut index = store;

        loop {
            let tree = match self.trees.get(index) {
                Some(t) => t,
                None => {
                    return Ok(Location {
                        volume_offset: block + in_block,
                        len: limit,
                        origin: Origin::Volume,
                        hops,
                    })
                }
            };

            if let Some(entry) = tree.get(block) {
                if let Some(ov) = entry.overlay {
                    let sector = in_block / SECTOR_SIZE;
                    let (set, run) = bitmap_run(ov.bitmap, sector);
                    limit = limit.min((sector + run) * SECTOR_SIZE - in_block);
                    if set {
                        return Ok(Location {
                            volume_offset: data_offset(ov.offset, in_block)?,
                            len: limit,
                            origin: Origin::Overlay,
                            hops,
                        });
                    }
                }
                if let Some(d) = entry.descriptor {
                    if d.is_forwarder() {
                        block = d.relative_offset;
                        hops += 1;
                        index += 1;
                        continue;
                    }
                    return Ok(Location {
                        volume_offset: data_offset(d.offset, in_block)?,
                        len: limit,
                        origin: Origin::Copy,
                        hops,
                    });
                }
            }
            index += 1;
        }
    }

    /// Fill `buf` with bytes of `store` starting at logical `offset`.
    pub fn read_store(&self, store: usize, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        check_range(offset, buf.len(), self.size())?;

        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let loc = self.locate(store, pos)?;
            let take = (loc.len as usize).min(buf.len() - done);
            trace!(
                "overlay: store {} @0x{:x} +{} -> {:?} @0x{:x} (hops={})",
                store,
                pos,
                take,
                loc.origin,
                loc.volume_offset,
                loc.hops
            );
            self.volume.fetch(loc.volume_offset, &mut buf[done..done + take])?;

            for _ in 0..loc.hops {
                record_forwarder_hop();
            }
            match loc.origin {
                Origin::Overlay => record_overlay_sector_read(),
                Origin::Copy => record_copied_block_read(),
                Origin::Volume => record_passthrough_read(),
            }
            done += take;
        }
        Ok(())
    }
}

/// One store of a chain seen as a BlockSource.
pub struct StoreView<V> {
    chain: Arc<OverlayChain<V>>,
    index: usize,
}

impl<V> Clone for StoreView<V> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            index: self.index,
        }
    }
}

impl<V: BlockSource> StoreView<V> {
    pub fn new(chain: Arc<OverlayChain<V>>, index: usize) -> Self {
        Self { chain, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<V: BlockSource> BlockSource for StoreView<V> {
    fn size(&self) -> u64 {
        self.chain.size()
    }

    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.chain.read_store(self.index, offset, buf)
    }
}
