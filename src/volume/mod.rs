//! volume — the catalog of stores over one volume source.
//!
//! - Volume: volume source + store records; builds the shared OverlayChain.
//! - Store: handle to one store (metadata, block descriptors, streams).
//! - manifest.rs: JSON manifest describing an image file and its stores.
//!
//! Every store has the logical size of the volume. StoreInfo::volume_size is
//! the size recorded for the store itself and is reported, not enforced.

mod manifest;

pub use manifest::{FileVolume, Manifest, StoreManifest};

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{BlockDescriptor, BlockTree};
use crate::config::ReaderConfig;
use crate::error::{Result, StoreError};
use crate::overlay::{OverlayChain, StoreView};
use crate::source::BlockSource;
use crate::stream::StoreStream;
use crate::util::filetime_to_unix_secs;

/// Store metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    #[serde(default)]
    pub identifier: Uuid,
    #[serde(default)]
    pub copy_identifier: Uuid,
    #[serde(default)]
    pub copy_set_identifier: Uuid,
    /// FILETIME: 100ns ticks since 1601-01-01 UTC.
    #[serde(default)]
    pub creation_time: u64,
    #[serde(default)]
    pub attribute_flags: u32,
    /// Volume size as recorded for this store, if known.
    #[serde(default)]
    pub volume_size: Option<u64>,
}

impl StoreInfo {
    pub fn creation_unix_secs(&self) -> Option<u64> {
        filetime_to_unix_secs(self.creation_time)
    }
}

struct StoreRecord {
    info: StoreInfo,
    blocks: Vec<BlockDescriptor>,
}

pub struct Volume<V> {
    chain: Arc<OverlayChain<V>>,
    stores: Vec<Arc<StoreRecord>>,
}

impl<V: BlockSource> Volume<V> {
    /// Build a volume from its source and per-store (info, descriptors), oldest store first.
    pub fn new(
        volume: V,
        stores: Vec<(StoreInfo, Vec<BlockDescriptor>)>,
        cfg: &ReaderConfig,
    ) -> Result<Self> {
        let mut trees = Vec::with_capacity(stores.len());
        let mut records = Vec::with_capacity(stores.len());
        for (index, (info, blocks)) in stores.into_iter().enumerate() {
            let tree = BlockTree::from_descriptors(blocks.iter(), cfg.strict_blocks)?;
            debug!(
                "volume: store {} ({}) has {} descriptors over {} blocks",
                index,
                info.identifier,
                blocks.len(),
                tree.len()
            );
            trees.push(tree);
            records.push(Arc::new(StoreRecord { info, blocks }));
        }
        Ok(Self {
            chain: Arc::new(OverlayChain::new(volume, trees)),
            stores: records,
        })
    }

    pub fn size(&self) -> u64 {
        self.chain.size()
    }

    pub fn number_of_stores(&self) -> usize {
        self.stores.len()
    }

    pub fn chain(&self) -> &Arc<OverlayChain<V>> {
        &self.chain
    }

    pub fn store(&self, index: usize) -> Result<Store<V>> {
        let record = self.stores.get(index).ok_or(StoreError::StoreNotFound {
            index,
            count: self.stores.len(),
        })?;
        Ok(Store {
            index,
            record: Arc::clone(record),
            chain: Arc::clone(&self.chain),
        })
    }

    /// All stores, oldest first.
    pub fn stores(&self) -> impl Iterator<Item = Store<V>> + '_ {
        self.stores.iter().enumerate().map(move |(index, record)| Store {
            index,
            record: Arc::clone(record),
            chain: Arc::clone(&self.chain),
        })
    }
}

/// Handle to one store. Cheap to clone; streams opened from it are independent.
pub struct Store<V> {
    index: usize,
    record: Arc<StoreRecord>,
    chain: Arc<OverlayChain<V>>,
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            record: Arc::clone(&self.record),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<V: BlockSource> Store<V> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn info(&self) -> &StoreInfo {
        &self.record.info
    }

    pub fn identifier(&self) -> Uuid {
        self.record.info.identifier
    }

    /// Logical size of the store (the volume size).
    pub fn size(&self) -> u64 {
        self.chain.size()
    }

    /// Recorded volume size, falling back to the store size.
    pub fn volume_size(&self) -> u64 {
        self.record.info.volume_size.unwrap_or_else(|| self.size())
    }

    pub fn number_of_blocks(&self) -> usize {
        self.record.blocks.len()
    }

    pub fn block(&self, index: usize) -> Option<&BlockDescriptor> {
        self.record.blocks.get(index)
    }

    /// Descriptors in list order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockDescriptor> {
        self.record.blocks.iter()
    }

    pub fn view(&self) -> StoreView<V> {
        StoreView::new(Arc::clone(&self.chain), self.index)
    }

    /// New stream with its own cursor at 0.
    pub fn open_stream(&self) -> StoreStream<StoreView<V>> {
        StoreStream::new(self.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::BLOCK_SIZE;
    use crate::source::MemSource;
    use crate::stream::Whence;

    fn volume() -> Volume<MemSource> {
        let data: Vec<u8> = (0..4 * BLOCK_SIZE).map(|i| (i / BLOCK_SIZE) as u8).collect();
        let info = |n: u128| StoreInfo {
            identifier: Uuid::from_u128(n),
            creation_time: 132_000_000_000_000_000,
            ..Default::default()
        };
        Volume::new(
            MemSource::new(data),
            vec![
                (info(1), vec![BlockDescriptor::copy(0, 3 * BLOCK_SIZE)]),
                (info(2), vec![]),
            ],
            &ReaderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn store_lookup_and_metadata() {
        let v = volume();
        assert_eq!(v.number_of_stores(), 2);
        let s0 = v.store(0).unwrap();
        assert_eq!(s0.identifier(), Uuid::from_u128(1));
        assert_eq!(s0.number_of_blocks(), 1);
        assert_eq!(s0.block(0).unwrap().offset, 3 * BLOCK_SIZE);
        assert!(s0.block(1).is_none());
        assert_eq!(s0.size(), 4 * BLOCK_SIZE);
        assert_eq!(s0.volume_size(), 4 * BLOCK_SIZE);
        assert!(s0.info().creation_unix_secs().is_some());

        match v.store(2) {
            Err(StoreError::StoreNotFound { index, count }) => {
                assert_eq!((index, count), (2, 2));
            }
            _ => panic!("expected StoreNotFound"),
        }
    }

    #[test]
    fn streams_are_independent() {
        let v = volume();
        let stores: Vec<_> = v.stores().collect();
        let mut a = stores[0].open_stream();
        let mut b = stores[0].clone().open_stream();
        a.seek(10, Whence::FromStart).unwrap();
        assert_eq!(b.get_offset(), 0);
        assert_eq!(a.read(1).unwrap(), vec![3]);
        assert_eq!(b.read(1).unwrap(), vec![3]);

        // newer store sees the live block
        let mut c = stores[1].open_stream();
        assert_eq!(c.read(1).unwrap(), vec![0]);
    }

    #[test]
    fn strict_config_rejects_bad_descriptors() {
        let cfg = ReaderConfig::default().with_strict_blocks(true);
        let res = Volume::new(
            MemSource::new(vec![0u8; BLOCK_SIZE as usize]),
            vec![(StoreInfo::default(), vec![BlockDescriptor::copy(7, 0)])],
            &cfg,
        );
        assert!(matches!(res, Err(StoreError::Format(_))));
    }
}
