//! Block cache and a caching BlockSource wrapper.
//!
//! BlockCache keeps up to `cap` blocks keyed by block index. Every hit or insert
//! stamps the block with a fresh tick; `order` maps tick -> block, so its first
//! key is always the least recently used block.
//!
//! Notes:
//! - The final block of a source may be shorter than BLOCK_SIZE; entries keep their real length.
//! - Capacity=0 disables the cache (CachedSource then forwards every fetch).
//! - A block that cannot be read whole (image shorter than the declared size) is
//!   served straight from the inner source and never cached.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Mutex;

use log::trace;

use crate::consts::BLOCK_SIZE;
use crate::metrics::{record_cache_hit, record_cache_miss};

use super::{check_range, BlockSource};

struct CachedBlock {
    data: Vec<u8>,
    stamp: u64,
}

pub(crate) struct BlockCache {
    cap: usize,
    tick: u64,
    blocks: HashMap<u64, CachedBlock>,
    order: BTreeMap<u64, u64>,
}

impl BlockCache {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            tick: 0,
            blocks: HashMap::with_capacity(cap.max(1)),
            order: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Copy `out.len()` bytes starting at `in_block` of a cached block.
    /// Returns false on miss or when the cached block is too short.
    pub(crate) fn get(&mut self, index: u64, in_block: usize, out: &mut [u8]) -> bool {
        let stamp = self.next_stamp();
        let Some(block) = self.blocks.get_mut(&index) else {
            return false;
        };
        let end = in_block + out.len();
        if end > block.data.len() {
            return false;
        }
        out.copy_from_slice(&block.data[in_block..end]);
        self.order.remove(&block.stamp);
        block.stamp = stamp;
        self.order.insert(stamp, index);
        true
    }

    pub(crate) fn put(&mut self, index: u64, data: &[u8]) {
        if self.cap == 0 {
            return;
        }
        let stamp = self.next_stamp();
        if let Some(block) = self.blocks.get_mut(&index) {
            block.data.clear();
            block.data.extend_from_slice(data);
            self.order.remove(&block.stamp);
            block.stamp = stamp;
            self.order.insert(stamp, index);
            return;
        }

        while self.blocks.len() >= self.cap {
            match self.order.pop_first() {
                Some((_, victim)) => {
                    self.blocks.remove(&victim);
                }
                None => break,
            }
        }
        self.blocks.insert(
            index,
            CachedBlock {
                data: data.to_vec(),
                stamp,
            },
        );
        self.order.insert(stamp, index);
    }

    fn next_stamp(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Block-granular caching wrapper. Misses fetch the whole containing block
/// from the inner source, falling back to the requested range when the block
/// runs past the real end of the data.
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<BlockCache>,
    enabled: bool,
}

impl<S: BlockSource> CachedSource<S> {
    pub fn new(inner: S, capacity_blocks: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(BlockCache::new(capacity_blocks)),
            enabled: capacity_blocks > 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of blocks currently cached.
    pub fn cached_blocks(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn fetch_block(&self, index: u64, in_block: usize, out: &mut [u8]) -> io::Result<()> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "block cache lock poisoned"))?;
        if cache.get(index, in_block, out) {
            record_cache_hit();
            return Ok(());
        }
        record_cache_miss();

        let start = index * BLOCK_SIZE;
        let len = BLOCK_SIZE.min(self.inner.size() - start) as usize;
        let mut block = vec![0u8; len];
        match self.inner.fetch(start, &mut block) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                trace!("block cache: block {} is short ({}), reading range directly", index, e);
                return self.inner.fetch(start + in_block as u64, out);
            }
            Err(e) => return Err(e),
        }
        out.copy_from_slice(&block[in_block..in_block + out.len()]);
        cache.put(index, &block);
        trace!("block cache: loaded block {} ({} B)", index, len);
        Ok(())
    }
}

impl<S: BlockSource> BlockSource for CachedSource<S> {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if !self.enabled {
            return self.inner.fetch(offset, buf);
        }
        check_range(offset, buf.len(), self.inner.size())?;

        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let index = pos / BLOCK_SIZE;
            let in_block = (pos % BLOCK_SIZE) as usize;
            let take = (BLOCK_SIZE as usize - in_block).min(buf.len() - done);
            self.fetch_block(index, in_block, &mut buf[done..done + take])?;
            done += take;
        }
        Ok(())
    }
}
