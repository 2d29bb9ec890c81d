//! Lightweight global metrics for store readers.
//!
//! Thread-safe relaxed atomic counters for:
//! - StoreStream (reads, bytes, seeks, failures)
//! - Block cache
//! - Overlay resolution (where the bytes came from)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Stream -----
static STREAM_READS: AtomicU64 = AtomicU64::new(0);
static STREAM_BYTES_READ: AtomicU64 = AtomicU64::new(0);
static STREAM_SEEKS: AtomicU64 = AtomicU64::new(0);
static OUT_OF_BOUNDS_ERRORS: AtomicU64 = AtomicU64::new(0);
static IO_ERRORS: AtomicU64 = AtomicU64::new(0);

// ----- Block cache -----
static BLOCK_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static BLOCK_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);

// ----- Overlay -----
static OVERLAY_SECTOR_READS: AtomicU64 = AtomicU64::new(0);
static COPIED_BLOCK_READS: AtomicU64 = AtomicU64::new(0);
static FORWARDER_HOPS: AtomicU64 = AtomicU64::new(0);
static PASSTHROUGH_READS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Stream
    pub stream_reads: u64,
    pub stream_bytes_read: u64,
    pub stream_seeks: u64,
    pub out_of_bounds_errors: u64,
    pub io_errors: u64,

    // Block cache
    pub block_cache_hits: u64,
    pub block_cache_misses: u64,

    // Overlay
    pub overlay_sector_reads: u64,
    pub copied_block_reads: u64,
    pub forwarder_hops: u64,
    pub passthrough_reads: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.block_cache_hits + self.block_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.block_cache_hits as f64 / total as f64
        }
    }
}

// ----- Recorders (Stream) -----
pub fn record_stream_read(bytes: usize) {
    STREAM_READS.fetch_add(1, Ordering::Relaxed);
    STREAM_BYTES_READ.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn record_stream_seek() {
    STREAM_SEEKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_out_of_bounds() {
    OUT_OF_BOUNDS_ERRORS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_io_error() {
    IO_ERRORS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Block cache) -----
pub fn record_cache_hit() {
    BLOCK_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cache_miss() {
    BLOCK_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Overlay) -----
pub fn record_overlay_sector_read() {
    OVERLAY_SECTOR_READS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_copied_block_read() {
    COPIED_BLOCK_READS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_forwarder_hop() {
    FORWARDER_HOPS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_passthrough_read() {
    PASSTHROUGH_READS.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        stream_reads: STREAM_READS.load(Ordering::Relaxed),
        stream_bytes_read: STREAM_BYTES_READ.load(Ordering::Relaxed),
        stream_seeks: STREAM_SEEKS.load(Ordering::Relaxed),
        out_of_bounds_errors: OUT_OF_BOUNDS_ERRORS.load(Ordering::Relaxed),
        io_errors: IO_ERRORS.load(Ordering::Relaxed),

        block_cache_hits: BLOCK_CACHE_HITS.load(Ordering::Relaxed),
        block_cache_misses: BLOCK_CACHE_MISSES.load(Ordering::Relaxed),

        overlay_sector_reads: OVERLAY_SECTOR_READS.load(Ordering::Relaxed),
        copied_block_reads: COPIED_BLOCK_READS.load(Ordering::Relaxed),
        forwarder_hops: FORWARDER_HOPS.load(Ordering::Relaxed),
        passthrough_reads: PASSTHROUGH_READS.load(Ordering::Relaxed),
    }
}
