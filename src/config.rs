//! Centralized configuration for store readers.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - ReaderConfig::from_env() reads VSHADOW_* variables; builder-style setters override them.
//!
//! Defaults:
//! - block_cache_blocks = 256 (16 KiB blocks, ~4 MiB per opened image)
//! - read_chunk = 4096 (chunk size used by the tool when streaming a store)
//! - strict_blocks = false (misaligned descriptors are skipped with a warning)

use std::fmt;

use crate::consts::{
    DEFAULT_BLOCK_CACHE_BLOCKS, DEFAULT_READ_CHUNK, ENV_BLOCK_CACHE_BLOCKS, ENV_READ_CHUNK,
    ENV_STRICT_BLOCKS,
};

/// Top-level configuration for opening volumes and reading stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Block cache size in 16 KiB blocks (0 disables).
    /// Env: VSHADOW_BLOCK_CACHE_BLOCKS (default 256)
    pub block_cache_blocks: usize,

    /// Chunk size for sequential streaming reads.
    /// Env: VSHADOW_READ_CHUNK (default 4096, 0 is ignored)
    pub read_chunk: usize,

    /// Reject misaligned block descriptors instead of skipping them.
    /// Env: VSHADOW_STRICT_BLOCKS = 0|1|true|false (default false)
    pub strict_blocks: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            block_cache_blocks: DEFAULT_BLOCK_CACHE_BLOCKS,
            read_chunk: DEFAULT_READ_CHUNK,
            strict_blocks: false,
        }
    }
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

impl ReaderConfig {
    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var(ENV_BLOCK_CACHE_BLOCKS) {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.block_cache_blocks = n;
            }
        }

        if let Ok(v) = std::env::var(ENV_READ_CHUNK) {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.read_chunk = n;
                }
            }
        }

        if let Ok(v) = std::env::var(ENV_STRICT_BLOCKS) {
            cfg.strict_blocks = env_flag(&v);
        }

        cfg
    }

    pub fn with_block_cache_blocks(mut self, blocks: usize) -> Self {
        self.block_cache_blocks = blocks;
        self
    }

    pub fn with_read_chunk(mut self, chunk: usize) -> Self {
        self.read_chunk = chunk.max(1);
        self
    }

    pub fn with_strict_blocks(mut self, on: bool) -> Self {
        self.strict_blocks = on;
        self
    }
}

impl fmt::Display for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReaderConfig {{ block_cache_blocks: {}, read_chunk: {}, strict_blocks: {} }}",
            self.block_cache_blocks, self.read_chunk, self.strict_blocks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = ReaderConfig::default()
            .with_block_cache_blocks(0)
            .with_read_chunk(0)
            .with_strict_blocks(true);
        assert_eq!(cfg.block_cache_blocks, 0);
        // zero chunk would stall streaming
        assert_eq!(cfg.read_chunk, 1);
        assert!(cfg.strict_blocks);
        assert!(cfg.to_string().contains("strict_blocks: true"));
    }

    #[test]
    fn env_flag_values() {
        assert!(env_flag(" ON "));
        assert!(env_flag("1"));
        assert!(!env_flag("0"));
        assert!(!env_flag("nope"));
    }
}
