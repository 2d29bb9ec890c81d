//! Общие константы: геометрия блоков, формат block list, ENV-ключи.

// -------- Block geometry --------
pub const BLOCK_SIZE: u64 = 0x4000;
pub const BLOCK_MASK: u64 = BLOCK_SIZE - 1;
pub const SECTOR_SIZE: u64 = 512;
pub const SECTORS_PER_BLOCK: u64 = BLOCK_SIZE / SECTOR_SIZE; // 32, one bitmap bit per sector

// -------- Block descriptor flags --------
pub const FLAG_FORWARDER: u32 = 0x0000_0001;
pub const FLAG_OVERLAY: u32 = 0x0000_0002;
pub const FLAG_NOT_USED: u32 = 0x0000_0004;

// -------- Block list entry --------
// [original_offset u64][relative_offset u64][offset u64][flags u32][bitmap u32]
pub const BLOCK_LIST_ENTRY_SIZE: usize = 32;

// -------- Reads --------
pub const DEFAULT_READ_CHUNK: usize = 4096;
pub const DEFAULT_BLOCK_CACHE_BLOCKS: usize = 256;

// -------- ENV --------
pub const ENV_BLOCK_CACHE_BLOCKS: &str = "VSHADOW_BLOCK_CACHE_BLOCKS";
pub const ENV_READ_CHUNK: &str = "VSHADOW_READ_CHUNK";
pub const ENV_STRICT_BLOCKS: &str = "VSHADOW_STRICT_BLOCKS";

// -------- FILETIME --------
// 100ns ticks between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_EPOCH_DELTA: u64 = 116_444_736_000_000_000;
