//! util — small shared helpers.
//!
//! - filetime_to_unix_secs(): FILETIME (100ns since 1601) -> Unix seconds.
//! - parse_offset(): integers with 0x/0o/0b prefixes for CLI offsets.
//! - hex_dump(): 16 bytes per line with a running offset column.

use crate::consts::FILETIME_UNIX_EPOCH_DELTA;

/// None for FILETIMEs before 1970 (including the unset value 0).
#[inline]
pub fn filetime_to_unix_secs(filetime: u64) -> Option<u64> {
    filetime
        .checked_sub(FILETIME_UNIX_EPOCH_DELTA)
        .map(|t| t / 10_000_000)
}

pub fn parse_offset(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    if let Some(x) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(x, 16).map_err(|e| e.to_string())
    } else if let Some(x) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        u64::from_str_radix(x, 8).map_err(|e| e.to_string())
    } else if let Some(x) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(x, 2).map_err(|e| e.to_string())
    } else {
        s.parse::<u64>().map_err(|e| e.to_string())
    }
}

/// `base` is the logical offset of bytes[0].
pub fn hex_dump(bytes: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{:08x}:", base + (line * 16) as u64));
        for b in chunk {
            out.push_str(&format!(" {:02x}", b));
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  ");
        for &b in chunk {
            out.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' });
        }
    }
    out
}
