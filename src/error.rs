//! Typed errors for stream, overlay and catalog operations.
//!
//! Callers match on the variant instead of treating every failure alike:
//! an out-of-bounds seek and a failed block fetch are different outcomes.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Seek target or positional offset outside `[0, size]`.
    #[error("offset {offset} out of bounds (store size {size})")]
    OutOfBounds { offset: i128, size: u64 },

    /// The block source could not supply the requested range.
    #[error("unable to read {length} bytes at offset {offset}: {source}")]
    Io {
        offset: u64,
        length: usize,
        #[source]
        source: io::Error,
    },

    /// Malformed block descriptor or block list.
    #[error("invalid block data: {0}")]
    Format(String),

    #[error("store {index} not found (volume has {count} stores)")]
    StoreNotFound { index: usize, count: usize },

    #[error(transparent)]
    Manifest(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn out_of_bounds(offset: impl Into<i128>, size: u64) -> Self {
        StoreError::OutOfBounds {
            offset: offset.into(),
            size,
        }
    }

    pub(crate) fn io(offset: u64, length: usize, source: io::Error) -> Self {
        StoreError::Io {
            offset,
            length,
            source,
        }
    }

    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, StoreError::OutOfBounds { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        let oob = StoreError::out_of_bounds(-1i64, 10);
        assert!(oob.is_out_of_bounds());
        assert!(!oob.is_io());

        let io = StoreError::io(5, 3, io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(io.is_io());
        assert!(!io.is_out_of_bounds());
        assert!(io.to_string().contains("offset 5"));
    }
}
