//! check — the read-contract self test run against every store.
//!
//! Cases (each executed twice, reads in chunks of 4096):
//! 0. full read:        seek(0)          read(size)      -> offset 0, size bytes
//! 1. partial window:   seek(size/7)     read(size/2)    -> offset size/7, size/2 bytes
//! 2. tail boundary:    seek(size-1024)  read(4096)      -> 1024 bytes, or OutOfBounds when size < 1024
//! 3. positional tiles: read_buffer_at_offset from size/7 for size/2 bytes
//!                      -> final offset size/7 + size/2, size/2 bytes
//!
//! An Io failure never satisfies an OutOfBounds expectation.

use std::fmt;

use log::debug;

use crate::consts::DEFAULT_READ_CHUNK;
use crate::error::StoreError;
use crate::source::BlockSource;
use crate::stream::{StoreStream, Whence};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// For seek cases `offset` is the cursor after the seek; for positional
    /// cases it is the offset reached after the last chunk.
    Range { offset: u64, size: u64 },
    OutOfBounds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckKind {
    SeekAndRead { offset: i64, whence: Whence, size: u64 },
    ReadAtOffset { offset: u64, size: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckCase {
    pub kind: CheckKind,
    pub expect: Expectation,
}

impl fmt::Display for CheckCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CheckKind::SeekAndRead {
                offset,
                whence,
                size,
            } => write!(
                f,
                "reading buffer at offset: {}, whence: {} and size: {}",
                offset,
                whence.as_str(),
                size
            ),
            CheckKind::ReadAtOffset { offset, size } => {
                write!(f, "reading buffer at offset: {} and size: {}", offset, size)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckOutcome {
    pub case: CheckCase,
    pub passed: bool,
    /// Why it failed, or the expected error that was observed.
    pub detail: Option<String>,
}

/// The case list for a store of `size` bytes.
pub fn read_cases(size: u64) -> Vec<CheckCase> {
    let seventh = size / 7;
    let half = size / 2;

    let full = CheckCase {
        kind: CheckKind::SeekAndRead {
            offset: 0,
            whence: Whence::FromStart,
            size,
        },
        expect: Expectation::Range { offset: 0, size },
    };
    let window = CheckCase {
        kind: CheckKind::SeekAndRead {
            offset: seventh as i64,
            whence: Whence::FromStart,
            size: half,
        },
        expect: Expectation::Range {
            offset: seventh,
            size: half,
        },
    };
    let tail = CheckCase {
        kind: CheckKind::SeekAndRead {
            offset: size as i64 - 1024,
            whence: Whence::FromStart,
            size: 4096,
        },
        expect: if size < 1024 {
            Expectation::OutOfBounds
        } else {
            Expectation::Range {
                offset: size - 1024,
                size: 1024,
            }
        },
    };
    let tiles = CheckCase {
        kind: CheckKind::ReadAtOffset {
            offset: seventh,
            size: half,
        },
        expect: Expectation::Range {
            offset: seventh + half,
            size: half,
        },
    };

    let mut cases = Vec::with_capacity(8);
    for c in [full, window, tail, tiles] {
        cases.push(c);
        cases.push(c);
    }
    cases
}

/// Observed (offset, bytes read) of one case.
fn execute<S: BlockSource>(
    stream: &mut StoreStream<S>,
    kind: CheckKind,
) -> Result<(u64, u64), StoreError> {
    match kind {
        CheckKind::SeekAndRead {
            offset,
            whence,
            size,
        } => {
            stream.seek(offset, whence)?;
            let result_offset = stream.get_offset();
            let mut remaining = size;
            let mut total = 0u64;
            while remaining > 0 {
                let want = remaining.min(DEFAULT_READ_CHUNK as u64) as usize;
                let got = stream.read(want)?.len();
                remaining -= got as u64;
                total += got as u64;
                if got != want {
                    break;
                }
            }
            Ok((result_offset, total))
        }
        CheckKind::ReadAtOffset { offset, size } => {
            let mut at = offset;
            let mut remaining = size;
            let mut total = 0u64;
            // at least one call, so the cursor check below holds for empty ranges
            loop {
                let want = remaining.min(DEFAULT_READ_CHUNK as u64) as usize;
                let got = stream.read_buffer_at_offset(want, at)?.len();
                at += got as u64;
                remaining -= got as u64;
                total += got as u64;
                if remaining == 0 || got != want {
                    break;
                }
            }
            if stream.get_offset() != at {
                return Err(StoreError::Format(format!(
                    "cursor {} does not follow positional reads ending at {}",
                    stream.get_offset(),
                    at
                )));
            }
            Ok((at, total))
        }
    }
}

pub fn run_case<S: BlockSource>(stream: &mut StoreStream<S>, case: CheckCase) -> CheckOutcome {
    let observed = execute(stream, case.kind);
    let (passed, detail) = match (case.expect, observed) {
        (Expectation::Range { offset, size }, Ok((got_off, got_size))) => {
            if got_off != offset {
                (false, Some(format!("unexpected offset: {}", got_off)))
            } else if got_size != size {
                (false, Some(format!("unexpected read count: {}", got_size)))
            } else {
                (true, None)
            }
        }
        (Expectation::Range { .. }, Err(e)) => (false, Some(e.to_string())),
        (Expectation::OutOfBounds, Err(e)) if e.is_out_of_bounds() => (true, Some(e.to_string())),
        (Expectation::OutOfBounds, Err(e)) => {
            (false, Some(format!("expected out of bounds, got: {}", e)))
        }
        (Expectation::OutOfBounds, Ok((got_off, got_size))) => (
            false,
            Some(format!(
                "expected out of bounds, got offset {} and {} bytes",
                got_off, got_size
            )),
        ),
    };
    debug!(
        "check: {} -> {}",
        case,
        if passed { "PASS" } else { "FAIL" }
    );
    CheckOutcome {
        case,
        passed,
        detail,
    }
}

/// Run every case of `read_cases(stream.size())` in order.
pub fn run_read_checks<S: BlockSource>(stream: &mut StoreStream<S>) -> Vec<CheckOutcome> {
    read_cases(stream.size())
        .into_iter()
        .map(|case| run_case(stream, case))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemSource;

    #[test]
    fn cases_for_small_store_expect_out_of_bounds_tail() {
        let cases = read_cases(1000);
        assert_eq!(cases.len(), 8);
        assert_eq!(cases[4].expect, Expectation::OutOfBounds);
        assert_eq!(cases[4], cases[5]);
        assert_eq!(
            cases[6].expect,
            Expectation::Range {
                offset: 142 + 500,
                size: 500
            }
        );
    }

    #[test]
    fn all_cases_pass_on_memory_store() {
        for size in [0usize, 1, 1023, 1024, 1025, 9000, 70_001] {
            let mut s = StoreStream::new(MemSource::new(vec![0xA5u8; size]));
            for o in run_read_checks(&mut s) {
                assert!(o.passed, "size {}: {} -> {:?}", size, o.case, o.detail);
            }
        }
    }

    #[test]
    fn wrong_expectation_fails() {
        let mut s = StoreStream::new(MemSource::new(vec![0u8; 100]));
        let case = CheckCase {
            kind: CheckKind::SeekAndRead {
                offset: 10,
                whence: Whence::FromStart,
                size: 50,
            },
            expect: Expectation::OutOfBounds,
        };
        let o = run_case(&mut s, case);
        assert!(!o.passed);
        assert!(o.detail.unwrap().contains("expected out of bounds"));
    }

    #[test]
    fn description_matches_case() {
        let c = read_cases(7000)[2];
        assert_eq!(
            c.to_string(),
            "reading buffer at offset: 1000, whence: SEEK_SET and size: 3500"
        );
    }
}
