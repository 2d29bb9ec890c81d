//! source — providers of logical bytes for stores and volumes.
//!
//! - BlockSource: the "fetch [offset, offset+len)" contract every reader consumes.
//! - MemSource: owned bytes (tests, small images).
//! - FileSource: read-only image file, positional reads under a mutex.
//! - CachedSource (cache.rs): block-granular LRU in front of another source.
//!
//! fetch() fills the whole buffer or fails. A range past size() is UnexpectedEof,
//! never a short read.

mod cache;

pub use cache::CachedSource;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Read-only byte provider with a fixed size.
pub trait BlockSource: Send + Sync {
    /// Total logical size in bytes.
    fn size(&self) -> u64;

    /// Fill `buf` with bytes `[offset, offset + buf.len())`.
    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
}

impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).fetch(offset, buf)
    }
}

impl<T: BlockSource + ?Sized> BlockSource for Box<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).fetch(offset, buf)
    }
}

/// Shared range check: `[offset, offset+len)` must lie within `[0, size]`.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> io::Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {}+{} beyond source size {}", offset, len, size),
        )),
    }
}

// ----------------------------- MemSource -----------------------------

/// Owned in-memory bytes.
#[derive(Clone, Debug, Default)]
pub struct MemSource {
    data: Vec<u8>,
}

impl MemSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for MemSource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl BlockSource for MemSource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        check_range(offset, buf.len(), self.size())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

// ----------------------------- FileSource -----------------------------

/// Read-only image file, or a window of one starting at `base`. Seek+read happen
/// under one lock, so a single FileSource can back many independent streams.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
    base: u64,
    size: u64,
}

impl FileSource {
    /// Open an image; size is taken from file metadata.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_at(path, 0, None)
    }

    /// Open a volume that starts `offset` bytes into the image. Without an
    /// explicit size it runs to the end of the file. A size past the end of the
    /// file makes the tail unreadable, which surfaces as an I/O error on fetch.
    pub fn open_at(path: &Path, offset: u64, size: Option<u64>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let size = match size {
            Some(n) => n,
            None => {
                let len = file.metadata()?.len();
                len.checked_sub(offset).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("volume offset {} beyond image length {}", offset, len),
                    )
                })?
            }
        };
        offset.checked_add(size).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("volume offset {} + size {} overflows", offset, size),
            )
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            base: offset,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Image offset of volume byte 0.
    pub fn base(&self) -> u64 {
        self.base
    }
}

impl BlockSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        check_range(offset, buf.len(), self.size)?;
        let mut f = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "file source lock poisoned"))?;
        // base + size was checked at open
        f.seek(SeekFrom::Start(self.base + offset))?;
        f.read_exact(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_source_exact_and_eof() {
        let src = MemSource::new((0u8..100).collect());
        let mut buf = [0u8; 10];
        src.fetch(90, &mut buf).unwrap();
        assert_eq!(buf[0], 90);
        assert_eq!(buf[9], 99);

        let err = src.fetch(95, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        // empty fetch at end is fine
        src.fetch(100, &mut []).unwrap();
    }

    #[test]
    fn file_source_window() {
        let path = std::env::temp_dir().join(format!(
            "vshadow-src-window-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let data: Vec<u8> = (0u8..200).collect();
        std::fs::write(&path, &data).unwrap();

        let src = FileSource::open_at(&path, 50, None).unwrap();
        assert_eq!((src.base(), src.size()), (50, 150));
        let mut b = [0u8; 3];
        src.fetch(0, &mut b).unwrap();
        assert_eq!(b, [50, 51, 52]);
        assert!(src.fetch(148, &mut b).is_err());

        let sized = FileSource::open_at(&path, 100, Some(10)).unwrap();
        assert_eq!(sized.size(), 10);
        sized.fetch(7, &mut b).unwrap();
        assert_eq!(b, [107, 108, 109]);

        let err = FileSource::open_at(&path, 201, None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn check_range_overflow() {
        assert!(check_range(u64::MAX, 2, u64::MAX).is_err());
        assert!(check_range(0, 0, 0).is_ok());
    }

    #[test]
    fn arc_and_box_forward() {
        let src: Arc<dyn BlockSource> = Arc::new(MemSource::new(vec![7u8; 16]));
        assert_eq!(src.size(), 16);
        let boxed: Box<dyn BlockSource> = Box::new(MemSource::new(vec![1, 2, 3]));
        let mut b = [0u8; 2];
        boxed.fetch(1, &mut b).unwrap();
        assert_eq!(b, [2, 3]);
    }
}
