// Core types
pub mod consts;
pub mod error;
pub mod config;
pub mod metrics;

// Block descriptors and per-store trees
pub mod block;   // src/block/{mod,tree}.rs

// Byte sources: memory, image file, block cache
pub mod source;  // src/source/{mod,cache}.rs

// Store resolution across the chain of stores
pub mod overlay; // src/overlay/mod.rs

// Seekable stream over one store
pub mod stream;

// Volume, store handles, JSON manifest
pub mod volume;  // src/volume/{mod,manifest}.rs

// Read-contract checks
pub mod check;

pub mod util;    // src/util/mod.rs
pub mod cli;     // src/cli/{mod,admin,read}.rs

pub use block::{BlockDescriptor, BlockTree};
pub use config::ReaderConfig;
pub use error::{Result, StoreError};
pub use overlay::{OverlayChain, StoreView};
pub use source::{BlockSource, CachedSource, FileSource, MemSource};
pub use stream::{StoreStream, Whence};
pub use volume::{FileVolume, Manifest, Store, StoreInfo, StoreManifest, Volume};
