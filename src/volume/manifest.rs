//! Volume manifest (JSON).
//!
//! {
//!   "image": "volume.raw",            // relative to the manifest directory
//!   "offset": 1048576,                // optional, image offset of volume byte 0
//!   "size": 1073741824,               // optional, defaults to the image length minus offset
//!   "stores": [                       // oldest first
//!     {
//!       "identifier": "…uuid…", "copy_identifier": "…", "copy_set_identifier": "…",
//!       "creation_time": 132000000000000000, "attribute_flags": 0,
//!       "blocks": [ {"original_offset": 16384, "offset": 65536} ],
//!       "block_list": "store1.blocks"   // optional binary block list, read after inline blocks
//!     }
//!   ]
//! }

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::block::{read_block_list, BlockDescriptor};
use crate::config::ReaderConfig;
use crate::source::{BlockSource, CachedSource, FileSource};

use super::{StoreInfo, Volume};

/// A volume opened from an image file through the block cache.
pub type FileVolume = Volume<CachedSource<FileSource>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub image: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub stores: Vec<StoreManifest>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    #[serde(flatten)]
    pub info: StoreInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_list: Option<PathBuf>,
}

impl Manifest {
    pub fn from_json(s: &str) -> Result<Self, crate::error::StoreError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parse manifest {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("write manifest {}", path.display()))
    }

    /// Inline blocks followed by the block list file, if any.
    fn store_blocks(store: &StoreManifest, base: &Path) -> Result<Vec<BlockDescriptor>> {
        let mut blocks = store.blocks.clone();
        if let Some(list) = &store.block_list {
            blocks.extend(read_block_list(&base.join(list))?);
        }
        Ok(blocks)
    }
}

impl FileVolume {
    /// Open the image and stores described by a manifest file.
    pub fn open_manifest(path: &Path, cfg: &ReaderConfig) -> Result<Self> {
        let manifest = Manifest::load(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let image = base.join(&manifest.image);

        let file = FileSource::open_at(&image, manifest.offset.unwrap_or(0), manifest.size)
            .with_context(|| format!("open image {}", image.display()))?;
        let file_base = file.base();
        let source = CachedSource::new(file, cfg.block_cache_blocks);

        let mut stores = Vec::with_capacity(manifest.stores.len());
        for (i, sm) in manifest.stores.iter().enumerate() {
            let blocks = Manifest::store_blocks(sm, base)
                .with_context(|| format!("load blocks of store {}", i))?;
            stores.push((sm.info.clone(), blocks));
        }

        info!(
            "opened volume {} at offset {} ({} B, {} stores, {})",
            image.display(),
            file_base,
            source.size(),
            stores.len(),
            cfg
        );
        Ok(Volume::new(source, stores, cfg)?)
    }
}
