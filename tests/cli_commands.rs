// Tool commands over a manifest on disk (stdout is not inspected, only results and files).
// Run only this file:
//   cargo test --test cli_commands -- --nocapture

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use oorandom::Rand32;

use vshadow::cli::admin::{cmd_blocks, cmd_check, cmd_info};
use vshadow::cli::read::{cmd_export, cmd_read};
use vshadow::consts::BLOCK_SIZE;
use vshadow::{BlockDescriptor, FileVolume, Manifest, ReaderConfig, StoreInfo, StoreManifest};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("vshadow-cli-{prefix}-{pid}-{t}-{id}"))
}

fn make_manifest(root: &Path, blocks: Vec<BlockDescriptor>) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let mut rng = Rand32::new(3);
    let image: Vec<u8> = (0..6 * BLOCK_SIZE).map(|_| rng.rand_u32() as u8).collect();
    fs::write(root.join("disk.img"), &image)?;

    let manifest = Manifest {
        image: PathBuf::from("disk.img"),
        offset: None,
        size: None,
        stores: vec![
            StoreManifest {
                info: StoreInfo {
                    identifier: uuid::Uuid::from_u128(1),
                    ..Default::default()
                },
                blocks,
                block_list: None,
            },
            StoreManifest::default(),
        ],
    };
    let path = root.join("vss.json");
    manifest.save(&path)?;
    Ok(path)
}

#[test]
fn info_and_blocks_run_ok() -> Result<()> {
    let root = unique_root("info");
    let manifest = make_manifest(
        &root,
        vec![
            BlockDescriptor::copy(0, 5 * BLOCK_SIZE),
            BlockDescriptor::overlay(BLOCK_SIZE, 4 * BLOCK_SIZE, 0xFFFF_0000),
        ],
    )?;
    let cfg = ReaderConfig::default();

    cmd_info(&manifest, &cfg, false)?;
    cmd_info(&manifest, &cfg, true)?;
    cmd_blocks(&manifest, &cfg, 0, false)?;
    cmd_blocks(&manifest, &cfg, 0, true)?;
    assert!(cmd_blocks(&manifest, &cfg, 5, false).is_err());

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn read_and_export_write_store_bytes() -> Result<()> {
    let root = unique_root("read-export");
    let manifest = make_manifest(&root, vec![BlockDescriptor::copy(BLOCK_SIZE, 5 * BLOCK_SIZE)])?;
    let cfg = ReaderConfig::default().with_read_chunk(1000);

    let volume = FileVolume::open_manifest(&manifest, &cfg)?;
    let mut expected = Vec::new();
    volume.store(0)?.open_stream().read_to_end(&mut expected)?;

    let part = root.join("part.bin");
    cmd_read(&manifest, &cfg, 0, BLOCK_SIZE - 10, 30, Some(&part))?;
    let got = fs::read(&part)?;
    let start = (BLOCK_SIZE - 10) as usize;
    assert_eq!(got, expected[start..start + 30].to_vec());

    // hex dump to stdout, clamped at the end of the store
    cmd_read(&manifest, &cfg, 0, 6 * BLOCK_SIZE - 4, 64, None)?;
    // positional offset past the end is rejected
    assert!(cmd_read(&manifest, &cfg, 0, 6 * BLOCK_SIZE + 1, 1, None).is_err());

    let out = root.join("store0.raw");
    cmd_export(&manifest, &cfg, 0, &out)?;
    assert_eq!(fs::read(&out)?, expected);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn check_passes_on_consistent_volume_and_fails_on_short_image() -> Result<()> {
    let root = unique_root("check");
    let manifest = make_manifest(&root, vec![BlockDescriptor::copy(0, 2 * BLOCK_SIZE)])?;
    let cfg = ReaderConfig::default();
    cmd_check(&manifest, &cfg)?;

    // the image is shorter than the declared size: the tail is unreadable
    let mut m = Manifest::load(&manifest)?;
    m.size = Some(7 * BLOCK_SIZE);
    m.save(&manifest)?;
    assert!(cmd_check(&manifest, &cfg).is_err());

    fs::remove_dir_all(&root).ok();
    Ok(())
}
