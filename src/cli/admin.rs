use anyhow::{anyhow, Result};
use log::info;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::block::BlockDescriptor;
use crate::check::run_read_checks;
use crate::config::ReaderConfig;
use crate::metrics;
use crate::volume::FileVolume;

#[derive(Serialize)]
struct StoreSummary {
    index: usize,
    identifier: Uuid,
    copy_identifier: Uuid,
    copy_set_identifier: Uuid,
    creation_time: u64,
    creation_unix_secs: Option<u64>,
    attribute_flags: u32,
    size: u64,
    volume_size: u64,
    blocks: usize,
}

#[derive(Serialize)]
struct VolumeSummary {
    image: String,
    size: u64,
    stores: Vec<StoreSummary>,
}

#[derive(Serialize)]
struct BlockRow<'a> {
    index: usize,
    kind: &'static str,
    #[serde(flatten)]
    descriptor: &'a BlockDescriptor,
}

fn summarize(volume: &FileVolume) -> VolumeSummary {
    let stores = volume
        .stores()
        .map(|s| {
            let i = s.info();
            StoreSummary {
                index: s.index(),
                identifier: i.identifier,
                copy_identifier: i.copy_identifier,
                copy_set_identifier: i.copy_set_identifier,
                creation_time: i.creation_time,
                creation_unix_secs: i.creation_unix_secs(),
                attribute_flags: i.attribute_flags,
                size: s.size(),
                volume_size: s.volume_size(),
                blocks: s.number_of_blocks(),
            }
        })
        .collect();
    VolumeSummary {
        image: volume.chain().volume().inner().path().display().to_string(),
        size: volume.size(),
        stores,
    }
}

pub fn cmd_info(manifest: &Path, cfg: &ReaderConfig, json: bool) -> Result<()> {
    let volume = FileVolume::open_manifest(manifest, cfg)?;
    let summary = summarize(&volume);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Volume {}", summary.image);
    println!("  size          = {} bytes", summary.size);
    println!("  stores        = {}", summary.stores.len());
    for s in &summary.stores {
        println!("Store {}", s.index);
        println!("  identifier    = {}", s.identifier);
        println!("  copy id       = {}", s.copy_identifier);
        println!("  copy set id   = {}", s.copy_set_identifier);
        match s.creation_unix_secs {
            Some(t) => println!("  created       = {} (unix {})", s.creation_time, t),
            None => println!("  created       = {}", s.creation_time),
        }
        println!("  attributes    = 0x{:08x}", s.attribute_flags);
        println!("  volume size   = {} bytes", s.volume_size);
        println!("  blocks        = {}", s.blocks);
    }
    Ok(())
}

pub fn cmd_blocks(manifest: &Path, cfg: &ReaderConfig, store: usize, json: bool) -> Result<()> {
    let volume = FileVolume::open_manifest(manifest, cfg)?;
    let store = volume.store(store)?;

    let rows: Vec<BlockRow> = store
        .blocks()
        .enumerate()
        .map(|(index, d)| BlockRow {
            index,
            kind: d.kind(),
            descriptor: d,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "Store {} ({}): {} descriptors",
        store.index(),
        store.identifier(),
        rows.len()
    );
    for r in &rows {
        let d = r.descriptor;
        println!(
            "{:6} {:9} original=0x{:012x} relative=0x{:012x} offset=0x{:012x} flags=0x{:x} bitmap=0x{:08x}",
            r.index, r.kind, d.original_offset, d.relative_offset, d.offset, d.flags, d.bitmap
        );
    }
    Ok(())
}

pub fn cmd_check(manifest: &Path, cfg: &ReaderConfig) -> Result<()> {
    let volume = FileVolume::open_manifest(manifest, cfg)?;
    let mut total = 0usize;
    let mut failed = 0usize;

    for store in volume.stores() {
        let mut stream = store.open_stream();
        println!("Store {} ({} bytes)", store.index(), stream.size());
        for outcome in run_read_checks(&mut stream) {
            total += 1;
            let verdict = if outcome.passed { "PASS" } else { "FAIL" };
            match (&outcome.detail, outcome.passed) {
                (Some(d), false) => println!("  {}: {} ({})", outcome.case, verdict, d),
                _ => println!("  {}: {}", outcome.case, verdict),
            }
            if !outcome.passed {
                failed += 1;
            }
        }
    }

    let m = metrics::snapshot();
    info!(
        "check: {} cases, {} failed (overlay={}, copied={}, passthrough={}, hops={}, cache hit ratio {:.2})",
        total,
        failed,
        m.overlay_sector_reads,
        m.copied_block_reads,
        m.passthrough_reads,
        m.forwarder_hops,
        m.cache_hit_ratio()
    );
    if failed > 0 {
        return Err(anyhow!("{} of {} read checks failed", failed, total));
    }
    println!("OK: {} read checks passed", total);
    Ok(())
}
