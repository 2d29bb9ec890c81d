use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::ReaderConfig;
use crate::util::hex_dump;
use crate::volume::FileVolume;

pub fn cmd_read(
    manifest: &Path,
    cfg: &ReaderConfig,
    store: usize,
    offset: u64,
    size: u64,
    out: Option<&Path>,
) -> Result<()> {
    let volume = FileVolume::open_manifest(manifest, cfg)?;
    let mut stream = volume.store(store)?.open_stream();

    let size = usize::try_from(size).context("read size does not fit in memory")?;
    let data = stream.read_buffer_at_offset(size, offset)?;

    match out {
        Some(path) => {
            std::fs::write(path, &data)
                .with_context(|| format!("write {}", path.display()))?;
            println!(
                "Wrote {} bytes of store {} at offset {} to {}",
                data.len(),
                store,
                offset,
                path.display()
            );
        }
        None => {
            if !data.is_empty() {
                println!("{}", hex_dump(&data, offset));
            }
            println!("({} bytes)", data.len());
        }
    }
    Ok(())
}

pub fn cmd_export(manifest: &Path, cfg: &ReaderConfig, store: usize, out: &Path) -> Result<()> {
    let volume = FileVolume::open_manifest(manifest, cfg)?;
    let mut stream = volume.store(store)?.open_stream();

    let file = File::create(out).with_context(|| format!("create {}", out.display()))?;
    let mut w = BufWriter::new(file);
    let mut written = 0u64;
    loop {
        let chunk = stream
            .read(cfg.read_chunk)
            .with_context(|| format!("read store {} at offset {}", store, stream.get_offset()))?;
        if chunk.is_empty() {
            break;
        }
        w.write_all(&chunk)?;
        written += chunk.len() as u64;
    }
    w.flush()?;

    info!("export: store {} -> {} ({} bytes)", store, out.display(), written);
    println!("Exported {} bytes of store {} to {}", written, store, out.display());
    Ok(())
}
