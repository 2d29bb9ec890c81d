//! Command line for the `vshadow` tool.
//!
//! Every subcommand takes --manifest PATH (see volume/manifest.rs).
//! Store-level work lives in admin.rs (info, blocks, check) and read.rs (read, export).

pub mod admin;
pub mod read;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ReaderConfig;
use crate::util::parse_offset;

#[derive(Parser, Debug)]
#[command(
    name = "vshadow",
    version,
    about = "Read Volume Shadow Copy stores over a copy-on-write block overlay",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Volume size and per-store metadata.
    Info {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Block descriptors of one store.
    Blocks {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        store: usize,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Positional read; hex dump to stdout unless --out is given.
    Read {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        store: usize,
        /// Decimal or 0x/0o/0b prefixed.
        #[arg(long, value_parser = parse_offset)]
        offset: u64,
        #[arg(long, value_parser = parse_offset)]
        size: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a whole store to a file.
    Export {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        store: usize,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the read checks on every store; fails if any case fails.
    Check {
        #[arg(long)]
        manifest: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = ReaderConfig::from_env();
    match cli.cmd {
        Cmd::Info { manifest, json } => admin::cmd_info(&manifest, &cfg, json),
        Cmd::Blocks {
            manifest,
            store,
            json,
        } => admin::cmd_blocks(&manifest, &cfg, store, json),
        Cmd::Read {
            manifest,
            store,
            offset,
            size,
            out,
        } => read::cmd_read(&manifest, &cfg, store, offset, size, out.as_deref()),
        Cmd::Export {
            manifest,
            store,
            out,
        } => read::cmd_export(&manifest, &cfg, store, &out),
        Cmd::Check { manifest } => admin::cmd_check(&manifest, &cfg),
    }
}
