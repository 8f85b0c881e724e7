// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::OpenOptions,
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use crate::{
    cli::{cb, cmd, flashing, frp, getvar},
    device::{DiskImage, PartitionInfo, StaticPartitionTable},
};

#[derive(Debug, Subcommand)]
pub enum Command {
    Cb(cb::CbCli),
    Cmd(cmd::CmdCli),
    Flashing(flashing::FlashingCli),
    Frp(frp::FrpCli),
    Getvar(getvar::GetvarCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", default_value_t = LevelFilter::INFO)]
    pub log_level: LevelFilter,
}

/// Disk images standing in for the eMMC device and its partition table.
#[derive(Debug, Args)]
pub struct DeviceGroup {
    /// Path to the user-area image (hardware partition 0).
    #[arg(short, long, value_name = "FILE")]
    pub image: PathBuf,

    /// Boot hardware partition images (boot0, boot1, ...), in order.
    #[arg(short = 'b', long, value_name = "FILE")]
    pub boot_image: Vec<PathBuf>,

    /// Software partition in the user area (<name>:<start_lba>:<num_blocks>[:<type>]).
    #[arg(
        short,
        long,
        value_name = "SPEC",
        value_parser = parse_partition_spec,
    )]
    pub part: Vec<PartitionInfo>,
}

fn parse_partition_spec(spec: &str) -> Result<PartitionInfo, String> {
    let mut pieces = spec.split(':');

    let name = pieces.next().filter(|n| !n.is_empty());
    let start_lba = pieces.next().and_then(|v| v.parse().ok());
    let num_blocks = pieces.next().and_then(|v| v.parse().ok());
    let part_type = pieces.next().unwrap_or("raw");

    match (name, start_lba, num_blocks, pieces.next()) {
        (Some(name), Some(start_lba), Some(num_blocks), None) => Ok(PartitionInfo {
            name: name.to_owned(),
            start_lba,
            num_blocks,
            part_type: part_type.to_owned(),
        }),
        _ => Err("expected <name>:<start_lba>:<num_blocks>[:<type>]".to_owned()),
    }
}

impl DeviceGroup {
    pub fn open(&self, rw: bool) -> Result<(DiskImage<std::fs::File>, StaticPartitionTable)> {
        let mut parts = vec![];
        for path in std::iter::once(&self.image).chain(&self.boot_image) {
            let file = OpenOptions::new()
                .read(true)
                .write(rw)
                .open(path)
                .with_context(|| format!("Failed to open image: {path:?}"))?;
            parts.push(file);
        }

        Ok((DiskImage::new(parts), StaticPartitionTable(self.part.clone())))
    }
}

pub fn init_logging(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("FBLOCK_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

pub fn main(logging_initialized: &AtomicBool, cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level);
    logging_initialized.store(true, Ordering::SeqCst);

    match cli.command {
        Command::Cb(c) => cb::cb_main(&c),
        Command::Cmd(c) => cmd::cmd_main(&c, cancel_signal),
        Command::Flashing(c) => flashing::flashing_main(&c, cancel_signal),
        Command::Frp(c) => frp::frp_main(&c),
        Command::Getvar(c) => getvar::getvar_main(&c),
    }
}
