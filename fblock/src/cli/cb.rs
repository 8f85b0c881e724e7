// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cli::{args::DeviceGroup, status, warning},
    format::controlblock::ControlBlock,
    store,
};

/// Dump the persisted control block.
#[derive(Debug, Parser)]
pub struct DumpCli {
    #[command(flatten)]
    device: DeviceGroup,
}

/// Overwrite the control block with the safe defaults (both gates unlocked,
/// zero rollback counters).
#[derive(Debug, Parser)]
pub struct ResetCli {
    #[command(flatten)]
    device: DeviceGroup,
}

/// Read or write an anti-rollback counter.
#[derive(Debug, Parser)]
pub struct RollbackCli {
    #[command(flatten)]
    device: DeviceGroup,

    /// Rollback location index.
    pub location: usize,

    /// New counter value. Without this, the current value is printed.
    #[arg(long)]
    pub set: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum CbCommand {
    Dump(DumpCli),
    Reset(ResetCli),
    Rollback(RollbackCli),
}

/// Inspect or modify the lock/rollback control block.
#[derive(Debug, Parser)]
pub struct CbCli {
    #[command(subcommand)]
    command: CbCommand,
}

fn dump_subcommand(cli: &DumpCli) -> Result<()> {
    let (mut dev, _) = cli.device.open(false)?;

    let cb = store::load(&mut dev).context("Failed to load control block")?;
    let text = toml_edit::ser::to_string_pretty(&cb)
        .context("Failed to serialize control block")?;
    print!("{text}");

    Ok(())
}

fn reset_subcommand(cli: &ResetCli) -> Result<()> {
    let (mut dev, _) = cli.device.open(true)?;

    warning!("Overwriting control block with defaults");
    store::save(&mut dev, &ControlBlock::default())
        .context("Failed to save control block")?;

    Ok(())
}

fn rollback_subcommand(cli: &RollbackCli) -> Result<()> {
    let rw = cli.set.is_some();
    let (mut dev, _) = cli.device.open(rw)?;

    match cli.set {
        Some(value) => {
            store::set_rollback_index(&mut dev, cli.location, value)
                .context("Failed to set rollback index")?;
            status!("Rollback index {} set to {value}", cli.location);
        }
        None => {
            let value = store::get_rollback_index(&mut dev, cli.location)
                .context("Failed to get rollback index")?;
            println!("{value}");
        }
    }

    Ok(())
}

pub fn cb_main(cli: &CbCli) -> Result<()> {
    match &cli.command {
        CbCommand::Dump(c) => dump_subcommand(c),
        CbCommand::Reset(c) => reset_subcommand(c),
        CbCommand::Rollback(c) => rollback_subcommand(c),
    }
}
