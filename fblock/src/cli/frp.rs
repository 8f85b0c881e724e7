// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cli::{args::DeviceGroup, status},
    frp,
};

/// Report whether the FRP partition currently permits unlocking.
#[derive(Debug, Parser)]
pub struct StatusCli {
    #[command(flatten)]
    device: DeviceGroup,
}

/// Provision the FRP partition with an unlock-ability flag and a matching
/// guard hash. This is the manufacturing-side half of the check.
#[derive(Debug, Parser)]
pub struct SealCli {
    #[command(flatten)]
    device: DeviceGroup,

    /// Permit unlocking.
    #[arg(long)]
    allow_unlock: bool,
}

#[derive(Debug, Subcommand)]
pub enum FrpCommand {
    Status(StatusCli),
    Seal(SealCli),
}

/// Inspect or provision the factory reset protection partition.
#[derive(Debug, Parser)]
pub struct FrpCli {
    #[command(subcommand)]
    command: FrpCommand,
}

fn status_subcommand(cli: &StatusCli) -> Result<()> {
    let (mut dev, table) = cli.device.open(false)?;

    println!("{}", u8::from(frp::unlock_ability(&mut dev, &table)));

    Ok(())
}

fn seal_subcommand(cli: &SealCli) -> Result<()> {
    let (mut dev, table) = cli.device.open(true)?;

    frp::provision(&mut dev, &table, cli.allow_unlock)
        .context("Failed to provision FRP partition")?;
    status!("Sealed FRP partition (unlock ability: {})", cli.allow_unlock);

    Ok(())
}

pub fn frp_main(cli: &FrpCli) -> Result<()> {
    match &cli.command {
        FrpCommand::Status(c) => status_subcommand(c),
        FrpCommand::Seal(c) => seal_subcommand(c),
    }
}
