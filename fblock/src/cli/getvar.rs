// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Result;
use clap::Parser;

use crate::{
    cli::{args::DeviceGroup, flashing::print_reply},
    env::ProcessEnv,
    getvar::{self, VarContext},
    slot::FixedSlots,
};

/// Query a fastboot variable from a device image.
#[derive(Debug, Parser)]
pub struct GetvarCli {
    #[command(flatten)]
    device: DeviceGroup,

    /// Variable name, eg. `unlocked` or `partition-size:boot_a`, or `all`.
    pub name: String,
}

pub fn getvar_main(cli: &GetvarCli) -> Result<()> {
    let (mut dev, table) = cli.device.open(false)?;
    let env = ProcessEnv;
    let slots = FixedSlots::default();

    let mut ctx = VarContext {
        device: &mut dev,
        partitions: &table,
        slots: &slots,
        env: &env,
    };

    print_reply(&getvar::getvar(&mut ctx, &cli.name))
}
