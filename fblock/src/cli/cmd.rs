// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::Parser;

use crate::{
    cli::{
        args::DeviceGroup,
        flashing::{print_reply, run_command},
    },
    env::ProcessEnv,
    getvar::{self, VarContext},
    protocol::{HostCommand, Reply},
    slot::FixedSlots,
};

/// Run a raw fastboot command line, eg. `flashing unlock` or `getvar all`,
/// and print the wire-format reply.
#[derive(Debug, Parser)]
pub struct CmdCli {
    #[command(flatten)]
    device: DeviceGroup,

    /// Command line as sent by the host tool.
    pub line: String,

    /// Confirm unlocking without waiting for the confirm input.
    #[arg(short = 'y', long)]
    assume_yes: bool,
}

pub fn cmd_main(cli: &CmdCli, cancel_signal: &AtomicBool) -> Result<()> {
    let reply = match HostCommand::parse(&cli.line) {
        Ok(HostCommand::Flashing(cmd)) => {
            run_command(&cli.device, cmd, cli.assume_yes, cancel_signal)?
        }
        Ok(HostCommand::GetVar(query)) => {
            let (mut dev, table) = cli.device.open(false)?;
            let env = ProcessEnv;
            let slots = FixedSlots::default();

            let mut ctx = VarContext {
                device: &mut dev,
                partitions: &table,
                slots: &slots,
                env: &env,
            };

            getvar::getvar(&mut ctx, &query)
        }
        Err(e) => Reply::fail(e.to_string()),
    };

    print_reply(&reply)
}
