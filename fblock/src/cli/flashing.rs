// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::atomic::AtomicBool;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};

use crate::{
    cli::{args::DeviceGroup, status},
    env::ProcessEnv,
    flashing::{Flasher, FlashingCommand},
    protocol::{Reply, Status},
    wipe::NoopWipe,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FlashingAction {
    Lock,
    Unlock,
    LockCritical,
    UnlockCritical,
    GetUnlockAbility,
}

impl From<FlashingAction> for FlashingCommand {
    fn from(action: FlashingAction) -> Self {
        match action {
            FlashingAction::Lock => Self::Lock,
            FlashingAction::Unlock => Self::Unlock,
            FlashingAction::LockCritical => Self::LockCritical,
            FlashingAction::UnlockCritical => Self::UnlockCritical,
            FlashingAction::GetUnlockAbility => Self::GetUnlockAbility,
        }
    }
}

/// Run a flashing (lock state) command against a device image.
#[derive(Debug, Parser)]
pub struct FlashingCli {
    #[command(flatten)]
    device: DeviceGroup,

    #[arg(value_enum)]
    action: FlashingAction,

    /// Confirm unlocking without waiting for the confirm input.
    #[arg(short = 'y', long)]
    assume_yes: bool,
}

/// Run one already-parsed flashing command and print the protocol reply.
pub fn run_command(
    device: &DeviceGroup,
    cmd: FlashingCommand,
    assume_yes: bool,
    cancel_signal: &AtomicBool,
) -> Result<Reply> {
    let (mut dev, table) = device.open(true)?;
    let env = ProcessEnv;
    // There is no confirm GPIO on a host machine; --assume-yes or the
    // confirm_user_unlock variable stand in for it.
    let mut confirm = move || assume_yes;
    let mut ram = NoopWipe;

    let mut flasher = Flasher::new(
        &mut dev,
        &table,
        &env,
        &mut confirm,
        &mut ram,
        cancel_signal,
    );

    let reply = match flasher.apply(cmd) {
        Ok(msg) => Reply::okay(msg),
        Err(e) => Reply::fail(e.to_string()),
    };

    if flasher.reset_pending() {
        status!("Device reset requested");
    }

    Ok(reply)
}

pub fn print_reply(reply: &Reply) -> Result<()> {
    for line in &reply.info {
        println!("INFO{line}");
    }
    match &reply.status {
        Status::Okay(msg) => {
            status!("OKAY{msg}");
            Ok(())
        }
        Status::Fail(msg) => bail!("FAIL{msg}"),
    }
}

pub fn flashing_main(cli: &FlashingCli, cancel_signal: &AtomicBool) -> Result<()> {
    let reply = run_command(
        &cli.device,
        cli.action.into(),
        cli.assume_yes,
        cancel_signal,
    )?;

    print_reply(&reply)
}
