// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! The lock/unlock state machine behind the `flashing` commands.
//!
//! Every command loads the persisted control block, applies its transition,
//! persists the result, and queues the wipe-data recovery boot. Unlocks are
//! additionally gated by the FRP unlock-ability flag and an interactive
//! confirmation, and scrub RAM on success so secrets from the locked
//! session do not leak into the unlocked one.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    device::{BlockDevice, PartitionTable},
    env::Environment,
    format::{
        bootmsg,
        controlblock::{ControlBlock, LockState},
    },
    frp,
    protocol::Reply,
    store,
    wipe::RamWipe,
};

/// Environment variable that force-confirms unlocking without waiting for
/// the confirm input.
pub const ENV_CONFIRM_OVERRIDE: &str = "confirm_user_unlock";
/// Environment variable overriding the confirmation timeout, in seconds.
pub const ENV_CONFIRM_TIMEOUT: &str = "confirm_user_to";

pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 30;
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum Error {
    #[error("load control block failed")]
    Load(#[source] store::Error),
    #[error("save control block failed")]
    Save(#[source] store::Error),
    #[error("unlock ability is 0")]
    UnlockAbility,
    #[error("user abort")]
    UserAbort,
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlashingCommand {
    Lock,
    Unlock,
    LockCritical,
    UnlockCritical,
    GetUnlockAbility,
}

impl FlashingCommand {
    /// Parse the argument of a `flashing`/`oem` command. Unknown arguments
    /// are reported to the host as not implemented.
    pub fn parse(arg: &str) -> Option<Self> {
        match arg {
            "lock" => Some(Self::Lock),
            "unlock" => Some(Self::Unlock),
            "lock_critical" => Some(Self::LockCritical),
            "unlock_critical" => Some(Self::UnlockCritical),
            "get_unlock_ability" => Some(Self::GetUnlockAbility),
            _ => None,
        }
    }
}

/// The physical confirm input polled while waiting for the user to approve
/// an unlock, eg. a GPIO button.
pub trait ConfirmInput {
    fn pressed(&mut self) -> bool;
}

impl<F: FnMut() -> bool> ConfirmInput for F {
    fn pressed(&mut self) -> bool {
        self()
    }
}

/// All collaborators of the state machine, constructed once at startup.
pub struct Flasher<'a> {
    device: &'a mut dyn BlockDevice,
    partitions: &'a dyn PartitionTable,
    env: &'a dyn Environment,
    confirm: &'a mut dyn ConfirmInput,
    ram: &'a mut dyn RamWipe,
    cancel_signal: &'a AtomicBool,
    reset_pending: bool,
}

impl<'a> Flasher<'a> {
    pub fn new(
        device: &'a mut dyn BlockDevice,
        partitions: &'a dyn PartitionTable,
        env: &'a dyn Environment,
        confirm: &'a mut dyn ConfirmInput,
        ram: &'a mut dyn RamWipe,
        cancel_signal: &'a AtomicBool,
    ) -> Self {
        Self {
            device,
            partitions,
            env,
            confirm,
            ram,
            cancel_signal,
            reset_pending: false,
        }
    }

    /// Whether a completed command requested a device reset.
    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// Run one `flashing` command to completion and return the OKAY message.
    ///
    /// A control block that fails CRC validation is replaced by the safe
    /// defaults (both gates unlocked, zero rollback counters) before the
    /// transition is applied: a corrupted block must never leave the device
    /// in an indeterminate locked state. I/O failures are fatal instead.
    pub fn apply(&mut self, cmd: FlashingCommand) -> Result<String> {
        let mut cb = match store::load(self.device) {
            Ok(cb) => cb,
            Err(store::Error::Crc(e)) => {
                warn!("Control block is invalid, resetting to defaults: {e}");
                ControlBlock::default()
            }
            Err(e) => return Err(Error::Load(e)),
        };

        let mut wipe_ram = false;

        match cmd {
            FlashingCommand::Lock => {
                cb.mmc_lock = LockState::Locked;
            }
            FlashingCommand::Unlock => {
                self.check_unlock_allowed()?;
                cb.mmc_lock = LockState::Unlocked;
                wipe_ram = true;
            }
            FlashingCommand::LockCritical => {
                cb.ipl_lock = LockState::Locked;
            }
            FlashingCommand::UnlockCritical => {
                self.check_unlock_allowed()?;
                cb.ipl_lock = LockState::Unlocked;
                wipe_ram = true;
            }
            FlashingCommand::GetUnlockAbility => {
                let ability = frp::unlock_ability(self.device, self.partitions);
                return Ok(u8::from(ability).to_string());
            }
        }

        store::save(self.device, &cb).map_err(Error::Save)?;

        // Every lock transition queues a userdata wipe, not just unlocks.
        // The request is best-effort once the control block is persisted.
        if let Err(e) = bootmsg::request_wipe_data(self.device, self.partitions) {
            warn!("Failed to queue data wipe: {e}");
        }

        if wipe_ram {
            self.ram.wipe();
        }

        self.reset_pending = true;
        Ok(String::new())
    }

    fn check_unlock_allowed(&mut self) -> Result<()> {
        if !frp::unlock_ability(self.device, self.partitions) {
            return Err(Error::UnlockAbility);
        }
        if !self.user_confirmed() {
            return Err(Error::UserAbort);
        }

        Ok(())
    }

    /// Wait for the user to approve the unlock, polling the confirm input
    /// until the timeout expires. `confirm_user_unlock` skips the wait
    /// entirely; `confirm_user_to` overrides the timeout.
    fn user_confirmed(&mut self) -> bool {
        if self.env.get_flag(ENV_CONFIRM_OVERRIDE) {
            info!("Unlock confirmed via {ENV_CONFIRM_OVERRIDE}");
            return true;
        }

        let timeout = self
            .env
            .get(ENV_CONFIRM_TIMEOUT)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_CONFIRM_TIMEOUT_SECS);

        info!("Press the confirm input within {timeout}s to allow unlocking");

        // A timeout too large to represent as a deadline falls back to the
        // default wait.
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(timeout))
            .unwrap_or_else(|| {
                Instant::now() + Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS)
            });
        while Instant::now() < deadline {
            if self.cancel_signal.load(Ordering::SeqCst) {
                return false;
            }
            if self.confirm.pressed() {
                return true;
            }

            thread::sleep(CONFIRM_POLL_INTERVAL);
        }

        false
    }
}

/// Protocol-level entry point for a `flashing <arg>` command line.
pub fn handle(flasher: &mut Flasher<'_>, arg: &str) -> Reply {
    let Some(cmd) = FlashingCommand::parse(arg) else {
        return Reply::fail("not implemented");
    };

    match flasher.apply(cmd) {
        Ok(msg) => Reply::okay(msg),
        Err(e) => Reply::fail(e.to_string()),
    }
}
