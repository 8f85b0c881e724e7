// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! The host-facing fastboot command surface. Commands arrive as plain ASCII
//! lines from the transport; they are decoded into typed commands here, at
//! the boundary, so everything past this point matches on enums.

use std::fmt;

use thiserror::Error;

use crate::flashing::FlashingCommand;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not implemented")]
    NotImplemented,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostCommand {
    Flashing(FlashingCommand),
    GetVar(String),
}

impl HostCommand {
    /// Parse one command line, eg. `flashing unlock` or `getvar all`.
    pub fn parse(line: &str) -> Result<Self> {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));

        match cmd {
            // `oem` is the historical spelling of `flashing`.
            "flashing" | "oem" => FlashingCommand::parse(arg)
                .map(Self::Flashing)
                .ok_or(Error::NotImplemented),
            "getvar" => Ok(Self::GetVar(arg.to_owned())),
            other => Err(Error::UnknownCommand(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Okay(String),
    Fail(String),
}

/// A protocol reply: zero or more INFO lines followed by a terminal OKAY or
/// FAIL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub info: Vec<String>,
    pub status: Status,
}

impl Reply {
    pub fn okay(msg: impl Into<String>) -> Self {
        Self {
            info: vec![],
            status: Status::Okay(msg.into()),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            info: vec![],
            status: Status::Fail(msg.into()),
        }
    }

    pub fn push_info(&mut self, line: impl Into<String>) {
        self.info.push(line.into());
    }

    pub fn is_okay(&self) -> bool {
        matches!(self.status, Status::Okay(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.info {
            writeln!(f, "INFO{line}")?;
        }
        match &self.status {
            Status::Okay(msg) => write!(f, "OKAY{msg}"),
            Status::Fail(msg) => write!(f, "FAIL{msg}"),
        }
    }
}
