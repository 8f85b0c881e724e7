// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Android bootloader message block (BCB), stored at the start of the misc
//! partition. The lock engine only ever writes the wipe-data recovery
//! request; recovery consumes and clears it.

use std::{mem, str};

use thiserror::Error;
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    device::{self, BlockDevice, PartitionTable, USER_HW_PARTITION},
    format::padding::ZeroPadding,
};

pub const MISC_PARTITION: &str = "misc";

pub const COMMAND_SIZE: usize = 32;
pub const STATUS_SIZE: usize = 32;
pub const RECOVERY_SIZE: usize = 768;
pub const STAGE_SIZE: usize = 32;
const RESERVED_SIZE: usize = 1184;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0:?} field is too long (>{1}): {2:?}")]
    StringTooLong(&'static str, usize, String),
    #[error("{0:?} field is not UTF-8 encoded")]
    StringNotUtf8(&'static str, #[source] str::Utf8Error),
    #[error("Invalid bootloader message size: {0}")]
    InvalidSize(usize),
    #[error("Partition not found: {MISC_PARTITION}")]
    NoMiscPartition,
    #[error("Device error")]
    Device(#[from] device::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout, compatible with AOSP's `struct bootloader_message`.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootloaderMessage {
    command: [u8; COMMAND_SIZE],
    status: [u8; STATUS_SIZE],
    recovery: [u8; RECOVERY_SIZE],
    stage: [u8; STAGE_SIZE],
    reserved: [u8; RESERVED_SIZE],
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BootloaderMessage {
    pub command: String,
    pub status: String,
    pub recovery: String,
    pub stage: String,
}

impl BootloaderMessage {
    pub const SIZE: usize = mem::size_of::<RawBootloaderMessage>();

    /// The recovery-boot request that wipes userdata.
    pub fn wipe_data() -> Self {
        Self {
            command: "boot-recovery".to_owned(),
            recovery: "recovery\n--wipe_data".to_owned(),
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; Self::SIZE]> {
        fn field<const N: usize>(name: &'static str, value: &str) -> Result<[u8; N]> {
            value
                .as_bytes()
                .to_padded_array()
                .ok_or_else(|| Error::StringTooLong(name, N, value.to_owned()))
        }

        let raw = RawBootloaderMessage {
            command: field("command", &self.command)?,
            status: field("status", &self.status)?,
            recovery: field("recovery", &self.recovery)?,
            stage: field("stage", &self.stage)?,
            reserved: [0u8; RESERVED_SIZE],
        };

        let mut buf = [0u8; Self::SIZE];
        buf.copy_from_slice(raw.as_bytes());
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let raw = RawBootloaderMessage::read_from_bytes(data)
            .map_err(|_| Error::InvalidSize(data.len()))?;

        let field = |name, value: &[u8]| {
            str::from_utf8(value.trim_end_padding())
                .map(str::to_owned)
                .map_err(|e| Error::StringNotUtf8(name, e))
        };

        Ok(Self {
            command: field("command", &raw.command)?,
            status: field("status", &raw.status)?,
            recovery: field("recovery", &raw.recovery)?,
            stage: field("stage", &raw.stage)?,
        })
    }
}

/// Queue a wipe-data recovery boot by writing the BCB into the misc
/// partition.
pub fn request_wipe_data(dev: &mut dyn BlockDevice, table: &dyn PartitionTable) -> Result<()> {
    let part = table.find(MISC_PARTITION).ok_or(Error::NoMiscPartition)?;
    let offset = part.start_bytes(dev.block_size());

    let msg = BootloaderMessage::wipe_data().to_bytes()?;
    device::write_record(dev, USER_HW_PARTITION, offset as i64, &msg)?;

    Ok(())
}

/// Read back the BCB from the misc partition.
pub fn read(dev: &mut dyn BlockDevice, table: &dyn PartitionTable) -> Result<BootloaderMessage> {
    let part = table.find(MISC_PARTITION).ok_or(Error::NoMiscPartition)?;
    let offset = part.start_bytes(dev.block_size());

    let data = device::read_record(
        dev,
        USER_HW_PARTITION,
        offset as i64,
        BootloaderMessage::SIZE,
    )?;

    BootloaderMessage::from_bytes(&data)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn wipe_data_layout() {
        let msg = BootloaderMessage::wipe_data();
        let data = msg.to_bytes().unwrap();

        assert_eq!(data.len(), 2048);
        assert_eq!(&data[..13], b"boot-recovery");
        assert_eq!(data[13..COMMAND_SIZE], [0u8; COMMAND_SIZE - 13]);
        assert_eq!(&data[64..84], b"recovery\n--wipe_data");

        assert_eq!(BootloaderMessage::from_bytes(&data).unwrap(), msg);
    }

    #[test]
    fn oversized_field_is_rejected() {
        let msg = BootloaderMessage {
            command: "x".repeat(COMMAND_SIZE + 1),
            ..Default::default()
        };

        assert_matches!(
            msg.to_bytes(),
            Err(Error::StringTooLong("command", COMMAND_SIZE, _))
        );
    }
}
