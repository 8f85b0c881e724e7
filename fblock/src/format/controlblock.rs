// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Codec for the persisted lock/rollback control block.
//!
//! The record is a fixed-layout structure protected by a CRC-16 (CCITT
//! polynomial 0x1021, init 0xFFFF). The CRC is always computed with the crc field
//! itself zeroed; both [`ControlBlock::to_bytes`] and
//! [`ControlBlock::from_bytes`] go through the same [`checksum`] helper so
//! the two directions cannot drift apart.

use std::mem;

use crc::{CRC_16_IBM_3740, Crc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Number of independent anti-rollback counter locations. Must cover every
/// location the verified-boot chain requests.
pub const MAX_ROLLBACK_LOCATIONS: usize = 8;

/// Sentinel stored in a lock field while the gate is locked.
pub const LOCKED_MAGIC: u32 = u32::from_le_bytes(*b"LOCK");
/// Sentinel stored in a lock field while the gate is unlocked.
pub const UNLOCKED_MAGIC: u32 = u32::from_le_bytes(*b"OPEN");

// CRC-16/CCITT-FALSE. The 0xFFFF init matters: with a zero init, an erased
// all-zero block would checksum to zero and validate.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid control block size: {0}")]
    InvalidSize(usize),
    #[error("Control block CRC mismatch: expected {expected:#06x}, but have {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the control block. The field order and packing are
/// a binary contract shared with host-side verification tooling.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawControlBlock {
    rollback_cnt: [little_endian::U64; MAX_ROLLBACK_LOCATIONS],
    mmc_lock: little_endian::U32,
    ipl_lock: little_endian::U32,
    crc: little_endian::U16,
}

/// Compute the record checksum with the crc field zeroed.
fn checksum(raw: &RawControlBlock) -> u16 {
    let mut copy = *raw;
    copy.crc = 0.into();
    CRC16.checksum(copy.as_bytes())
}

/// State of one flashing gate. Values other than the two magics are never
/// produced by this codec; they can only come from storage that was written
/// by something else, and count as locked.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum LockState {
    Locked,
    Unlocked,
    #[serde(untagged)]
    Unknown(u32),
}

impl LockState {
    pub fn from_raw(value: u32) -> Self {
        match value {
            LOCKED_MAGIC => Self::Locked,
            UNLOCKED_MAGIC => Self::Unlocked,
            v => Self::Unknown(v),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Locked => LOCKED_MAGIC,
            Self::Unlocked => UNLOCKED_MAGIC,
            Self::Unknown(v) => v,
        }
    }

    /// Whether the gate permits destructive operations. Fails closed for
    /// unknown sentinels.
    pub fn is_unlocked(self) -> bool {
        self == Self::Unlocked
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ControlBlock {
    pub rollback_cnt: [u64; MAX_ROLLBACK_LOCATIONS],
    pub mmc_lock: LockState,
    pub ipl_lock: LockState,
}

/// The safe-defaults record used to recover from corrupted or erased
/// storage: both gates unlocked, all rollback counters zero.
impl Default for ControlBlock {
    fn default() -> Self {
        Self {
            rollback_cnt: [0; MAX_ROLLBACK_LOCATIONS],
            mmc_lock: LockState::Unlocked,
            ipl_lock: LockState::Unlocked,
        }
    }
}

impl ControlBlock {
    pub const SIZE: usize = mem::size_of::<RawControlBlock>();

    /// Serialize the record with a freshly computed CRC.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = RawControlBlock {
            rollback_cnt: self.rollback_cnt.map(little_endian::U64::new),
            mmc_lock: self.mmc_lock.to_raw().into(),
            ipl_lock: self.ipl_lock.to_raw().into(),
            crc: 0.into(),
        };
        raw.crc = checksum(&raw).into();

        let mut buf = [0u8; Self::SIZE];
        buf.copy_from_slice(raw.as_bytes());
        buf
    }

    /// Deserialize the record, validating the stored CRC. A mismatch is
    /// reported as [`Error::CrcMismatch`]; callers decide whether that is
    /// fatal or a reset-to-defaults condition.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let raw =
            RawControlBlock::read_from_bytes(data).map_err(|_| Error::InvalidSize(data.len()))?;

        let expected = checksum(&raw);
        let actual = raw.crc.get();
        if actual != expected {
            return Err(Error::CrcMismatch { expected, actual });
        }

        Ok(Self {
            rollback_cnt: raw.rollback_cnt.map(|c| c.get()),
            mmc_lock: LockState::from_raw(raw.mmc_lock.get()),
            ipl_lock: LockState::from_raw(raw.ipl_lock.get()),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn lock_state_raw_round_trip() {
        assert_eq!(LockState::from_raw(LOCKED_MAGIC), LockState::Locked);
        assert_eq!(LockState::from_raw(UNLOCKED_MAGIC), LockState::Unlocked);
        assert_eq!(LockState::from_raw(0), LockState::Unknown(0));
        assert_eq!(LockState::Unknown(0x1234).to_raw(), 0x1234);
        assert!(!LockState::Unknown(0x1234).is_unlocked());
    }

    #[test]
    fn codec_round_trip() {
        let mut cb = ControlBlock::default();
        cb.rollback_cnt[0] = 5;
        cb.rollback_cnt[7] = u64::MAX;
        cb.mmc_lock = LockState::Locked;

        let data = cb.to_bytes();
        assert_eq!(ControlBlock::from_bytes(&data).unwrap(), cb);
    }

    #[test]
    fn single_bit_flip_is_detected() {
        let data = ControlBlock::default().to_bytes();

        for bit in 0..data.len() * 8 {
            let mut flipped = data;
            flipped[bit / 8] ^= 1 << (bit % 8);

            assert_matches!(
                ControlBlock::from_bytes(&flipped),
                Err(Error::CrcMismatch { .. }),
                "flip of bit {bit} was not detected",
            );
        }
    }

    #[test]
    fn erased_storage_is_rejected() {
        assert_matches!(
            ControlBlock::from_bytes(&[0x00; ControlBlock::SIZE]),
            Err(Error::CrcMismatch { .. })
        );
        assert_matches!(
            ControlBlock::from_bytes(&[0xff; ControlBlock::SIZE]),
            Err(Error::CrcMismatch { .. })
        );
        assert_matches!(
            ControlBlock::from_bytes(&[0u8; 4]),
            Err(Error::InvalidSize(4))
        );
    }
}
