// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Unlock-ability check against the factory reset protection (FRP)
//! persistent partition.
//!
//! The partition starts with a 32-byte SHA-256 guard over the rest of its
//! contents (with the guard region itself treated as zeros), and the last
//! payload byte is the unlock-ability flag. The engine treats the region as
//! read-only; it is provisioned at manufacturing time.

use ring::digest::{Context, SHA256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::device::{self, BlockDevice, PartitionTable, USER_HW_PARTITION};

pub const FRP_PARTITION: &str = "frp";

/// Size of the leading hash guard.
pub const GUARD_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Partition not found: {FRP_PARTITION}")]
    NoFrpPartition,
    #[error("Device error")]
    Device(#[from] device::Error),
}

type Result<T> = std::result::Result<T, Error>;

fn guard_digest(payload: &[u8]) -> [u8; GUARD_SIZE] {
    // The guard region itself counts as zeros in the digest.
    let mut ctx = Context::new(&SHA256);
    ctx.update(&[0u8; GUARD_SIZE]);
    ctx.update(payload);

    let mut digest = [0u8; GUARD_SIZE];
    digest.copy_from_slice(ctx.finish().as_ref());
    digest
}

fn read_ability(dev: &mut dyn BlockDevice, table: &dyn PartitionTable) -> Result<bool> {
    let part = table.find(FRP_PARTITION).ok_or(Error::NoFrpPartition)?;
    let start = part.start_bytes(dev.block_size());
    let total = part.size_bytes(dev.block_size()) as usize;

    if total <= GUARD_SIZE {
        return Ok(false);
    }

    let payload = device::read_record(
        dev,
        USER_HW_PARTITION,
        (start as i64) + GUARD_SIZE as i64,
        total - GUARD_SIZE,
    )?;

    let Some(&flag) = payload.last() else {
        return Ok(false);
    };
    if flag == 0 {
        return Ok(false);
    }

    // The flag only counts if the guard hash over the partition contents
    // matches; anything else fails closed.
    let computed = guard_digest(&payload);
    let stored = device::read_record(dev, USER_HW_PARTITION, start as i64, GUARD_SIZE)?;

    if computed[..] != stored[..] {
        warn!(
            "FRP guard mismatch: computed {}, stored {}",
            hex::encode(computed),
            hex::encode(&stored),
        );
        return Ok(false);
    }

    Ok(true)
}

/// Whether unlocking is permitted at all, independent of the current lock
/// state. Any failure to read or verify the FRP partition denies unlocking.
pub fn unlock_ability(dev: &mut dyn BlockDevice, table: &dyn PartitionTable) -> bool {
    match read_ability(dev, table) {
        Ok(ability) => ability,
        Err(e) => {
            debug!("Unlock ability check failed: {e}");
            false
        }
    }
}

/// Write a fresh FRP image with the given ability flag and a matching
/// guard. This is the manufacturing/provisioning side; the engine itself
/// never calls it.
pub fn provision(
    dev: &mut dyn BlockDevice,
    table: &dyn PartitionTable,
    ability: bool,
) -> Result<()> {
    let part = table.find(FRP_PARTITION).ok_or(Error::NoFrpPartition)?;
    let start = part.start_bytes(dev.block_size());
    let total = part.size_bytes(dev.block_size()) as usize;

    let mut payload = vec![0u8; total.saturating_sub(GUARD_SIZE)];
    if let Some(last) = payload.last_mut() {
        *last = u8::from(ability);
    }

    let mut image = guard_digest(&payload).to_vec();
    image.extend_from_slice(&payload);

    device::write_record(dev, USER_HW_PARTITION, start as i64, &image)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::device::{DiskImage, PartitionInfo, StaticPartitionTable};

    use super::*;

    fn test_setup() -> (DiskImage<Cursor<Vec<u8>>>, StaticPartitionTable) {
        let dev = DiskImage::new(vec![Cursor::new(vec![0u8; 64 * 512])]);
        let table = StaticPartitionTable(vec![PartitionInfo {
            name: FRP_PARTITION.to_owned(),
            start_lba: 8,
            num_blocks: 16,
            part_type: "raw".to_owned(),
        }]);

        (dev, table)
    }

    #[test]
    fn unprovisioned_denies() {
        let (mut dev, table) = test_setup();
        assert!(!unlock_ability(&mut dev, &table));
    }

    #[test]
    fn provisioned_flag_round_trip() {
        let (mut dev, table) = test_setup();

        provision(&mut dev, &table, true).unwrap();
        assert!(unlock_ability(&mut dev, &table));

        provision(&mut dev, &table, false).unwrap();
        assert!(!unlock_ability(&mut dev, &table));
    }

    #[test]
    fn guard_mismatch_denies() {
        let (mut dev, table) = test_setup();
        provision(&mut dev, &table, true).unwrap();

        // Corrupt one guard byte; the stored flag is still 1.
        let mut guard = device::read_record(&mut dev, 0, 8 * 512, GUARD_SIZE).unwrap();
        guard[0] ^= 0xff;
        device::write_record(&mut dev, 0, 8 * 512, &guard).unwrap();

        assert!(!unlock_ability(&mut dev, &table));
    }

    #[test]
    fn missing_partition_denies() {
        let (mut dev, _) = test_setup();
        let empty = StaticPartitionTable::default();

        assert!(!unlock_ability(&mut dev, &empty));
    }
}
