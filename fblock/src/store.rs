// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Persistence of the control block and the rollback-index accessors built
//! on top of it.
//!
//! The record lives at a fixed distance from the end of the first boot
//! hardware partition, outside any software partition, so it survives
//! repartitioning of the user area.

use thiserror::Error;
use tracing::warn;

use crate::{
    device::{self, BlockDevice},
    format::controlblock::{self, ControlBlock, MAX_ROLLBACK_LOCATIONS},
};

/// Hardware partition holding the control block (boot0).
pub const CB_HW_PARTITION: u32 = 1;

/// Byte offset of the control block, relative to the end of the hardware
/// partition. Two blocks are reserved even though the record fits in one.
pub const CB_END_OFFSET: i64 = -1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Control block I/O failed")]
    Io(#[from] device::Error),
    #[error("Stored control block is not valid")]
    Crc(#[source] controlblock::Error),
    #[error("Rollback location {0} is out of range ({MAX_ROLLBACK_LOCATIONS} locations)")]
    BadRollbackLocation(usize),
}

type Result<T> = std::result::Result<T, Error>;

/// Load and validate the persisted control block. CRC failures are reported
/// as [`Error::Crc`] so callers can distinguish corruption from I/O errors.
pub fn load(dev: &mut dyn BlockDevice) -> Result<ControlBlock> {
    let data = device::read_record(dev, CB_HW_PARTITION, CB_END_OFFSET, ControlBlock::SIZE)?;

    ControlBlock::from_bytes(&data).map_err(Error::Crc)
}

/// Load the control block, recovering from corrupted or erased storage with
/// the safe-defaults record. I/O errors still propagate.
pub fn load_or_default(dev: &mut dyn BlockDevice) -> Result<ControlBlock> {
    match load(dev) {
        Err(Error::Crc(e)) => {
            warn!("Control block is invalid, continuing with defaults: {e}");
            Ok(ControlBlock::default())
        }
        other => other,
    }
}

pub fn save(dev: &mut dyn BlockDevice, cb: &ControlBlock) -> Result<()> {
    device::write_record(dev, CB_HW_PARTITION, CB_END_OFFSET, &cb.to_bytes())?;

    Ok(())
}

/// Read the anti-rollback counter for one location.
///
/// Unlike the lock/unlock path, a corrupted control block is a hard error
/// here rather than a reset to defaults: silently reporting zero counters
/// would defeat anti-rollback entirely.
pub fn get_rollback_index(dev: &mut dyn BlockDevice, location: usize) -> Result<u64> {
    if location >= MAX_ROLLBACK_LOCATIONS {
        return Err(Error::BadRollbackLocation(location));
    }

    let cb = load(dev)?;
    Ok(cb.rollback_cnt[location])
}

/// Store the anti-rollback counter for one location. Monotonicity is the
/// caller's contract; the verified-boot chain only ever requests increases.
pub fn set_rollback_index(dev: &mut dyn BlockDevice, location: usize, value: u64) -> Result<()> {
    if location >= MAX_ROLLBACK_LOCATIONS {
        return Err(Error::BadRollbackLocation(location));
    }

    let mut cb = load(dev)?;
    cb.rollback_cnt[location] = value;
    save(dev, &cb)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use crate::{device::DiskImage, format::controlblock::LockState};

    use super::*;

    fn test_device() -> DiskImage<Cursor<Vec<u8>>> {
        DiskImage::new(vec![
            Cursor::new(vec![0u8; 64 * 512]),
            Cursor::new(vec![0u8; 16 * 512]),
        ])
    }

    #[test]
    fn save_and_load() {
        let mut dev = test_device();

        assert_matches!(load(&mut dev), Err(Error::Crc(_)));
        assert_eq!(load_or_default(&mut dev).unwrap(), ControlBlock::default());

        let mut cb = ControlBlock::default();
        cb.mmc_lock = LockState::Locked;
        save(&mut dev, &cb).unwrap();

        assert_eq!(load(&mut dev).unwrap(), cb);
        // The record must land in the reserved tail blocks of boot0, with
        // the lock magic right after the 64 rollback-counter bytes.
        let parts = dev.into_inner();
        assert_eq!(&parts[1].get_ref()[14 * 512 + 64..14 * 512 + 68], b"LOCK");
    }

    #[test]
    fn rollback_round_trip() {
        let mut dev = test_device();
        save(&mut dev, &ControlBlock::default()).unwrap();

        set_rollback_index(&mut dev, 0, 5).unwrap();
        assert_eq!(get_rollback_index(&mut dev, 0).unwrap(), 5);

        // Decreases are not prevented at this layer.
        set_rollback_index(&mut dev, 0, 3).unwrap();
        assert_eq!(get_rollback_index(&mut dev, 0).unwrap(), 3);

        // Other locations are untouched.
        assert_eq!(get_rollback_index(&mut dev, 7).unwrap(), 0);
    }

    #[test]
    fn rollback_bounds() {
        let mut dev = test_device();
        save(&mut dev, &ControlBlock::default()).unwrap();

        assert_matches!(
            get_rollback_index(&mut dev, MAX_ROLLBACK_LOCATIONS),
            Err(Error::BadRollbackLocation(_))
        );
        assert_matches!(
            set_rollback_index(&mut dev, MAX_ROLLBACK_LOCATIONS, 1),
            Err(Error::BadRollbackLocation(_))
        );

        // The failed set must not have touched storage.
        assert_eq!(load(&mut dev).unwrap(), ControlBlock::default());
    }

    #[test]
    fn rollback_does_not_default_on_corruption() {
        let mut dev = test_device();

        // Uninitialized storage: the lock path would fall back to defaults,
        // but the rollback path must propagate the corruption.
        assert_matches!(get_rollback_index(&mut dev, 0), Err(Error::Crc(_)));
        assert_matches!(set_rollback_index(&mut dev, 0, 1), Err(Error::Crc(_)));
    }
}
