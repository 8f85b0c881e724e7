// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Raw block-device access for small fixed records, independent of any
//! filesystem. Records live either in the eMMC user area or in one of the
//! boot hardware partitions; every access saves, switches, and restores the
//! device's active hardware partition, including on error paths, so the
//! device is never left parked on the wrong partition.

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::format::padding;

/// Block length used for both reads and writes.
pub const SECTOR_SIZE: u64 = 512;

/// The eMMC user area.
pub const USER_HW_PARTITION: u32 = 0;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No hardware partition {0} on device")]
    NoHwPartition(u32),
    #[error("Record at offset {offset} (+{size}) is outside hardware partition {hw_part}")]
    OutOfRange { hw_part: u32, offset: i64, size: usize },
    #[error("Short block {op}: {actual} of {expected} blocks transferred")]
    ShortTransfer {
        op: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("Failed to access block device")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Block-level access to an eMMC-style device with hardware partitions.
/// Capacity and transfers always refer to the active hardware partition.
pub trait BlockDevice {
    fn block_size(&self) -> u64;

    /// Capacity, in blocks, of the active hardware partition.
    fn capacity(&mut self) -> Result<u64>;

    fn current_hw_partition(&self) -> u32;

    fn switch_hw_partition(&mut self, id: u32) -> Result<()>;

    /// Read whole blocks starting at `start`, returning the number of blocks
    /// actually read. `buf` must be a multiple of the block size.
    fn read_blocks(&mut self, start: u64, buf: &mut [u8]) -> Result<u64>;

    /// Write whole blocks starting at `start`, returning the number of
    /// blocks actually written. `buf` must be a multiple of the block size.
    fn write_blocks(&mut self, start: u64, buf: &[u8]) -> Result<u64>;
}

/// A software partition inside the user area, as resolved from the device's
/// partition table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionInfo {
    pub name: String,
    pub start_lba: u64,
    pub num_blocks: u64,
    pub part_type: String,
}

impl PartitionInfo {
    pub fn start_bytes(&self, block_size: u64) -> u64 {
        self.start_lba * block_size
    }

    pub fn size_bytes(&self, block_size: u64) -> u64 {
        self.num_blocks * block_size
    }
}

/// Name-to-extent resolution for software partitions. Parsing the actual
/// on-disk partition table is the platform's job, not ours.
pub trait PartitionTable {
    fn find(&self, name: &str) -> Option<&PartitionInfo>;

    fn list(&self) -> &[PartitionInfo];
}

/// A fixed partition table, eg. from command line arguments or a board
/// description.
#[derive(Clone, Debug, Default)]
pub struct StaticPartitionTable(pub Vec<PartitionInfo>);

impl PartitionTable for StaticPartitionTable {
    fn find(&self, name: &str) -> Option<&PartitionInfo> {
        self.0.iter().find(|p| p.name == name)
    }

    fn list(&self) -> &[PartitionInfo] {
        &self.0
    }
}

/// Block device backed by one seekable stream per hardware partition: files
/// for the CLI, [`std::io::Cursor`] for tests. Stream lengths are truncated
/// to whole blocks.
pub struct DiskImage<F> {
    parts: Vec<F>,
    active: u32,
}

impl<F: Read + Write + Seek> DiskImage<F> {
    /// `parts[0]` is the user area; later entries are the boot hardware
    /// partitions in order.
    pub fn new(parts: Vec<F>) -> Self {
        Self { parts, active: 0 }
    }

    pub fn into_inner(self) -> Vec<F> {
        self.parts
    }

    fn active_stream(&mut self) -> &mut F {
        // The active index is validated by switch_hw_partition() and starts
        // at 0; new() with no streams is nonsensical.
        &mut self.parts[self.active as usize]
    }
}

impl<F: Read + Write + Seek> BlockDevice for DiskImage<F> {
    fn block_size(&self) -> u64 {
        SECTOR_SIZE
    }

    fn capacity(&mut self) -> Result<u64> {
        let len = self.active_stream().seek(SeekFrom::End(0))?;
        Ok(len / SECTOR_SIZE)
    }

    fn current_hw_partition(&self) -> u32 {
        self.active
    }

    fn switch_hw_partition(&mut self, id: u32) -> Result<()> {
        if (id as usize) >= self.parts.len() {
            return Err(Error::NoHwPartition(id));
        }

        self.active = id;
        Ok(())
    }

    fn read_blocks(&mut self, start: u64, buf: &mut [u8]) -> Result<u64> {
        debug_assert_eq!(buf.len() as u64 % SECTOR_SIZE, 0);

        let wanted = buf.len() as u64 / SECTOR_SIZE;
        let avail = self.capacity()?.saturating_sub(start).min(wanted);

        let stream = self.active_stream();
        stream.seek(SeekFrom::Start(start * SECTOR_SIZE))?;
        stream.read_exact(&mut buf[..(avail * SECTOR_SIZE) as usize])?;

        Ok(avail)
    }

    fn write_blocks(&mut self, start: u64, buf: &[u8]) -> Result<u64> {
        debug_assert_eq!(buf.len() as u64 % SECTOR_SIZE, 0);

        let wanted = buf.len() as u64 / SECTOR_SIZE;
        let avail = self.capacity()?.saturating_sub(start).min(wanted);

        let stream = self.active_stream();
        stream.seek(SeekFrom::Start(start * SECTOR_SIZE))?;
        stream.write_all(&buf[..(avail * SECTOR_SIZE) as usize])?;
        stream.flush()?;

        Ok(avail)
    }
}

/// Resolve a possibly capacity-relative byte offset and compute the covering
/// block range. Returns (first block, block count, byte skip within the
/// first block).
fn block_range(
    dev: &mut dyn BlockDevice,
    hw_part: u32,
    offset: i64,
    size: usize,
) -> Result<(u64, u64, usize)> {
    let block_size = dev.block_size();
    let capacity_bytes = dev.capacity()? * block_size;

    let out_of_range = || Error::OutOfRange {
        hw_part,
        offset,
        size,
    };

    let start = if offset < 0 {
        capacity_bytes
            .checked_add_signed(offset)
            .ok_or_else(out_of_range)?
    } else {
        offset as u64
    };
    let end = start.checked_add(size as u64).ok_or_else(out_of_range)?;
    if end > capacity_bytes {
        return Err(out_of_range());
    }

    let first = start / block_size;
    let skip = (start % block_size) as usize;
    let span = padding::round(skip as u64 + size as u64, block_size).ok_or_else(out_of_range)?;

    Ok((first, span / block_size, skip))
}

fn read_record_active(
    dev: &mut dyn BlockDevice,
    hw_part: u32,
    offset: i64,
    size: usize,
) -> Result<Vec<u8>> {
    let (first, blocks, skip) = block_range(dev, hw_part, offset, size)?;
    let block_size = dev.block_size();

    let mut buf = vec![0u8; (blocks * block_size) as usize];
    let n = dev.read_blocks(first, &mut buf)?;
    if n < blocks {
        return Err(Error::ShortTransfer {
            op: "read",
            expected: blocks,
            actual: n,
        });
    }

    buf.drain(..skip);
    buf.truncate(size);
    Ok(buf)
}

fn write_record_active(
    dev: &mut dyn BlockDevice,
    hw_part: u32,
    offset: i64,
    data: &[u8],
) -> Result<()> {
    let (first, blocks, skip) = block_range(dev, hw_part, offset, data.len())?;
    let block_size = dev.block_size();

    let mut buf = vec![0u8; (blocks * block_size) as usize];

    // Preserve neighboring bytes when the record does not cover its boundary
    // blocks entirely.
    if skip != 0 || (skip + data.len()) as u64 % block_size != 0 {
        let n = dev.read_blocks(first, &mut buf)?;
        if n < blocks {
            return Err(Error::ShortTransfer {
                op: "read",
                expected: blocks,
                actual: n,
            });
        }
    }

    buf[skip..][..data.len()].copy_from_slice(data);

    let n = dev.write_blocks(first, &buf)?;
    if n < blocks {
        return Err(Error::ShortTransfer {
            op: "write",
            expected: blocks,
            actual: n,
        });
    }

    Ok(())
}

/// Read `size` bytes at `offset` within hardware partition `hw_part`.
/// Negative offsets are relative to the partition's capacity. The active
/// hardware partition is restored before returning, on all paths.
pub fn read_record(
    dev: &mut dyn BlockDevice,
    hw_part: u32,
    offset: i64,
    size: usize,
) -> Result<Vec<u8>> {
    let saved = dev.current_hw_partition();
    dev.switch_hw_partition(hw_part)?;

    let result = read_record_active(dev, hw_part, offset, size);
    let restored = dev.switch_hw_partition(saved);

    let data = result?;
    restored?;
    Ok(data)
}

/// Write a record at `offset` within hardware partition `hw_part`. Same
/// offset and partition-restore semantics as [`read_record`].
pub fn write_record(
    dev: &mut dyn BlockDevice,
    hw_part: u32,
    offset: i64,
    data: &[u8],
) -> Result<()> {
    let saved = dev.current_hw_partition();
    dev.switch_hw_partition(hw_part)?;

    let result = write_record_active(dev, hw_part, offset, data);
    let restored = dev.switch_hw_partition(saved);

    result?;
    restored?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    fn test_device() -> DiskImage<Cursor<Vec<u8>>> {
        // 16-block user area plus an 8-block boot partition.
        DiskImage::new(vec![
            Cursor::new(vec![0u8; 16 * 512]),
            Cursor::new(vec![0u8; 8 * 512]),
        ])
    }

    #[test]
    fn record_round_trip_unaligned() {
        let mut dev = test_device();

        write_record(&mut dev, 0, 100, b"hello").unwrap();
        assert_eq!(read_record(&mut dev, 0, 100, 5).unwrap(), b"hello");

        // Unaligned writes must not clobber their neighbors.
        write_record(&mut dev, 0, 105, b"world").unwrap();
        assert_eq!(read_record(&mut dev, 0, 100, 10).unwrap(), b"helloworld");
    }

    #[test]
    fn negative_offset_is_capacity_relative() {
        let mut dev = test_device();

        write_record(&mut dev, 1, -1024, b"tail").unwrap();
        assert_eq!(read_record(&mut dev, 1, (8 - 2) * 512, 4).unwrap(), b"tail");
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut dev = test_device();

        assert_matches!(
            read_record(&mut dev, 1, 8 * 512 - 2, 4),
            Err(Error::OutOfRange { hw_part: 1, .. })
        );
        assert_matches!(
            read_record(&mut dev, 1, -(8 * 512 + 1), 1),
            Err(Error::OutOfRange { .. })
        );
        assert_matches!(
            write_record(&mut dev, 0, -1, &[0; 2]),
            Err(Error::OutOfRange { .. })
        );
    }

    #[test]
    fn active_partition_restored_after_failure() {
        let mut dev = test_device();

        assert_matches!(
            read_record(&mut dev, 1, 1 << 30, 4),
            Err(Error::OutOfRange { .. })
        );
        assert_eq!(dev.current_hw_partition(), 0);

        assert_matches!(
            read_record(&mut dev, 7, 0, 4),
            Err(Error::NoHwPartition(7))
        );
        assert_eq!(dev.current_hw_partition(), 0);
    }

    #[test]
    fn file_backed_device() {
        let user = tempfile::tempfile().unwrap();
        user.set_len(16 * 512).unwrap();
        let boot0 = tempfile::tempfile().unwrap();
        boot0.set_len(8 * 512).unwrap();

        let mut dev = DiskImage::new(vec![user, boot0]);
        assert_eq!(dev.capacity().unwrap(), 16);

        write_record(&mut dev, 1, -512, b"persist").unwrap();
        assert_eq!(read_record(&mut dev, 1, -512, 7).unwrap(), b"persist");
        assert_eq!(dev.current_hw_partition(), 0);
    }

    #[test]
    fn crossing_block_boundary() {
        let mut dev = test_device();
        let data = (0..=255).collect::<Vec<u8>>();

        write_record(&mut dev, 0, 512 - 100, &data).unwrap();
        assert_eq!(read_record(&mut dev, 0, 512 - 100, 256).unwrap(), data);
    }
}
