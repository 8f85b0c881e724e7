// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! RAM scrubbing after an unlock. Secrets from the previous, more-trusted
//! session must not survive into the newly unlocked one, so every RAM bank
//! is zeroed except for the running bootloader's own footprint.

use std::ops::Range;

use tracing::{debug, info};

pub trait RamWipe {
    fn wipe(&mut self);
}

impl<F: FnMut()> RamWipe for F {
    fn wipe(&mut self) {
        self()
    }
}

/// No-op wipe for host-side tools that do not run on the device whose RAM
/// would be scrubbed.
pub struct NoopWipe;

impl RamWipe for NoopWipe {
    fn wipe(&mut self) {
        debug!("Skipping RAM wipe: not running on target hardware");
    }
}

/// One contiguous RAM bank with its physical base address.
pub struct Bank<'a> {
    pub base: u64,
    pub mem: &'a mut [u8],
}

/// The configured RAM banks plus the address range occupied by the running
/// bootloader (code, data, and stack), which must be left intact.
pub struct MemoryBanks<'a> {
    banks: Vec<Bank<'a>>,
    reserved: Range<u64>,
}

impl<'a> MemoryBanks<'a> {
    pub fn new(banks: Vec<Bank<'a>>, reserved: Range<u64>) -> Self {
        Self { banks, reserved }
    }
}

impl RamWipe for MemoryBanks<'_> {
    fn wipe(&mut self) {
        for bank in &mut self.banks {
            let start = bank.base;
            let end = start + bank.mem.len() as u64;

            let keep_start = self.reserved.start.clamp(start, end);
            let keep_end = self.reserved.end.clamp(keep_start, end);

            bank.mem[..(keep_start - start) as usize].fill(0);
            bank.mem[(keep_end - start) as usize..].fill(0);

            info!(
                "Wiped RAM bank {start:#x}..{end:#x}, kept {keep_start:#x}..{keep_end:#x}",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipes_outside_reserved_range() {
        let mut low = vec![0xaa; 0x100];
        let mut high = vec![0xbb; 0x100];

        let mut banks = MemoryBanks::new(
            vec![
                Bank {
                    base: 0x1000,
                    mem: &mut low,
                },
                Bank {
                    base: 0x2000,
                    mem: &mut high,
                },
            ],
            0x1040..0x1080,
        );
        banks.wipe();
        drop(banks);

        assert_eq!(&low[..0x40], &[0u8; 0x40][..]);
        assert_eq!(&low[0x40..0x80], &[0xaa; 0x40][..]);
        assert_eq!(&low[0x80..], &[0u8; 0x80][..]);
        assert!(high.iter().all(|b| *b == 0));
    }

    #[test]
    fn reserved_range_outside_bank() {
        let mut mem = vec![0xcc; 0x40];

        let mut banks = MemoryBanks::new(
            vec![Bank {
                base: 0,
                mem: &mut mem,
            }],
            0x8000..0x9000,
        );
        banks.wipe();
        drop(banks);

        assert!(mem.iter().all(|b| *b == 0));
    }
}
