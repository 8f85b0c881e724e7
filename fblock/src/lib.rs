// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! fblock implements the fastboot lock-state engine used on eMMC-booted
//! devices: a CRC-protected control block persisted on a raw boot hardware
//! partition, the `flashing lock`/`unlock` policy around it, anti-rollback
//! counters, the FRP unlock-ability check, and the `getvar` query surface.
//!
//! fblock is primarily an application that operates on raw disk images. The
//! Rust APIs can change at any time, even in patch releases.

pub mod cli;
pub mod device;
pub mod env;
pub mod flashing;
pub mod format;
pub mod frp;
pub mod getvar;
pub mod protocol;
pub mod slot;
pub mod store;
pub mod wipe;
