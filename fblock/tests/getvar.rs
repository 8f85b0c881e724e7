// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! getvar queries against an in-memory disk image.

use std::{collections::HashMap, io::Cursor};

use fblock::{
    device::{DiskImage, PartitionInfo, StaticPartitionTable},
    format::controlblock::{ControlBlock, LockState},
    getvar::{self, VarContext},
    protocol::Status,
    slot::{FixedSlots, SlotInfo},
    store,
};

fn test_device() -> DiskImage<Cursor<Vec<u8>>> {
    DiskImage::new(vec![
        Cursor::new(vec![0u8; 64 * 512]),
        Cursor::new(vec![0u8; 16 * 512]),
    ])
}

fn part(name: &str, start_lba: u64, num_blocks: u64, part_type: &str) -> PartitionInfo {
    PartitionInfo {
        name: name.to_owned(),
        start_lba,
        num_blocks,
        part_type: part_type.to_owned(),
    }
}

fn test_table() -> StaticPartitionTable {
    StaticPartitionTable(vec![
        part("misc", 24, 4, "raw"),
        part("boot_a", 28, 8, "raw"),
        part("boot_b", 36, 8, "raw"),
        part("userdata", 44, 16, "ext4"),
    ])
}

fn test_slots() -> FixedSlots {
    FixedSlots::new(
        vec![
            SlotInfo {
                suffix: "a".to_owned(),
                successful: true,
                unbootable: false,
                tries_remaining: 7,
            },
            SlotInfo {
                suffix: "b".to_owned(),
                successful: false,
                unbootable: true,
                tries_remaining: 3,
            },
        ],
        Some("a".to_owned()),
    )
}

struct Harness {
    dev: DiskImage<Cursor<Vec<u8>>>,
    table: StaticPartitionTable,
    slots: FixedSlots,
    env: HashMap<String, String>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dev: test_device(),
            table: test_table(),
            slots: test_slots(),
            env: HashMap::new(),
        }
    }

    fn query(&mut self, query: &str) -> Status {
        let mut ctx = VarContext {
            device: &mut self.dev,
            partitions: &self.table,
            slots: &self.slots,
            env: &self.env,
        };

        getvar::getvar(&mut ctx, query).status
    }

    fn query_all(&mut self) -> Vec<String> {
        let mut ctx = VarContext {
            device: &mut self.dev,
            partitions: &self.table,
            slots: &self.slots,
            env: &self.env,
        };

        let reply = getvar::getvar(&mut ctx, "all");
        assert!(reply.is_okay());
        reply.info
    }
}

fn okay(value: &str) -> Status {
    Status::Okay(value.to_owned())
}

#[test]
fn lock_state_variables() {
    let mut h = Harness::new();

    let mut cb = ControlBlock::default();
    cb.mmc_lock = LockState::Locked;
    store::save(&mut h.dev, &cb).unwrap();

    assert_eq!(h.query("unlocked"), okay("no"));
    assert_eq!(h.query("unlocked-critical"), okay("yes"));
}

#[test]
fn corrupt_control_block_reports_default_state() {
    let mut h = Harness::new();

    // Nothing persisted yet: same defaults policy as the lock engine.
    assert_eq!(h.query("unlocked"), okay("yes"));
}

#[test]
fn slot_variables() {
    let mut h = Harness::new();

    assert_eq!(h.query("slot-count"), okay("2"));
    assert_eq!(h.query("current-slot"), okay("a"));
    assert_eq!(h.query("slot-successful:a"), okay("yes"));
    assert_eq!(h.query("slot-successful:b"), okay("no"));
    assert_eq!(h.query("slot-unbootable:b"), okay("yes"));
    assert_eq!(h.query("slot-retry-count:b"), okay("3"));

    // Nonexistent slot: no answer, no env fallback match.
    assert_eq!(
        h.query("slot-successful:c"),
        Status::Fail("variable not found".to_owned()),
    );
}

#[test]
fn partition_variables() {
    let mut h = Harness::new();

    assert_eq!(h.query("partition-size:boot_a"), okay("0x1000"));
    assert_eq!(h.query("partition-size:userdata"), okay("0x2000"));
    assert_eq!(h.query("partition-type:userdata"), okay("ext4"));
    assert_eq!(h.query("has-slot:boot"), okay("yes"));
    assert_eq!(h.query("has-slot:misc"), okay("no"));
    assert_eq!(
        h.query("partition-size:nope"),
        Status::Fail("variable not found".to_owned()),
    );
}

#[test]
fn version_and_env_fallthrough() {
    let mut h = Harness::new();
    h.env
        .insert("serialno".to_owned(), "0123456789".to_owned());

    assert_eq!(h.query("version"), okay("0.4"));
    assert_eq!(h.query("serialno"), okay("0123456789"));
    assert_eq!(
        h.query("no-such-var"),
        Status::Fail("variable not found".to_owned()),
    );
}

#[test]
fn getvar_all_lists_everything() {
    let mut h = Harness::new();
    store::save(&mut h.dev, &ControlBlock::default()).unwrap();

    let info = h.query_all();

    for expected in [
        "version: 0.4",
        "unlocked: yes",
        "unlocked-critical: yes",
        "slot-count: 2",
        "current-slot: a",
        "slot-successful:a: yes",
        "slot-unbootable:b: yes",
        "slot-retry-count:a: 7",
        "has-slot:boot: yes",
        "partition-size:boot_a: 0x1000",
        "partition-type:userdata: ext4",
    ] {
        assert!(
            info.iter().any(|line| line == expected),
            "missing line {expected:?} in {info:#?}",
        );
    }
}
