// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! A/B slot state, as maintained by the verified-boot metadata. The engine
//! never mutates slot state; it only reports it through getvar.

pub trait SlotStates {
    /// Slot suffixes without the separator, eg. `["a", "b"]`.
    fn suffixes(&self) -> Vec<String>;

    fn current(&self) -> Option<String>;

    /// `None` when the slot does not exist.
    fn is_successful(&self, slot: &str) -> Option<bool>;

    fn is_unbootable(&self, slot: &str) -> Option<bool>;

    fn retry_count(&self, slot: &str) -> Option<u8>;
}

#[derive(Clone, Debug)]
pub struct SlotInfo {
    pub suffix: String,
    pub successful: bool,
    pub unbootable: bool,
    pub tries_remaining: u8,
}

/// Slot states captured once at startup, eg. from AVB metadata already
/// parsed by the boot chain.
#[derive(Clone, Debug)]
pub struct FixedSlots {
    slots: Vec<SlotInfo>,
    current: Option<String>,
}

impl FixedSlots {
    pub fn new(slots: Vec<SlotInfo>, current: Option<String>) -> Self {
        Self { slots, current }
    }

    fn find(&self, slot: &str) -> Option<&SlotInfo> {
        self.slots.iter().find(|s| s.suffix == slot)
    }
}

/// A healthy two-slot layout booted from slot a.
impl Default for FixedSlots {
    fn default() -> Self {
        let slot = |suffix: &str| SlotInfo {
            suffix: suffix.to_owned(),
            successful: true,
            unbootable: false,
            tries_remaining: 7,
        };

        Self::new(vec![slot("a"), slot("b")], Some("a".to_owned()))
    }
}

impl SlotStates for FixedSlots {
    fn suffixes(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.suffix.clone()).collect()
    }

    fn current(&self) -> Option<String> {
        self.current.clone()
    }

    fn is_successful(&self, slot: &str) -> Option<bool> {
        self.find(slot).map(|s| s.successful)
    }

    fn is_unbootable(&self, slot: &str) -> Option<bool> {
        self.find(slot).map(|s| s.unbootable)
    }

    fn retry_count(&self, slot: &str) -> Option<u8> {
        self.find(slot).map(|s| s.tries_remaining)
    }
}
