// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

//! Read-only `getvar` queries: lock state, slot state, and partition
//! metadata. Variables are dispatched through a static table; names with a
//! `:`-delimited argument suffix carry an enumerator so `getvar all` can
//! list every instance.

use crate::{
    device::{BlockDevice, PartitionTable},
    env::Environment,
    protocol::Reply,
    slot::SlotStates,
    store,
};

/// Fastboot protocol version reported to the host.
pub const FASTBOOT_VERSION: &str = "0.4";

pub struct VarContext<'a> {
    pub device: &'a mut dyn BlockDevice,
    pub partitions: &'a dyn PartitionTable,
    pub slots: &'a dyn SlotStates,
    pub env: &'a dyn Environment,
}

struct VarDef {
    name: &'static str,
    /// For variables taking a `:`-suffixed argument: enumerate the argument
    /// values that `getvar all` should report.
    list_args: Option<fn(&mut VarContext) -> Vec<String>>,
    /// `None` means "no answer"; the query then falls through to the
    /// environment.
    get: fn(&mut VarContext, Option<&str>) -> Option<String>,
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_owned()
}

fn lock_states(ctx: &mut VarContext) -> Option<(bool, bool)> {
    // Reports the same recovered defaults the lock engine would use when
    // the stored block is corrupt.
    let cb = store::load_or_default(ctx.device).ok()?;
    Some((cb.mmc_lock.is_unlocked(), cb.ipl_lock.is_unlocked()))
}

fn partition_names(ctx: &mut VarContext) -> Vec<String> {
    ctx.partitions
        .list()
        .iter()
        .map(|p| p.name.clone())
        .collect()
}

fn slot_suffixes(ctx: &mut VarContext) -> Vec<String> {
    ctx.slots.suffixes()
}

/// Base names that have per-slot copies, ie. `foo` for every `foo_a`.
fn slotted_base_names(ctx: &mut VarContext) -> Vec<String> {
    ctx.partitions
        .list()
        .iter()
        .filter_map(|p| p.name.strip_suffix("_a"))
        .map(str::to_owned)
        .collect()
}

static VARIABLES: &[VarDef] = &[
    VarDef {
        name: "version",
        list_args: None,
        get: |_, _| Some(FASTBOOT_VERSION.to_owned()),
    },
    VarDef {
        name: "unlocked",
        list_args: None,
        get: |ctx, _| lock_states(ctx).map(|(mmc, _)| yes_no(mmc)),
    },
    VarDef {
        name: "unlocked-critical",
        list_args: None,
        get: |ctx, _| lock_states(ctx).map(|(_, ipl)| yes_no(ipl)),
    },
    VarDef {
        name: "slot-count",
        list_args: None,
        get: |ctx, _| Some(ctx.slots.suffixes().len().to_string()),
    },
    VarDef {
        name: "current-slot",
        list_args: None,
        get: |ctx, _| ctx.slots.current(),
    },
    VarDef {
        name: "slot-successful",
        list_args: Some(slot_suffixes),
        get: |ctx, arg| ctx.slots.is_successful(arg?).map(yes_no),
    },
    VarDef {
        name: "slot-unbootable",
        list_args: Some(slot_suffixes),
        get: |ctx, arg| ctx.slots.is_unbootable(arg?).map(yes_no),
    },
    VarDef {
        name: "slot-retry-count",
        list_args: Some(slot_suffixes),
        get: |ctx, arg| ctx.slots.retry_count(arg?).map(|n| n.to_string()),
    },
    VarDef {
        name: "has-slot",
        list_args: Some(slotted_base_names),
        get: |ctx, arg| {
            let name = arg?;
            if ctx.partitions.find(&format!("{name}_a")).is_some() {
                Some(yes_no(true))
            } else if ctx.partitions.find(name).is_some() {
                Some(yes_no(false))
            } else {
                None
            }
        },
    },
    VarDef {
        name: "partition-size",
        list_args: Some(partition_names),
        get: |ctx, arg| {
            let block_size = ctx.device.block_size();
            ctx.partitions
                .find(arg?)
                .map(|p| format!("{:#x}", p.size_bytes(block_size)))
        },
    },
    VarDef {
        name: "partition-type",
        list_args: Some(partition_names),
        get: |ctx, arg| ctx.partitions.find(arg?).map(|p| p.part_type.clone()),
    },
];

fn getvar_all(ctx: &mut VarContext) -> Reply {
    let mut reply = Reply::okay("");

    for def in VARIABLES {
        match def.list_args {
            None => {
                if let Some(value) = (def.get)(ctx, None) {
                    reply.push_info(format!("{}: {value}", def.name));
                }
            }
            Some(list) => {
                for arg in list(ctx) {
                    if let Some(value) = (def.get)(ctx, Some(&arg)) {
                        reply.push_info(format!("{}:{arg}: {value}", def.name));
                    }
                }
            }
        }
    }

    reply
}

/// Answer a single `getvar <query>` request. Unknown names fall through to
/// the environment before failing.
pub fn getvar(ctx: &mut VarContext<'_>, query: &str) -> Reply {
    if query == "all" {
        return getvar_all(ctx);
    }

    let (name, arg) = match query.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (query, None),
    };

    if let Some(def) = VARIABLES.iter().find(|d| d.name == name)
        && let Some(value) = (def.get)(ctx, arg)
    {
        return Reply::okay(value);
    }

    match ctx.env.get(query) {
        Some(value) => Reply::okay(value),
        None => Reply::fail("variable not found"),
    }
}
