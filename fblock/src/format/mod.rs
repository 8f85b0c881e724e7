// SPDX-FileCopyrightText: 2025 fblock contributors
// SPDX-License-Identifier: GPL-3.0-only

pub mod bootmsg;
pub mod controlblock;
pub mod padding;
