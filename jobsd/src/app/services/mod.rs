// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod backoff;
pub mod context;
pub mod launcher;
pub mod monitor;
pub mod random;
pub mod recovery;
pub mod registry;
pub mod shell;
pub mod stager;
