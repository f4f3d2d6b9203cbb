// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Remote job lifecycle engine: stages, launches and monitors container jobs on
//! HPC hosts over SSH, parking jobs hit by transient failures in recovery.

pub mod adapters;
pub mod app;
pub mod config;
pub mod logging;
