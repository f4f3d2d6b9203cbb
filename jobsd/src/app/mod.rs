// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod errors;
pub mod ports;
pub mod services;
#[cfg(test)]
pub mod testing;
pub mod types;
pub mod usecases;
