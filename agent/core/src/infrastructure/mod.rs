// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod profile;
pub mod reasoning;
pub mod repositories;
