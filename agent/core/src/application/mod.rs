// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod analyzer;
pub mod engine;
pub mod lifecycle;
pub mod pipeline;
