// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod checkpoint;
pub mod decision;
pub mod event;
pub mod lifecycle;
pub mod pattern;
pub mod reasoning;
pub mod records;
pub mod repository;
