// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Vigil Agent Core
//!
//! Decision-making and state-persistence core of the Vigil monitoring agent
//! embedded in the event-sourced order-management platform.
//!
//! # Architecture
//!
//! - **domain** — pure types and the persistence/reasoning seams
//! - **application** — pattern engine, decision pipeline, lifecycle handlers
//! - **infrastructure** — Postgres and in-memory stores, reasoning adapter,
//!   profile parsing

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
