// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Persistence Seams
//!
//! Store contracts consumed by the pipeline and lifecycle handlers, defined
//! in the domain layer and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `CheckpointStore` | `Checkpoint` | `InMemoryCheckpointStore`, `PostgresCheckpointStore` |
//! | `AuditStore` | `AuditRecord` | `InMemoryAuditStore`, `PostgresAuditStore` |
//! | `CommandStore` | `CommandRecord` | `InMemoryCommandStore`, `PostgresCommandStore` |
//! | `ApprovalStore` | `ApprovalRecord` | `InMemoryApprovalStore`, `PostgresApprovalStore` |
//! | `DeadLetterStore` | `DeadLetter` | `InMemoryDeadLetterStore`, `PostgresDeadLetterStore` |
//!
//! The host store serializes concurrent writers of the same checkpoint; no
//! locks are taken here. Cross-invocation safety rests on the idempotency
//! gate plus the monotonic-position discipline in `CheckpointStore::advance`.

use async_trait::async_trait;

use crate::domain::agent::{AgentId, SubscriptionId};
use crate::domain::checkpoint::{Checkpoint, CheckpointAdvance};
use crate::domain::lifecycle::AgentState;
use crate::domain::records::{ApprovalRecord, AuditRecord, CommandRecord, DeadLetter, RoutedCommand};

/// Checkpoint persistence. The checkpoint is the only record mutated by both
/// event processing and administrative commands; both paths go through
/// load-or-create-then-update.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Idempotent: returns the existing checkpoint or creates the initial one.
    async fn load_or_create(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
    ) -> Result<Checkpoint, StoreError>;

    /// Advance the watermark. Implementations must keep
    /// `last_processed_position` monotonic under concurrent writers.
    async fn advance(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        update: CheckpointAdvance,
    ) -> Result<(), StoreError>;

    /// Atomically write the new lifecycle status plus its audit record.
    async fn transition_lifecycle(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        status: AgentState,
        audit: AuditRecord,
    ) -> Result<(), StoreError>;

    /// Merge `overrides` into the stored config patch (shallow key merge).
    async fn patch_config_overrides(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        overrides: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Append-only audit trail, idempotent on `decision_id`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn record(&self, record: CommandRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn create(&self, record: ApprovalRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn record(&self, dead_letter: DeadLetter) -> Result<(), StoreError>;
}

/// Downstream command routing. Fire-and-forget: a scheduling failure is
/// logged by the caller and never blocks checkpoint advancement.
#[async_trait]
pub trait CommandRouter: Send + Sync {
    async fn schedule(&self, command: RoutedCommand) -> Result<(), StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Row not found".to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
