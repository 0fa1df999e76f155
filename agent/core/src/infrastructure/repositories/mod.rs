// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Store Implementations
//!
//! Infrastructure implementations of the persistence seams defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Stores
//!
//! Production implementations backed by PostgreSQL (`postgres` submodule).
//!
//! ## In-Memory Stores
//!
//! Thread-safe HashMap-backed implementations for development and testing.
//! They honor the same contracts as the Postgres stores: idempotent audit
//! inserts keyed by decision id, monotonic checkpoint advancement, and the
//! atomic status-plus-audit lifecycle write.

pub mod postgres;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::agent::{AgentId, SubscriptionId};
use crate::domain::checkpoint::{Checkpoint, CheckpointAdvance};
use crate::domain::lifecycle::AgentState;
use crate::domain::records::{ApprovalRecord, AuditRecord, CommandRecord, DeadLetter};
use crate::domain::repository::{
    ApprovalStore, AuditStore, CheckpointStore, CommandStore, DeadLetterStore, StoreError,
};

type CheckpointKey = (AgentId, SubscriptionId);

/// Append-only in-memory audit trail, idempotent on decision id.
#[derive(Clone)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(Vec::new())) }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<AuditRecord> {
        self.records.read().unwrap().clone()
    }

    fn insert_idempotent(&self, record: AuditRecord) {
        let mut records = self.records.write().unwrap();
        if !records.iter().any(|r| r.decision_id == record.decision_id) {
            records.push(record);
        }
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, record: AuditRecord) -> Result<(), StoreError> {
        self.insert_idempotent(record);
        Ok(())
    }
}

/// In-memory checkpoint store. Holds the audit store so the lifecycle
/// transition can write status and audit together, matching the
/// single-transaction semantics of the Postgres implementation.
#[derive(Clone)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<CheckpointKey, Checkpoint>>>,
    audits: Arc<InMemoryAuditStore>,
}

impl InMemoryCheckpointStore {
    pub fn new(audits: Arc<InMemoryAuditStore>) -> Self {
        Self { checkpoints: Arc::new(RwLock::new(HashMap::new())), audits }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load_or_create(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
    ) -> Result<Checkpoint, StoreError> {
        let mut checkpoints = self.checkpoints.write().unwrap();
        let checkpoint = checkpoints
            .entry((*agent_id, subscription_id.clone()))
            .or_insert_with(|| Checkpoint::initial(*agent_id, subscription_id.clone()));
        Ok(checkpoint.clone())
    }

    async fn advance(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        update: CheckpointAdvance,
    ) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write().unwrap();
        let checkpoint = checkpoints
            .get_mut(&(*agent_id, subscription_id.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("checkpoint {agent_id}/{subscription_id}")))?;

        // The watermark never decreases.
        if update.position > checkpoint.last_processed_position {
            checkpoint.last_processed_position = update.position;
            checkpoint.last_event_id = Some(update.event_id);
        }
        checkpoint.events_processed += 1;
        checkpoint.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_lifecycle(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        status: AgentState,
        audit: AuditRecord,
    ) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write().unwrap();
        let checkpoint = checkpoints
            .get_mut(&(*agent_id, subscription_id.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("checkpoint {agent_id}/{subscription_id}")))?;
        checkpoint.status = status;
        checkpoint.updated_at = Utc::now();
        self.audits.insert_idempotent(audit);
        Ok(())
    }

    async fn patch_config_overrides(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        overrides: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write().unwrap();
        let checkpoint = checkpoints
            .get_mut(&(*agent_id, subscription_id.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("checkpoint {agent_id}/{subscription_id}")))?;

        if let (serde_json::Value::Object(existing), serde_json::Value::Object(patch)) =
            (&mut checkpoint.config_overrides, overrides)
        {
            for (key, value) in patch {
                existing.insert(key, value);
            }
        }
        checkpoint.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemoryCommandStore {
    records: Arc<RwLock<Vec<CommandRecord>>>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(Vec::new())) }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn all(&self) -> Vec<CommandRecord> {
        self.records.read().unwrap().clone()
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn record(&self, record: CommandRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        if !records.iter().any(|r| r.decision_id == record.decision_id) {
            records.push(record);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemoryApprovalStore {
    records: Arc<RwLock<HashMap<crate::domain::records::ApprovalId, ApprovalRecord>>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn all(&self) -> Vec<ApprovalRecord> {
        self.records.read().unwrap().values().cloned().collect()
    }
}

impl Default for InMemoryApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn create(&self, record: ApprovalRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        records.entry(record.approval_id).or_insert(record);
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemoryDeadLetterStore {
    records: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(Vec::new())) }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn all(&self) -> Vec<DeadLetter> {
        self.records.read().unwrap().clone()
    }
}

impl Default for InMemoryDeadLetterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record(&self, dead_letter: DeadLetter) -> Result<(), StoreError> {
        self.records.write().unwrap().push(dead_letter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::DecisionId;
    use crate::domain::event::EventId;
    use crate::domain::records::AuditEventKind;
    use serde_json::json;

    #[tokio::test]
    async fn load_or_create_is_idempotent() {
        let audits = Arc::new(InMemoryAuditStore::new());
        let store = InMemoryCheckpointStore::new(audits);
        let agent_id = AgentId::new();
        let subscription = SubscriptionId::new("order-events");

        let first = store.load_or_create(&agent_id, &subscription).await.unwrap();
        assert_eq!(first.last_processed_position, 0);
        assert_eq!(first.status, AgentState::Stopped);

        store
            .advance(
                &agent_id,
                &subscription,
                CheckpointAdvance { position: 4, event_id: EventId::new() },
            )
            .await
            .unwrap();

        let second = store.load_or_create(&agent_id, &subscription).await.unwrap();
        assert_eq!(second.last_processed_position, 4);
    }

    #[tokio::test]
    async fn audit_store_dedupes_on_decision_id() {
        let store = InMemoryAuditStore::new();
        let decision_id = DecisionId::new();
        let record = AuditRecord::new(
            AuditEventKind::DecisionMade,
            AgentId::new(),
            decision_id,
            json!({}),
        );

        store.record(record.clone()).await.unwrap();
        store.record(record).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn advance_never_regresses_the_watermark() {
        let audits = Arc::new(InMemoryAuditStore::new());
        let store = InMemoryCheckpointStore::new(audits);
        let agent_id = AgentId::new();
        let subscription = SubscriptionId::new("order-events");
        store.load_or_create(&agent_id, &subscription).await.unwrap();

        let newer = EventId::new();
        store
            .advance(&agent_id, &subscription, CheckpointAdvance { position: 10, event_id: newer })
            .await
            .unwrap();
        store
            .advance(
                &agent_id,
                &subscription,
                CheckpointAdvance { position: 7, event_id: EventId::new() },
            )
            .await
            .unwrap();

        let checkpoint = store.load_or_create(&agent_id, &subscription).await.unwrap();
        assert_eq!(checkpoint.last_processed_position, 10);
        assert_eq!(checkpoint.last_event_id, Some(newer));
    }
}
