// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Store Implementations
//!
//! Production implementations of the persistence seams backed by the
//! `agent_checkpoints`, `agent_audit_log`, `agent_commands`,
//! `agent_approvals` and `agent_dead_letters` tables via `sqlx`.
//!
//! Contracts relied on by the pipeline:
//! - checkpoint creation is `INSERT .. ON CONFLICT DO NOTHING` followed by a
//!   read, so load-or-create is safe under concurrent first deliveries;
//! - checkpoint advancement uses `GREATEST` so the watermark is monotonic
//!   even if a stale writer slips past the in-process idempotency gate;
//! - audit inserts are `ON CONFLICT (decision_id) DO NOTHING`, making a
//!   retried write with the same key a no-op;
//! - the lifecycle transition writes status and audit in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::agent::{AgentId, SubscriptionId};
use crate::domain::checkpoint::{Checkpoint, CheckpointAdvance};
use crate::domain::event::EventId;
use crate::domain::lifecycle::AgentState;
use crate::domain::records::{ApprovalRecord, AuditRecord, CommandRecord, DeadLetter};
use crate::domain::repository::{
    ApprovalStore, AuditStore, CheckpointStore, CommandStore, DeadLetterStore, StoreError,
};

pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_checkpoint(row: &sqlx::postgres::PgRow) -> Result<Checkpoint, StoreError> {
        let agent_id: uuid::Uuid = row.get("agent_id");
        let subscription_id: String = row.get("subscription_id");
        let last_event_id: Option<uuid::Uuid> = row.get("last_event_id");
        let status_str: String = row.get("status");
        let status = AgentState::from_str(&status_str)
            .ok_or_else(|| StoreError::Serialization(format!("Unknown status '{status_str}'")))?;

        Ok(Checkpoint {
            agent_id: AgentId(agent_id),
            subscription_id: SubscriptionId(subscription_id),
            last_processed_position: row.get("last_processed_position"),
            last_event_id: last_event_id.map(EventId),
            status,
            events_processed: row.get("events_processed"),
            config_overrides: row.get("config_overrides"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load_or_create(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
    ) -> Result<Checkpoint, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_checkpoints (
                agent_id, subscription_id, last_processed_position, last_event_id,
                status, events_processed, config_overrides, updated_at
            )
            VALUES ($1, $2, 0, NULL, 'stopped', 0, '{}'::jsonb, NOW())
            ON CONFLICT (agent_id, subscription_id) DO NOTHING
            "#,
        )
        .bind(agent_id.0)
        .bind(&subscription_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to create checkpoint: {e}")))?;

        let row = sqlx::query(
            r#"
            SELECT agent_id, subscription_id, last_processed_position, last_event_id,
                   status, events_processed, config_overrides, updated_at
            FROM agent_checkpoints
            WHERE agent_id = $1 AND subscription_id = $2
            "#,
        )
        .bind(agent_id.0)
        .bind(&subscription_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Self::row_to_checkpoint(&row)
    }

    async fn advance(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        update: CheckpointAdvance,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE agent_checkpoints
            SET last_processed_position = GREATEST(last_processed_position, $3),
                last_event_id = CASE
                    WHEN $3 > last_processed_position THEN $4
                    ELSE last_event_id
                END,
                events_processed = events_processed + 1,
                updated_at = NOW()
            WHERE agent_id = $1 AND subscription_id = $2
            "#,
        )
        .bind(agent_id.0)
        .bind(&subscription_id.0)
        .bind(update.position)
        .bind(update.event_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to advance checkpoint: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "checkpoint {agent_id}/{subscription_id}"
            )));
        }
        Ok(())
    }

    async fn transition_lifecycle(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        status: AgentState,
        audit: AuditRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE agent_checkpoints
            SET status = $3, updated_at = NOW()
            WHERE agent_id = $1 AND subscription_id = $2
            "#,
        )
        .bind(agent_id.0)
        .bind(&subscription_id.0)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to update status: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_audit_log (decision_id, agent_id, event_type, payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (decision_id) DO NOTHING
            "#,
        )
        .bind(audit.decision_id.0)
        .bind(audit.agent_id.0)
        .bind(audit.event_type.as_str())
        .bind(&audit.payload)
        .bind(audit.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to write lifecycle audit: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn patch_config_overrides(
        &self,
        agent_id: &AgentId,
        subscription_id: &SubscriptionId,
        overrides: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE agent_checkpoints
            SET config_overrides = config_overrides || $3, updated_at = NOW()
            WHERE agent_id = $1 AND subscription_id = $2
            "#,
        )
        .bind(agent_id.0)
        .bind(&subscription_id.0)
        .bind(&overrides)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to patch overrides: {e}")))?;
        Ok(())
    }
}

pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn record(&self, record: AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_audit_log (decision_id, agent_id, event_type, payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (decision_id) DO NOTHING
            "#,
        )
        .bind(record.decision_id.0)
        .bind(record.agent_id.0)
        .bind(record.event_type.as_str())
        .bind(&record.payload)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to write audit record: {e}")))?;
        Ok(())
    }
}

pub struct PostgresCommandStore {
    pool: PgPool,
}

impl PostgresCommandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommandStore for PostgresCommandStore {
    async fn record(&self, record: CommandRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_commands (decision_id, agent_id, command_type, payload, status, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (decision_id) DO NOTHING
            "#,
        )
        .bind(record.decision_id.0)
        .bind(record.agent_id.0)
        .bind(&record.command_type)
        .bind(&record.payload)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to write command record: {e}")))?;
        Ok(())
    }
}

pub struct PostgresApprovalStore {
    pool: PgPool,
}

impl PostgresApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for PostgresApprovalStore {
    async fn create(&self, record: ApprovalRecord) -> Result<(), StoreError> {
        let triggering: Vec<uuid::Uuid> =
            record.triggering_event_ids.iter().map(|e| e.0).collect();

        sqlx::query(
            r#"
            INSERT INTO agent_approvals (
                approval_id, agent_id, decision_id, action, confidence, reason,
                triggering_event_ids, expires_at, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', NOW())
            ON CONFLICT (approval_id) DO NOTHING
            "#,
        )
        .bind(record.approval_id.0)
        .bind(record.agent_id.0)
        .bind(record.decision_id.0)
        .bind(&record.action)
        .bind(record.confidence)
        .bind(&record.reason)
        .bind(&triggering)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to create approval: {e}")))?;
        Ok(())
    }
}

pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterStore {
    async fn record(&self, dead_letter: DeadLetter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_dead_letters (
                agent_id, subscription_id, event_id, global_position, error,
                attempt_count, work_id, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (agent_id, event_id) DO UPDATE SET
                error = EXCLUDED.error,
                attempt_count = EXCLUDED.attempt_count,
                work_id = EXCLUDED.work_id,
                recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(dead_letter.agent_id.0)
        .bind(&dead_letter.subscription_id.0)
        .bind(dead_letter.event_id.0)
        .bind(dead_letter.global_position)
        .bind(&dead_letter.error)
        .bind(dead_letter.attempt_count as i32)
        .bind(&dead_letter.work_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to write dead letter: {e}")))?;
        Ok(())
    }
}
