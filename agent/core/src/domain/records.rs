// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Durable records owned by the persistence boundary: audit entries,
//! follow-on commands, approvals and dead letters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{AgentId, SubscriptionId, WorkId};
use crate::domain::decision::DecisionId;
use crate::domain::event::EventId;

/// Closed set of audit entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    DecisionMade,
    AnalysisFailed,
    AgentStarted,
    AgentPaused,
    AgentResumed,
    AgentStopped,
    AgentReconfigured,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::DecisionMade => "decision_made",
            AuditEventKind::AnalysisFailed => "analysis_failed",
            AuditEventKind::AgentStarted => "agent_started",
            AuditEventKind::AgentPaused => "agent_paused",
            AuditEventKind::AgentResumed => "agent_resumed",
            AuditEventKind::AgentStopped => "agent_stopped",
            AuditEventKind::AgentReconfigured => "agent_reconfigured",
        }
    }
}

/// Append-only audit entry. `decision_id` is the idempotency key: a retried
/// write with the same key is a no-op. Lifecycle entries mint a fresh key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub event_type: AuditEventKind,
    pub agent_id: AgentId,
    pub decision_id: DecisionId,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        event_type: AuditEventKind,
        agent_id: AgentId,
        decision_id: DecisionId,
        payload: serde_json::Value,
    ) -> Self {
        Self { event_type, agent_id, decision_id, timestamp: Utc::now(), payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    PendingApproval,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::PendingApproval => "pending_approval",
        }
    }
}

/// Follow-on command produced by a decision. Status transitions beyond the
/// initial value are owned by the external command router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub agent_id: AgentId,
    pub decision_id: DecisionId,
    pub command_type: String,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub Uuid);

impl ApprovalId {
    /// Derived deterministically from the decision id, so a retried pipeline
    /// invocation creates the same approval rather than a second one.
    pub fn derived_from(decision_id: &DecisionId) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, decision_id.0.as_bytes()))
    }
}

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// Pending human approval for a decision that requires one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub approval_id: ApprovalId,
    pub agent_id: AgentId,
    pub decision_id: DecisionId,
    pub action: String,
    pub confidence: f64,
    pub reason: String,
    pub triggering_event_ids: Vec<EventId>,
    pub expires_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

/// Durable record of a failed processing attempt. Deliberately does not
/// advance the checkpoint, so the source event stays eligible for redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub agent_id: AgentId,
    pub subscription_id: SubscriptionId,
    pub event_id: EventId,
    pub global_position: i64,
    pub error: String,
    pub attempt_count: u32,
    pub work_id: WorkId,
}

/// Fire-and-forget routing request handed to the external command router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedCommand {
    pub decision_id: DecisionId,
    pub command_type: String,
    pub agent_id: AgentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}
