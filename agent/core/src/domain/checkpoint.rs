// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, SubscriptionId};
use crate::domain::event::EventId;
use crate::domain::lifecycle::AgentState;

/// Durable processing state for one (agent, subscription) pair.
///
/// `last_processed_position` is the idempotency watermark and never
/// decreases. Created lazily via load-or-create; retired by setting
/// `status = stopped`, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub agent_id: AgentId,
    pub subscription_id: SubscriptionId,
    pub last_processed_position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<EventId>,
    pub status: AgentState,
    pub events_processed: i64,
    /// Opaque patch over the agent's static profile, merged on reconfigure.
    #[serde(default)]
    pub config_overrides: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn initial(agent_id: AgentId, subscription_id: SubscriptionId) -> Self {
        Self {
            agent_id,
            subscription_id,
            last_processed_position: 0,
            last_event_id: None,
            status: AgentState::Stopped,
            events_processed: 0,
            config_overrides: serde_json::Value::Object(Default::default()),
            updated_at: Utc::now(),
        }
    }

    /// True when `position` was already fully persisted by a prior
    /// invocation — the idempotency gate.
    pub fn already_processed(&self, position: i64) -> bool {
        self.last_processed_position >= position
    }
}

/// Checkpoint advancement written strictly after every other decision
/// effect. Always increments `events_processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointAdvance {
    pub position: i64,
    pub event_id: EventId,
}
