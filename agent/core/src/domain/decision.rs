// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::EventId;

/// Idempotency key for every downstream write a decision produces.
/// Generated by the decision procedure, globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable output of one pattern-triggered analysis cycle. Produced at
/// most once per triggering event set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub decision_id: DecisionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_detected: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    /// Follow-on action type, routed downstream when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub requires_approval: bool,
    pub triggering_events: Vec<EventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Terminal result of one out-of-band decision cycle, as reported by the
/// execution substrate. The pipeline is invoked exactly once per terminal
/// outcome; transient retries happen upstream and are never seen here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// The cycle completed. `decision` is `None` when the event was
    /// intentionally skipped.
    Success { decision: Option<Decision> },
    /// The cycle failed after upstream retries were exhausted.
    Failed { error: String, attempts: u32 },
    /// The cycle was canceled before producing a result.
    Canceled,
}
