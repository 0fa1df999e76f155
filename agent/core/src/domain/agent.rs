// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pattern::{PatternConfigError, PatternDefinition, PatternSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of the event-stream subscription an agent instance watches
/// (e.g. "order-events"). One checkpoint exists per (agent, subscription).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Work item id assigned by the execution substrate that runs the decision
/// procedure out-of-band. Opaque to this core; carried into dead letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub String);

impl WorkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Agent profile: the static configuration an agent instance is deployed
/// with. Parsed from YAML by `infrastructure::profile`; per-agent runtime
/// overrides live in `Checkpoint::config_overrides`, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub metadata: ProfileMetadata,

    /// How long a pending approval stays actionable before it expires.
    #[serde(with = "humantime_serde", default = "default_approval_timeout")]
    pub approval_timeout: std::time::Duration,

    /// Behavioral patterns this agent watches for.
    pub patterns: Vec<PatternSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub agent_id: AgentId,
    pub subscription: SubscriptionId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_approval_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(24 * 60 * 60)
}

impl AgentProfile {
    /// Compile every pattern spec, surfacing window/trigger configuration
    /// errors here rather than at evaluation time.
    pub fn compile_patterns(&self) -> Result<Vec<PatternDefinition>, PatternConfigError> {
        self.patterns.iter().map(PatternSpec::compile).collect()
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_std(self.approval_timeout).unwrap_or_else(|_| Duration::hours(24))
    }
}
