// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Profile YAML Parser
//!
//! Parses agent deployment profiles into domain objects and compiles every
//! pattern eagerly, so window and trigger configuration errors surface at
//! load time rather than during evaluation.
//!
//! # Profile Format
//!
//! ```yaml
//! metadata:
//!   agentId: 6f2f9e1a-3c44-4b5e-9d14-2a2f6d9a8b10
//!   subscription: order-events
//!   name: churn-watch
//! approvalTimeout: 24h
//! patterns:
//!   - name: churn-risk
//!     window:
//!       duration: 30d
//!       minEvents: 3
//!     trigger:
//!       type: distinct_key_count
//!       key: { type: correlation_id }
//!       min_count: 3
//!     analysis:
//!       threshold: 0.7
//! ```

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::domain::agent::AgentProfile;

pub struct AgentProfileParser;

impl AgentProfileParser {
    /// Parse an agent profile from a YAML string.
    pub fn parse_yaml(yaml: &str) -> Result<AgentProfile> {
        let profile: AgentProfile =
            serde_yaml::from_str(yaml).context("Failed to parse YAML profile")?;

        // Compile patterns now; discard the result. Registration does it
        // again, this is purely eager validation.
        profile
            .compile_patterns()
            .map_err(|e| anyhow!("Profile validation failed: {e}"))?;

        Ok(profile)
    }

    /// Parse an agent profile from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<AgentProfile> {
        let yaml = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read profile file: {}", path.as_ref().display())
        })?;
        Self::parse_yaml(&yaml)
    }
}
