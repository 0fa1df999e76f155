// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Reasoning Capability Domain Interface (Anti-Corruption Layer)
//
// Abstracts the pluggable reasoning model used by the analyzer. Callers must
// tolerate every error variant: a reasoning failure degrades to the
// rule-based analysis, it never propagates into the pipeline.
//
// Implementations in infrastructure/reasoning.rs.

use async_trait::async_trait;

use crate::domain::event::EventRecord;

#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Analyze a windowed event set against a pattern prompt.
    async fn analyze(
        &self,
        prompt: &str,
        events: &[EventRecord],
    ) -> Result<ReasoningInsight, ReasoningError>;
}

/// What the reasoning model reports back about a window of events.
#[derive(Debug, Clone)]
pub struct ReasoningInsight {
    /// Pattern labels the model considers present.
    pub patterns: Vec<String>,
    /// Model-reported confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Unparseable model output: {0}")]
    Unparseable(String),
}
