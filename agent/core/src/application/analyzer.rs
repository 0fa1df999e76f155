// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern analysis with graceful degradation.
//!
//! When a trigger fires, the analyzer turns the windowed event set into a
//! confidence-scored [`Analysis`]. It consults the injected reasoning
//! capability when one is configured, and falls back to the deterministic
//! rule-based scoring whenever the capability fails or returns output that
//! cannot be parsed. Analysis is infallible by construction: no code path
//! returns an error into the host pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::event::{EventId, EventRecord};
use crate::domain::pattern::{Analysis, AnalysisSpec, Window};
use crate::domain::reasoning::ReasoningProvider;

pub struct PatternAnalyzer {
    reasoning: Option<Arc<dyn ReasoningProvider>>,
}

impl PatternAnalyzer {
    pub fn new(reasoning: Option<Arc<dyn ReasoningProvider>>) -> Self {
        Self { reasoning }
    }

    pub fn rule_based_only() -> Self {
        Self { reasoning: None }
    }

    /// Analyze a filtered event window for `pattern_name`. The configured
    /// threshold decides final detection; the trigger that got us here was
    /// only a pre-filter.
    pub async fn analyze(
        &self,
        pattern_name: &str,
        spec: &AnalysisSpec,
        window: &Window,
        events: &[EventRecord],
        now: DateTime<Utc>,
    ) -> Analysis {
        if let Some(reasoning) = &self.reasoning {
            let prompt = spec
                .prompt
                .clone()
                .unwrap_or_else(|| Self::default_prompt(pattern_name));

            match reasoning.analyze(&prompt, events).await {
                Ok(insight) => {
                    let confidence = insight.confidence.clamp(0.0, 1.0);
                    return Analysis {
                        detected: confidence >= spec.threshold,
                        confidence,
                        reasoning: insight.reasoning,
                        matching_event_ids: event_ids(events),
                        data: Some(serde_json::json!({ "patterns": insight.patterns })),
                    };
                }
                Err(e) => {
                    warn!(pattern = pattern_name, error = %e,
                        "Reasoning capability unavailable, using rule-based analysis");
                }
            }
        }

        self.rule_based(pattern_name, spec, window, events, now)
    }

    /// Deterministic fallback: confidence scales with event count and gets a
    /// boost when the newest event is recent relative to the window.
    fn rule_based(
        &self,
        pattern_name: &str,
        spec: &AnalysisSpec,
        window: &Window,
        events: &[EventRecord],
        now: DateTime<Utc>,
    ) -> Analysis {
        let mut confidence = (0.4 + 0.08 * events.len() as f64).min(0.85);

        if let Some(newest) = events.iter().map(|e| e.recorded_at).max() {
            if now - newest <= window.duration / 4 {
                confidence = (confidence + 0.1).min(0.95);
            }
        }

        Analysis {
            detected: confidence >= spec.threshold,
            confidence,
            reasoning: format!(
                "Rule-based analysis: {} event(s) matched pattern '{}' within the window",
                events.len(),
                pattern_name
            ),
            matching_event_ids: event_ids(events),
            data: None,
        }
    }

    fn default_prompt(pattern_name: &str) -> String {
        format!(
            "You are analyzing a window of order-management domain events for the \
             behavioral pattern '{pattern_name}'. Decide whether the pattern is \
             present and how confident you are. Respond in JSON: \
             {{\"patterns\": [\"...\"], \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}}"
        )
    }
}

fn event_ids(events: &[EventRecord]) -> Vec<EventId> {
    events.iter().map(|e| e.event_id).collect()
}
