// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern engine: registration and evaluation of behavioral patterns.
//!
//! Evaluation order per pattern: window filter, truncation to the most
//! recent `event_limit` events, `min_events` prerequisite, trigger, then the
//! optional analysis step. Configuration problems are registration errors;
//! evaluation itself never fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::application::analyzer::PatternAnalyzer;
use crate::domain::event::EventRecord;
use crate::domain::pattern::{
    Analysis, AnalysisSpec, PatternConfigError, PatternDefinition, PatternSpec,
};

/// A pattern evaluation that got past the window prerequisites and trigger.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: String,
    pub analysis: Analysis,
}

pub struct PatternEngine {
    patterns: Vec<PatternDefinition>,
    analyzer: Arc<PatternAnalyzer>,
}

impl PatternEngine {
    pub fn new(analyzer: Arc<PatternAnalyzer>) -> Self {
        Self { patterns: Vec::new(), analyzer }
    }

    /// Compile and register a pattern. Malformed windows and empty trigger
    /// compositions are rejected here, before any event is ever evaluated.
    pub fn register(&mut self, spec: &PatternSpec) -> Result<(), PatternConfigError> {
        let definition = spec.compile()?;
        self.patterns.push(definition);
        Ok(())
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    /// Evaluate every registered pattern against the candidate event set.
    /// Returns only detections; prerequisite failures, non-firing triggers
    /// and below-threshold analyses are all silent non-matches.
    pub async fn evaluate(&self, events: &[EventRecord], now: DateTime<Utc>) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        for pattern in &self.patterns {
            if let Some(analysis) = self.evaluate_pattern(pattern, events, now).await {
                if analysis.detected {
                    matches.push(PatternMatch { pattern: pattern.name.clone(), analysis });
                }
            }
        }
        matches
    }

    /// Evaluate one pattern. `None` means the window prerequisites failed or
    /// the trigger did not fire; `Some` carries the analysis verdict either
    /// way (the caller checks `detected`).
    pub async fn evaluate_pattern(
        &self,
        pattern: &PatternDefinition,
        events: &[EventRecord],
        now: DateTime<Utc>,
    ) -> Option<Analysis> {
        let filtered = match pattern.window.apply(events, now) {
            Some(filtered) => filtered,
            None => {
                debug!(pattern = %pattern.name, "Window prerequisites not met");
                return None;
            }
        };

        if !pattern.trigger.fires(&filtered) {
            debug!(pattern = %pattern.name, "Trigger did not fire");
            return None;
        }

        let spec = pattern.analysis.clone().unwrap_or_else(AnalysisSpec::default);
        Some(
            self.analyzer
                .analyze(&pattern.name, &spec, &pattern.window, &filtered, now)
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventId;
    use crate::domain::pattern::{KeySelector, TriggerSpec, WindowSpec};
    use chrono::Duration;
    use serde_json::json;

    fn cancellation(correlation: &str, at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            event_id: EventId::new(),
            event_type: "OrderCanceled".to_string(),
            stream_id: "order-1".to_string(),
            correlation_id: Some(correlation.to_string()),
            recorded_at: at,
            payload: json!({}),
        }
    }

    fn churn_spec(duration: &str, min_events: Option<usize>) -> PatternSpec {
        PatternSpec {
            name: "churn-risk".to_string(),
            window: WindowSpec {
                duration: duration.to_string(),
                min_events,
                event_limit: None,
                load_batch_size: None,
            },
            trigger: TriggerSpec::DistinctKeyCount {
                key: KeySelector::CorrelationId,
                min_count: 3,
            },
            analysis: Some(AnalysisSpec { prompt: None, threshold: 0.6 }),
        }
    }

    #[test]
    fn malformed_window_is_rejected_at_registration() {
        let mut engine = PatternEngine::new(Arc::new(PatternAnalyzer::rule_based_only()));
        let result = engine.register(&churn_spec("soon", None));
        assert!(matches!(result, Err(PatternConfigError::InvalidDuration(_))));
        assert!(engine.pattern_names().is_empty());
    }

    #[tokio::test]
    async fn detection_requires_window_trigger_and_threshold() {
        let now = Utc::now();
        let mut engine = PatternEngine::new(Arc::new(PatternAnalyzer::rule_based_only()));
        engine.register(&churn_spec("30d", None)).unwrap();

        // Three cancellations by the same customer inside the window.
        let events: Vec<EventRecord> = (0..3)
            .map(|i| cancellation("customer-a", now - Duration::days(i)))
            .collect();
        let matches = engine.evaluate(&events, now).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern, "churn-risk");
        assert!(matches[0].analysis.detected);
        assert_eq!(matches[0].analysis.matching_event_ids.len(), 3);

        // Spread across customers the trigger never fires.
        let events = vec![
            cancellation("customer-a", now),
            cancellation("customer-b", now),
            cancellation("customer-c", now),
        ];
        assert!(engine.evaluate(&events, now).await.is_empty());
    }

    #[tokio::test]
    async fn min_events_prerequisite_suppresses_analysis() {
        let now = Utc::now();
        let mut engine = PatternEngine::new(Arc::new(PatternAnalyzer::rule_based_only()));
        engine.register(&churn_spec("30d", Some(3))).unwrap();

        // Only the last two fall inside the 30d window.
        let events = vec![
            cancellation("customer-a", now - Duration::days(40)),
            cancellation("customer-a", now - Duration::days(20)),
            cancellation("customer-a", now - Duration::days(1)),
        ];
        assert!(engine.evaluate(&events, now).await.is_empty());
    }
}
