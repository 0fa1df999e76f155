// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Behavioral pattern definitions: evaluation windows and triggers.
//!
//! A trigger is a cheap, pure predicate over a windowed event set. It gates
//! whether the (potentially expensive) analysis step runs at all; final
//! detection is decided later by the analyzer's confidence threshold.
//!
//! Window and trigger specs are the serializable form carried in agent
//! profiles. They are compiled into runtime values at registration time,
//! which is also where every configuration error surfaces — a malformed
//! window never reaches evaluation.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::event::{EventId, EventRecord};

#[derive(Debug, Error)]
pub enum PatternConfigError {
    #[error("Invalid window duration '{0}': expected {{N}}d, {{N}}h or {{N}}m")]
    InvalidDuration(String),

    #[error("Window duration '{0}' must be positive")]
    NonPositiveDuration(String),

    #[error("Pattern '{0}' has an empty trigger composition")]
    EmptyComposition(String),
}

/// Serializable window spec, as written in an agent profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    /// `{N}d`, `{N}h` or `{N}m`.
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_events: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_batch_size: Option<usize>,
}

/// Compiled evaluation window.
#[derive(Debug, Clone)]
pub struct Window {
    pub duration: Duration,
    pub min_events: Option<usize>,
    pub event_limit: Option<usize>,
    pub load_batch_size: Option<usize>,
}

impl Window {
    pub fn compile(spec: &WindowSpec) -> Result<Self, PatternConfigError> {
        Ok(Self {
            duration: parse_window_duration(&spec.duration)?,
            min_events: spec.min_events,
            event_limit: spec.event_limit,
            load_batch_size: spec.load_batch_size,
        })
    }

    /// Filter to `[now - duration, now]`, truncate to the `event_limit`
    /// most-recent events, then apply the `min_events` prerequisite.
    /// `min_events` is checked after truncation, so a limit can legitimately
    /// shrink the set below the prerequisite and suppress evaluation.
    pub fn apply(&self, events: &[EventRecord], now: DateTime<Utc>) -> Option<Vec<EventRecord>> {
        let cutoff = now - self.duration;
        let mut filtered: Vec<EventRecord> = events
            .iter()
            .filter(|e| e.recorded_at >= cutoff && e.recorded_at <= now)
            .cloned()
            .collect();
        filtered.sort_by_key(|e| e.recorded_at);

        if let Some(limit) = self.event_limit {
            if filtered.len() > limit {
                filtered.drain(..filtered.len() - limit);
            }
        }

        if filtered.len() < self.min_events.unwrap_or(1) {
            return None;
        }
        Some(filtered)
    }
}

/// Parse a window duration of the form `{N}d`, `{N}h` or `{N}m`.
pub fn parse_window_duration(s: &str) -> Result<Duration, PatternConfigError> {
    let s = s.trim();
    // Split on the char boundary, not the byte: the unit position may be
    // multi-byte in arbitrary profile input.
    let Some((idx, unit)) = s.char_indices().last() else {
        return Err(PatternConfigError::InvalidDuration(s.to_string()));
    };
    let n: i64 = s[..idx]
        .parse()
        .map_err(|_| PatternConfigError::InvalidDuration(s.to_string()))?;
    if n <= 0 {
        return Err(PatternConfigError::NonPositiveDuration(s.to_string()));
    }
    match unit {
        'd' => Ok(Duration::days(n)),
        'h' => Ok(Duration::hours(n)),
        'm' => Ok(Duration::minutes(n)),
        _ => Err(PatternConfigError::InvalidDuration(s.to_string())),
    }
}

/// Grouping key used by the distinct-correlation-key trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySelector {
    /// Per-customer / per-saga correlation id.
    CorrelationId,
    /// Source stream id.
    StreamId,
    /// A top-level string attribute of the event payload.
    Attribute { name: String },
}

impl KeySelector {
    pub fn select<'a>(&self, event: &'a EventRecord) -> Option<&'a str> {
        match self {
            KeySelector::CorrelationId => event.correlation_id.as_deref(),
            KeySelector::StreamId => Some(event.stream_id.as_str()),
            KeySelector::Attribute { name } => event.payload.get(name).and_then(|v| v.as_str()),
        }
    }
}

/// Pure predicate over the filtered event set.
pub trait Trigger: Send + Sync {
    fn fires(&self, events: &[EventRecord]) -> bool;
}

/// Conjunction: fires only when every child fires on the same event set.
pub struct All(pub Vec<Box<dyn Trigger>>);

impl Trigger for All {
    fn fires(&self, events: &[EventRecord]) -> bool {
        self.0.iter().all(|t| t.fires(events))
    }
}

/// Disjunction: fires when any child fires.
pub struct Any(pub Vec<Box<dyn Trigger>>);

impl Trigger for Any {
    fn fires(&self, events: &[EventRecord]) -> bool {
        self.0.iter().any(|t| t.fires(events))
    }
}

/// Fires when at least `min_count` events carry one of the given types.
pub struct EventTypeCount {
    pub event_types: Vec<String>,
    pub min_count: usize,
}

impl Trigger for EventTypeCount {
    fn fires(&self, events: &[EventRecord]) -> bool {
        let count = events
            .iter()
            .filter(|e| self.event_types.iter().any(|t| t == &e.event_type))
            .count();
        count >= self.min_count
    }
}

/// Fires when any single grouping key accumulates `min_count` events within
/// the window. Single pass to build the frequency map, then a threshold scan.
pub struct DistinctKeyCount {
    pub key: KeySelector,
    pub min_count: usize,
}

impl Trigger for DistinctKeyCount {
    fn fires(&self, events: &[EventRecord]) -> bool {
        let mut buckets: HashMap<&str, usize> = HashMap::new();
        for event in events {
            if let Some(key) = self.key.select(event) {
                *buckets.entry(key).or_insert(0) += 1;
            }
        }
        buckets.values().any(|&count| count >= self.min_count)
    }
}

/// Serializable trigger composition, compiled into the runtime trait tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    All { triggers: Vec<TriggerSpec> },
    Any { triggers: Vec<TriggerSpec> },
    EventTypeCount { event_types: Vec<String>, min_count: usize },
    DistinctKeyCount { key: KeySelector, min_count: usize },
}

impl TriggerSpec {
    pub fn compile(&self, pattern: &str) -> Result<Box<dyn Trigger>, PatternConfigError> {
        match self {
            TriggerSpec::All { triggers } => {
                if triggers.is_empty() {
                    return Err(PatternConfigError::EmptyComposition(pattern.to_string()));
                }
                let compiled = triggers
                    .iter()
                    .map(|t| t.compile(pattern))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(All(compiled)))
            }
            TriggerSpec::Any { triggers } => {
                if triggers.is_empty() {
                    return Err(PatternConfigError::EmptyComposition(pattern.to_string()));
                }
                let compiled = triggers
                    .iter()
                    .map(|t| t.compile(pattern))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(Any(compiled)))
            }
            TriggerSpec::EventTypeCount { event_types, min_count } => Ok(Box::new(EventTypeCount {
                event_types: event_types.clone(),
                min_count: *min_count,
            })),
            TriggerSpec::DistinctKeyCount { key, min_count } => Ok(Box::new(DistinctKeyCount {
                key: key.clone(),
                min_count: *min_count,
            })),
        }
    }
}

/// Analysis step configuration. The threshold is internal to the analyzer:
/// the trigger is only a pre-filter, confidence decides detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for AnalysisSpec {
    fn default() -> Self {
        Self { prompt: None, threshold: default_threshold() }
    }
}

fn default_threshold() -> f64 {
    0.7
}

/// Serializable pattern spec, one entry of an agent profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSpec {
    pub name: String,
    pub window: WindowSpec,
    pub trigger: TriggerSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisSpec>,
}

impl PatternSpec {
    pub fn compile(&self) -> Result<PatternDefinition, PatternConfigError> {
        Ok(PatternDefinition {
            name: self.name.clone(),
            window: Window::compile(&self.window)?,
            trigger: self.trigger.compile(&self.name)?,
            analysis: self.analysis.clone(),
        })
    }
}

/// Compiled pattern, ready for evaluation.
pub struct PatternDefinition {
    pub name: String,
    pub window: Window,
    pub trigger: Box<dyn Trigger>,
    pub analysis: Option<AnalysisSpec>,
}

/// Result of one analysis run over a windowed event set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub detected: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub matching_event_ids: Vec<EventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_at(event_type: &str, correlation: Option<&str>, at: DateTime<Utc>) -> EventRecord {
        EventRecord {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            stream_id: "order-123".to_string(),
            correlation_id: correlation.map(|s| s.to_string()),
            recorded_at: at,
            payload: json!({}),
        }
    }

    struct Fixed(bool);

    impl Trigger for Fixed {
        fn fires(&self, _events: &[EventRecord]) -> bool {
            self.0
        }
    }

    #[test]
    fn duration_units_parse() {
        assert_eq!(parse_window_duration("30d").unwrap(), Duration::days(30));
        assert_eq!(parse_window_duration("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_window_duration("5m").unwrap(), Duration::minutes(5));
    }

    #[test]
    fn malformed_zero_and_negative_durations_are_config_errors() {
        assert!(matches!(
            parse_window_duration("30x"),
            Err(PatternConfigError::InvalidDuration(_))
        ));
        assert!(matches!(
            parse_window_duration("abc"),
            Err(PatternConfigError::InvalidDuration(_))
        ));
        assert!(matches!(parse_window_duration(""), Err(PatternConfigError::InvalidDuration(_))));
        // Multi-byte unit characters are a config error, not a panic.
        assert!(matches!(
            parse_window_duration("30µ"),
            Err(PatternConfigError::InvalidDuration(_))
        ));
        assert!(matches!(parse_window_duration("µ"), Err(PatternConfigError::InvalidDuration(_))));
        assert!(matches!(
            parse_window_duration("0d"),
            Err(PatternConfigError::NonPositiveDuration(_))
        ));
        assert!(matches!(
            parse_window_duration("-3h"),
            Err(PatternConfigError::NonPositiveDuration(_))
        ));
    }

    #[test]
    fn window_filters_to_duration_and_enforces_min_events() {
        let now = Utc::now();
        let events = vec![
            event_at("OrderCanceled", None, now - Duration::days(40)),
            event_at("OrderCanceled", None, now - Duration::days(20)),
            event_at("OrderCanceled", None, now - Duration::days(1)),
        ];

        let window = Window {
            duration: Duration::days(30),
            min_events: None,
            event_limit: None,
            load_batch_size: None,
        };
        let filtered = window.apply(&events, now).unwrap();
        assert_eq!(filtered.len(), 2);

        // Same events with minEvents = 3: prerequisite fails, no evaluation.
        let window = Window { min_events: Some(3), ..window };
        assert!(window.apply(&events, now).is_none());
    }

    #[test]
    fn event_limit_keeps_the_most_recent_and_is_applied_before_min_events() {
        let now = Utc::now();
        let events: Vec<EventRecord> = (0..5)
            .map(|i| event_at("OrderCanceled", None, now - Duration::hours(i)))
            .collect();

        let window = Window {
            duration: Duration::days(1),
            min_events: Some(3),
            event_limit: Some(2),
            load_batch_size: None,
        };
        // Truncation to 2 happens first, so minEvents = 3 can no longer hold.
        assert!(window.apply(&events, now).is_none());

        let window = Window { min_events: Some(2), ..window };
        let filtered = window.apply(&events, now).unwrap();
        assert_eq!(filtered.len(), 2);
        // Most-recent survive, in ascending timestamp order.
        assert!(filtered[0].recorded_at < filtered[1].recorded_at);
        assert_eq!(filtered[1].recorded_at, now);
    }

    #[test]
    fn all_fires_only_when_both_fire_any_when_either_does() {
        let events = vec![event_at("OrderCanceled", None, Utc::now())];

        assert!(All(vec![Box::new(Fixed(true)), Box::new(Fixed(true))]).fires(&events));
        assert!(!All(vec![Box::new(Fixed(true)), Box::new(Fixed(false))]).fires(&events));
        assert!(!All(vec![Box::new(Fixed(false)), Box::new(Fixed(false))]).fires(&events));

        assert!(Any(vec![Box::new(Fixed(true)), Box::new(Fixed(false))]).fires(&events));
        assert!(Any(vec![Box::new(Fixed(false)), Box::new(Fixed(true))]).fires(&events));
        assert!(!Any(vec![Box::new(Fixed(false)), Box::new(Fixed(false))]).fires(&events));
    }

    #[test]
    fn event_type_count_trigger() {
        let now = Utc::now();
        let events = vec![
            event_at("OrderCanceled", None, now),
            event_at("OrderPlaced", None, now),
            event_at("OrderCanceled", None, now),
        ];

        let trigger = EventTypeCount {
            event_types: vec!["OrderCanceled".to_string()],
            min_count: 2,
        };
        assert!(trigger.fires(&events));

        let trigger = EventTypeCount {
            event_types: vec!["OrderCanceled".to_string()],
            min_count: 3,
        };
        assert!(!trigger.fires(&events));
    }

    #[test]
    fn distinct_key_count_needs_one_bucket_over_threshold() {
        let now = Utc::now();
        let events = vec![
            event_at("OrderCanceled", Some("customer-a"), now),
            event_at("OrderCanceled", Some("customer-b"), now),
            event_at("OrderCanceled", Some("customer-a"), now),
            event_at("OrderCanceled", None, now),
        ];

        let trigger = DistinctKeyCount { key: KeySelector::CorrelationId, min_count: 2 };
        assert!(trigger.fires(&events));

        let trigger = DistinctKeyCount { key: KeySelector::CorrelationId, min_count: 3 };
        assert!(!trigger.fires(&events));
    }

    #[test]
    fn key_selector_reads_payload_attributes() {
        let mut event = event_at("OrderCanceled", None, Utc::now());
        event.payload = json!({ "customerId": "c-42" });

        let selector = KeySelector::Attribute { name: "customerId".to_string() };
        assert_eq!(selector.select(&event), Some("c-42"));
        let selector = KeySelector::Attribute { name: "missing".to_string() };
        assert_eq!(selector.select(&event), None);
    }

    #[test]
    fn trigger_spec_compiles_and_rejects_empty_compositions() {
        let spec = TriggerSpec::All {
            triggers: vec![
                TriggerSpec::EventTypeCount {
                    event_types: vec!["OrderCanceled".to_string()],
                    min_count: 1,
                },
                TriggerSpec::DistinctKeyCount { key: KeySelector::CorrelationId, min_count: 1 },
            ],
        };
        assert!(spec.compile("churn-risk").is_ok());

        let spec = TriggerSpec::Any { triggers: vec![] };
        assert!(matches!(
            spec.compile("churn-risk"),
            Err(PatternConfigError::EmptyComposition(_))
        ));
    }
}
