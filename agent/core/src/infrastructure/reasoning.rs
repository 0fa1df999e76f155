// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI-Compatible Reasoning Adapter
//
// Anti-Corruption Layer for the reasoning capability. Works with any
// OpenAI-compatible chat-completions API (LM Studio, vLLM, etc.). Model
// output is expected as a JSON object; anything else surfaces as
// `ReasoningError::Unparseable`, which the analyzer turns into a rule-based
// fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::event::EventRecord;
use crate::domain::reasoning::{ReasoningError, ReasoningInsight, ReasoningProvider};

pub struct OpenAiReasoningAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct InsightPayload {
    #[serde(default)]
    patterns: Vec<String>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

impl OpenAiReasoningAdapter {
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key, model }
    }

    fn build_message(prompt: &str, events: &[EventRecord]) -> Result<String, ReasoningError> {
        let events_json = serde_json::to_string_pretty(events)
            .map_err(|e| ReasoningError::Provider(format!("Failed to serialize events: {e}")))?;
        Ok(format!("{prompt}\n\nEvent window:\n```json\n{events_json}\n```"))
    }

    /// Models frequently wrap JSON replies in a markdown fence; accept both.
    fn strip_fences(text: &str) -> &str {
        let trimmed = text.trim();
        trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .map(str::trim)
            .unwrap_or(trimmed)
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiReasoningAdapter {
    async fn analyze(
        &self,
        prompt: &str,
        events: &[EventRecord],
    ) -> Result<ReasoningInsight, ReasoningError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Self::build_message(prompt, events)?,
            }],
            max_tokens: 800,
            // Low temperature for consistent pattern verdicts.
            temperature: 0.1,
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ReasoningError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 401 || status == 403 {
                ReasoningError::Authentication(error_text)
            } else if status == 429 {
                ReasoningError::RateLimit
            } else {
                ReasoningError::Provider(format!("HTTP {status}: {error_text}"))
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Provider(format!("Failed to parse response: {e}")))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ReasoningError::Provider("No response from model".into()))?;

        let payload: InsightPayload = serde_json::from_str(Self::strip_fences(content))
            .map_err(|_| ReasoningError::Unparseable(content.to_string()))?;

        Ok(ReasoningInsight {
            patterns: payload.patterns,
            confidence: payload.confidence,
            reasoning: payload.reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventId;
    use chrono::Utc;
    use serde_json::json;

    fn events() -> Vec<EventRecord> {
        vec![EventRecord {
            event_id: EventId::new(),
            event_type: "OrderCanceled".to_string(),
            stream_id: "order-1".to_string(),
            correlation_id: Some("customer-a".to_string()),
            recorded_at: Utc::now(),
            payload: json!({}),
        }]
    }

    #[tokio::test]
    async fn parses_a_json_verdict() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "{\"patterns\": [\"churn-risk\"], \"confidence\": 0.83, \"reasoning\": \"repeated cancellations\"}"
                        }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter =
            OpenAiReasoningAdapter::new(server.url(), "key".to_string(), "gpt-4o".to_string());
        let insight = adapter.analyze("look for churn", &events()).await.unwrap();

        assert_eq!(insight.patterns, vec!["churn-risk".to_string()]);
        assert_eq!(insight.confidence, 0.83);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "```json\n{\"confidence\": 0.4}\n```"
                        }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter =
            OpenAiReasoningAdapter::new(server.url(), "key".to_string(), "gpt-4o".to_string());
        let insight = adapter.analyze("look for churn", &events()).await.unwrap();
        assert_eq!(insight.confidence, 0.4);
        assert!(insight.patterns.is_empty());
    }

    #[tokio::test]
    async fn prose_output_is_unparseable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": { "role": "assistant", "content": "I think the customer is unhappy." }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter =
            OpenAiReasoningAdapter::new(server.url(), "key".to_string(), "gpt-4o".to_string());
        let result = adapter.analyze("look for churn", &events()).await;
        assert!(matches!(result, Err(ReasoningError::Unparseable(_))));
    }

    #[tokio::test]
    async fn http_errors_map_to_typed_variants() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let adapter =
            OpenAiReasoningAdapter::new(server.url(), "key".to_string(), "gpt-4o".to_string());
        let result = adapter.analyze("look for churn", &events()).await;
        assert!(matches!(result, Err(ReasoningError::RateLimit)));
    }
}
