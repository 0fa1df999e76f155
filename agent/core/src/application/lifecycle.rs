// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Administrative lifecycle command handlers.
//!
//! The five commands (start/pause/resume/stop/reconfigure) share one generic
//! transition routine: load-or-create the checkpoint, validate the state
//! machine transition, run the optional pre-hook, then atomically persist
//! the new status with its audit record. An invalid transition is a
//! structured rejection carrying the valid-events list, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::domain::agent::{AgentId, SubscriptionId};
use crate::domain::decision::DecisionId;
use crate::domain::lifecycle::{AgentState, LifecycleEvent, LifecycleMachine};
use crate::domain::records::{AuditEventKind, AuditRecord};
use crate::domain::repository::CheckpointStore;

/// One administrative lifecycle command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    pub agent_id: AgentId,
    pub subscription_id: SubscriptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Config patch, only meaningful for reconfigure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_overrides: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    UnknownCommand,
    InvalidTransition,
    StorageUnavailable,
}

/// Outcome of one lifecycle command. Always a value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LifecycleResult {
    Transitioned { previous_state: AgentState, new_state: AgentState },
    Rejected { code: RejectionCode, message: String, current_state: AgentState },
}

/// What distinguishes one command handler from another: everything else is
/// the shared transition routine.
struct TransitionSpec {
    event: LifecycleEvent,
    audit_kind: AuditEventKind,
    build_payload: fn(&LifecycleRequest) -> serde_json::Value,
    pre_hook: Option<PreHook>,
}

enum PreHook {
    MergeConfigOverrides,
}

pub struct LifecycleService {
    machine: LifecycleMachine,
    checkpoints: Arc<dyn CheckpointStore>,
    specs: HashMap<&'static str, TransitionSpec>,
}

impl LifecycleService {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>) -> Self {
        let machine = LifecycleMachine::new();

        fn base_payload(req: &LifecycleRequest) -> serde_json::Value {
            json!({ "correlationId": req.correlation_id })
        }

        fn reconfigure_payload(req: &LifecycleRequest) -> serde_json::Value {
            json!({
                "correlationId": req.correlation_id,
                "configOverrides": req.config_overrides,
            })
        }

        let specs = HashMap::from([
            (
                "StartAgent",
                TransitionSpec {
                    event: LifecycleEvent::Start,
                    audit_kind: AuditEventKind::AgentStarted,
                    build_payload: base_payload,
                    pre_hook: None,
                },
            ),
            (
                "PauseAgent",
                TransitionSpec {
                    event: LifecycleEvent::Pause,
                    audit_kind: AuditEventKind::AgentPaused,
                    build_payload: base_payload,
                    pre_hook: None,
                },
            ),
            (
                "ResumeAgent",
                TransitionSpec {
                    event: LifecycleEvent::Resume,
                    audit_kind: AuditEventKind::AgentResumed,
                    build_payload: base_payload,
                    pre_hook: None,
                },
            ),
            (
                "StopAgent",
                TransitionSpec {
                    event: LifecycleEvent::Stop,
                    audit_kind: AuditEventKind::AgentStopped,
                    build_payload: base_payload,
                    pre_hook: None,
                },
            ),
            (
                "ReconfigureAgent",
                TransitionSpec {
                    event: LifecycleEvent::Reconfigure,
                    audit_kind: AuditEventKind::AgentReconfigured,
                    build_payload: reconfigure_payload,
                    pre_hook: Some(PreHook::MergeConfigOverrides),
                },
            ),
        ]);

        Self { machine, checkpoints, specs }
    }

    /// Handle one administrative command by name.
    pub async fn on_lifecycle_command(
        &self,
        command: &str,
        request: &LifecycleRequest,
    ) -> LifecycleResult {
        let Some(spec) = self.specs.get(command) else {
            return LifecycleResult::Rejected {
                code: RejectionCode::UnknownCommand,
                message: format!("Unknown lifecycle command '{command}'"),
                // No checkpoint was consulted; report the initial state.
                current_state: AgentState::Stopped,
            };
        };
        self.execute_transition(spec, request).await
    }

    async fn execute_transition(
        &self,
        spec: &TransitionSpec,
        request: &LifecycleRequest,
    ) -> LifecycleResult {
        let checkpoint = match self
            .checkpoints
            .load_or_create(&request.agent_id, &request.subscription_id)
            .await
        {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(agent_id = %request.agent_id, error = %e, "Checkpoint load failed");
                return LifecycleResult::Rejected {
                    code: RejectionCode::StorageUnavailable,
                    message: format!("Checkpoint store unavailable: {e}"),
                    current_state: AgentState::Stopped,
                };
            }
        };

        let previous = checkpoint.status;
        let Some(next) = self.machine.transition(previous, spec.event) else {
            let valid: Vec<&str> = self
                .machine
                .valid_events(previous)
                .iter()
                .map(|e| e.as_str())
                .collect();
            return LifecycleResult::Rejected {
                code: RejectionCode::InvalidTransition,
                message: format!(
                    "Event {} is not valid in state {previous}; valid events: {}",
                    spec.event,
                    valid.join(", ")
                ),
                current_state: previous,
            };
        };

        if let Some(PreHook::MergeConfigOverrides) = spec.pre_hook {
            if let Some(overrides) = &request.config_overrides {
                if let Err(e) = self
                    .checkpoints
                    .patch_config_overrides(
                        &request.agent_id,
                        &request.subscription_id,
                        overrides.clone(),
                    )
                    .await
                {
                    warn!(agent_id = %request.agent_id, error = %e, "Config patch failed");
                    return LifecycleResult::Rejected {
                        code: RejectionCode::StorageUnavailable,
                        message: format!("Failed to merge config overrides: {e}"),
                        current_state: previous,
                    };
                }
            }
        }

        let audit = AuditRecord::new(
            spec.audit_kind,
            request.agent_id,
            DecisionId::new(),
            (spec.build_payload)(request),
        );
        if let Err(e) = self
            .checkpoints
            .transition_lifecycle(&request.agent_id, &request.subscription_id, next, audit)
            .await
        {
            warn!(agent_id = %request.agent_id, error = %e, "Lifecycle transition write failed");
            return LifecycleResult::Rejected {
                code: RejectionCode::StorageUnavailable,
                message: format!("Failed to persist transition: {e}"),
                current_state: previous,
            };
        }

        info!(
            agent_id = %request.agent_id,
            event = %spec.event,
            from = %previous,
            to = %next,
            "Agent lifecycle transition"
        );
        LifecycleResult::Transitioned { previous_state: previous, new_state: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{InMemoryAuditStore, InMemoryCheckpointStore};

    fn service() -> (LifecycleService, Arc<InMemoryCheckpointStore>, Arc<InMemoryAuditStore>) {
        let audit = Arc::new(InMemoryAuditStore::new());
        let checkpoints = Arc::new(InMemoryCheckpointStore::new(audit.clone()));
        (LifecycleService::new(checkpoints.clone()), checkpoints, audit)
    }

    fn request(agent_id: AgentId) -> LifecycleRequest {
        LifecycleRequest {
            agent_id,
            subscription_id: SubscriptionId::new("order-events"),
            correlation_id: Some("admin-7".to_string()),
            config_overrides: None,
        }
    }

    #[tokio::test]
    async fn start_transitions_stopped_agent_to_active_with_audit() {
        let (service, checkpoints, audit) = service();
        let req = request(AgentId::new());

        let result = service.on_lifecycle_command("StartAgent", &req).await;
        match result {
            LifecycleResult::Transitioned { previous_state, new_state } => {
                assert_eq!(previous_state, AgentState::Stopped);
                assert_eq!(new_state, AgentState::Active);
            }
            other => panic!("expected transition, got {other:?}"),
        }

        let checkpoint = checkpoints
            .load_or_create(&req.agent_id, &req.subscription_id)
            .await
            .unwrap();
        assert_eq!(checkpoint.status, AgentState::Active);
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.all()[0].event_type, AuditEventKind::AgentStarted);
    }

    #[tokio::test]
    async fn pause_from_stopped_is_rejected_with_valid_events() {
        let (service, checkpoints, _) = service();
        let req = request(AgentId::new());

        let result = service.on_lifecycle_command("PauseAgent", &req).await;
        match result {
            LifecycleResult::Rejected { code, message, current_state } => {
                assert_eq!(code, RejectionCode::InvalidTransition);
                assert_eq!(current_state, AgentState::Stopped);
                assert!(message.contains("START"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        // Status unchanged by the rejection.
        let checkpoint = checkpoints
            .load_or_create(&req.agent_id, &req.subscription_id)
            .await
            .unwrap();
        assert_eq!(checkpoint.status, AgentState::Stopped);
    }

    #[tokio::test]
    async fn stop_succeeds_from_active_and_paused() {
        let (service, _, _) = service();

        let req = request(AgentId::new());
        service.on_lifecycle_command("StartAgent", &req).await;
        let result = service.on_lifecycle_command("StopAgent", &req).await;
        assert!(matches!(
            result,
            LifecycleResult::Transitioned { new_state: AgentState::Stopped, .. }
        ));

        let req = request(AgentId::new());
        service.on_lifecycle_command("StartAgent", &req).await;
        service.on_lifecycle_command("PauseAgent", &req).await;
        let result = service.on_lifecycle_command("StopAgent", &req).await;
        assert!(matches!(
            result,
            LifecycleResult::Transitioned {
                previous_state: AgentState::Paused,
                new_state: AgentState::Stopped,
            }
        ));
    }

    #[tokio::test]
    async fn stop_from_stopped_is_invalid() {
        let (service, _, _) = service();
        let req = request(AgentId::new());

        let result = service.on_lifecycle_command("StopAgent", &req).await;
        assert!(matches!(
            result,
            LifecycleResult::Rejected { code: RejectionCode::InvalidTransition, .. }
        ));
    }

    #[tokio::test]
    async fn reconfigure_merges_overrides_and_reactivates() {
        let (service, checkpoints, _) = service();
        let mut req = request(AgentId::new());
        service.on_lifecycle_command("StartAgent", &req).await;
        service.on_lifecycle_command("PauseAgent", &req).await;

        req.config_overrides = Some(serde_json::json!({ "windowDuration": "14d" }));
        let result = service.on_lifecycle_command("ReconfigureAgent", &req).await;
        assert!(matches!(
            result,
            LifecycleResult::Transitioned {
                previous_state: AgentState::Paused,
                new_state: AgentState::Active,
            }
        ));

        req.config_overrides = Some(serde_json::json!({ "minEvents": 5 }));
        service.on_lifecycle_command("ReconfigureAgent", &req).await;

        let checkpoint = checkpoints
            .load_or_create(&req.agent_id, &req.subscription_id)
            .await
            .unwrap();
        // Both patches survive the shallow merge.
        assert_eq!(checkpoint.config_overrides["windowDuration"], "14d");
        assert_eq!(checkpoint.config_overrides["minEvents"], 5);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let (service, _, _) = service();
        let req = request(AgentId::new());

        let result = service.on_lifecycle_command("DestroyAgent", &req).await;
        assert!(matches!(
            result,
            LifecycleResult::Rejected { code: RejectionCode::UnknownCommand, .. }
        ));
    }
}
