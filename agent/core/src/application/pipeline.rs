// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Checkpointed persistence pipeline.
//!
//! Invoked exactly once per terminal decision outcome delivered by the
//! execution substrate. Persists the outcome as an ordered sequence of
//! idempotent writes — audit, command, approval — and advances the
//! checkpoint strictly last: once the checkpoint is durable the event is
//! ineligible for redelivery, so it must follow every other effect.
//!
//! The entry point returns on every path. An error escaping this handler
//! would make the surrounding queue consider the work permanently done while
//! nothing was persisted, which for a checkpoint-driven pipeline means
//! silent, unrecoverable event loss.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::domain::agent::WorkId;
use crate::domain::checkpoint::CheckpointAdvance;
use crate::domain::decision::{Decision, DecisionOutcome};
use crate::domain::event::EventContext;
use crate::domain::records::{
    ApprovalId, ApprovalRecord, ApprovalStatus, AuditEventKind, AuditRecord, CommandRecord,
    CommandStatus, DeadLetter, RoutedCommand,
};
use crate::domain::repository::{
    ApprovalStore, AuditStore, CheckpointStore, CommandRouter, CommandStore, DeadLetterStore,
    StoreError,
};

pub struct DecisionPipeline {
    checkpoints: Arc<dyn CheckpointStore>,
    audit: Arc<dyn AuditStore>,
    commands: Arc<dyn CommandStore>,
    approvals: Arc<dyn ApprovalStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    router: Option<Arc<dyn CommandRouter>>,
    approval_timeout: Duration,
}

impl DecisionPipeline {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        audit: Arc<dyn AuditStore>,
        commands: Arc<dyn CommandStore>,
        approvals: Arc<dyn ApprovalStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        router: Option<Arc<dyn CommandRouter>>,
        approval_timeout: Duration,
    ) -> Self {
        Self { checkpoints, audit, commands, approvals, dead_letters, router, approval_timeout }
    }

    /// Handle one terminal decision outcome. Never returns an error.
    pub async fn on_decision_outcome(
        &self,
        work_id: &WorkId,
        ctx: &EventContext,
        outcome: DecisionOutcome,
    ) {
        match outcome {
            DecisionOutcome::Canceled => {
                // Nothing recorded; the event stays eligible for redelivery.
                debug!(work_id = %work_id, event_id = %ctx.event_id, "Decision cycle canceled");
            }
            DecisionOutcome::Failed { error, attempts } => {
                self.record_failure(work_id, ctx, &error, attempts).await;
            }
            DecisionOutcome::Success { decision: None } => {
                debug!(event_id = %ctx.event_id, "Event intentionally skipped");
            }
            DecisionOutcome::Success { decision: Some(decision) } => {
                if let Err(e) = self.persist_decision(ctx, &decision).await {
                    error!(
                        work_id = %work_id,
                        event_id = %ctx.event_id,
                        decision_id = %decision.decision_id,
                        error = %e,
                        "Decision persistence failed, dead-lettering without advancing checkpoint"
                    );
                    self.dead_letter(work_id, ctx, &format!("persistence failure: {e}"), 1).await;
                }
            }
        }
    }

    /// Ordered persistence of one successful decision. Returns `Err` only
    /// for failures that must leave the event eligible for redelivery
    /// (checkpoint load/advance); individual downstream write failures are
    /// logged and swallowed without blocking later steps.
    async fn persist_decision(
        &self,
        ctx: &EventContext,
        decision: &Decision,
    ) -> Result<(), StoreError> {
        let checkpoint = self
            .checkpoints
            .load_or_create(&ctx.agent_id, &ctx.subscription_id)
            .await?;

        // Idempotency gate: a prior (possibly concurrent) invocation already
        // persisted this event in full.
        if checkpoint.already_processed(ctx.global_position) {
            debug!(
                event_id = %ctx.event_id,
                position = ctx.global_position,
                watermark = checkpoint.last_processed_position,
                "Event already processed, skipping"
            );
            return Ok(());
        }

        let audit = AuditRecord::new(
            AuditEventKind::DecisionMade,
            ctx.agent_id,
            decision.decision_id,
            json!({
                "patternDetected": decision.pattern_detected,
                "confidence": decision.confidence,
                "reasoning": decision.reasoning,
                "eventId": ctx.event_id,
                "globalPosition": ctx.global_position,
                "correlationId": ctx.correlation_id,
            }),
        );
        if let Err(e) = self.audit.record(audit).await {
            warn!(decision_id = %decision.decision_id, error = %e, "Audit write failed");
        }

        if let Some(command_type) = &decision.command {
            let status = if decision.requires_approval {
                CommandStatus::PendingApproval
            } else {
                CommandStatus::Pending
            };
            let record = CommandRecord {
                agent_id: ctx.agent_id,
                decision_id: decision.decision_id,
                command_type: command_type.clone(),
                payload: decision.data.clone().unwrap_or(serde_json::Value::Null),
                status,
            };
            if let Err(e) = self.commands.record(record).await {
                warn!(decision_id = %decision.decision_id, error = %e, "Command write failed");
            }

            if !decision.requires_approval {
                if let Some(router) = &self.router {
                    let routed = RoutedCommand {
                        decision_id: decision.decision_id,
                        command_type: command_type.clone(),
                        agent_id: ctx.agent_id,
                        correlation_id: ctx.correlation_id.clone(),
                    };
                    if let Err(e) = router.schedule(routed).await {
                        warn!(
                            decision_id = %decision.decision_id,
                            error = %e,
                            "Command routing failed, record stays pending"
                        );
                    }
                }
            }
        }

        if decision.requires_approval {
            let approval = ApprovalRecord {
                approval_id: ApprovalId::derived_from(&decision.decision_id),
                agent_id: ctx.agent_id,
                decision_id: decision.decision_id,
                action: decision.command.clone().unwrap_or_else(|| "none".to_string()),
                confidence: decision.confidence,
                reason: decision.reasoning.clone(),
                triggering_event_ids: decision.triggering_events.clone(),
                expires_at: Utc::now() + self.approval_timeout,
                status: ApprovalStatus::Pending,
            };
            if let Err(e) = self.approvals.create(approval).await {
                warn!(decision_id = %decision.decision_id, error = %e, "Approval write failed");
            }
        }

        // Strictly last.
        self.checkpoints
            .advance(
                &ctx.agent_id,
                &ctx.subscription_id,
                CheckpointAdvance { position: ctx.global_position, event_id: ctx.event_id },
            )
            .await?;

        Ok(())
    }

    /// Failed outcome: dead letter plus an analysis-failed audit entry, both
    /// best-effort, checkpoint untouched.
    async fn record_failure(&self, work_id: &WorkId, ctx: &EventContext, error: &str, attempts: u32) {
        self.dead_letter(work_id, ctx, error, attempts).await;

        let audit = AuditRecord::new(
            AuditEventKind::AnalysisFailed,
            ctx.agent_id,
            crate::domain::decision::DecisionId::new(),
            json!({
                "eventId": ctx.event_id,
                "eventType": ctx.event_type,
                "globalPosition": ctx.global_position,
                "error": error,
                "attempts": attempts,
                "workId": work_id,
            }),
        );
        if let Err(e) = self.audit.record(audit).await {
            warn!(event_id = %ctx.event_id, error = %e, "Analysis-failed audit write failed");
        }
    }

    async fn dead_letter(&self, work_id: &WorkId, ctx: &EventContext, error: &str, attempts: u32) {
        let dead_letter = DeadLetter {
            agent_id: ctx.agent_id,
            subscription_id: ctx.subscription_id.clone(),
            event_id: ctx.event_id,
            global_position: ctx.global_position,
            error: error.to_string(),
            attempt_count: attempts,
            work_id: work_id.clone(),
        };
        if let Err(e) = self.dead_letters.record(dead_letter).await {
            warn!(event_id = %ctx.event_id, error = %e, "Dead letter write failed");
        }
    }
}
