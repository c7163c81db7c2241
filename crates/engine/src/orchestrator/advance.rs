// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-execution transitions: choosing the next unit of work and folding
//! an agent's result back into the session.

use super::verdict::{parse_fix_required, parse_inspection_verdict};
use super::Inner;
use crate::OrchestratorError;
use sdd_core::{
    AgentStatus, AutoExecutionOutcome, AutoExecutionSession, AutoExecutionStatus, AwaitingAgent,
    Clock, EntityId, InspectionVerdict, Phase, PhaseState, PhaseStates, ReviewStatus, WorkKind,
};

impl<C: Clock> Inner<C> {
    /// Launch the next unit of work, or pause or finish the session.
    ///
    /// Permissions are read here, so a flag flipped while an agent runs
    /// takes effect at the next boundary.
    pub(super) async fn advance(
        &self,
        session: &mut AutoExecutionSession,
    ) -> Result<(), OrchestratorError> {
        let entity = session.entity.clone();
        loop {
            let now = self.clock.epoch_ms();
            let states = self.metadata.read_phase_state(&entity).await?;
            let Some(phase) = states.first_pending() else {
                session.finish(AutoExecutionOutcome::Completed, now);
                tracing::info!(entity = %entity, "auto-execution completed");
                return Ok(());
            };
            session.current_phase = Some(phase);

            if !session.permissions.allows(phase) {
                session.pause(now);
                tracing::info!(entity = %entity, phase = %phase, "auto-execution paused at phase");
                return Ok(());
            }
            self.approve_upstream(&entity, phase, &states).await?;

            let work = match phase {
                Phase::DocumentReview if session.document_review.is_approved() => {
                    self.record_generated(session, phase).await?;
                    continue;
                }
                Phase::DocumentReview => WorkKind::ReviewRound(session.document_review.next_round()),
                Phase::Inspection if session.inspection.passed() => {
                    self.record_generated(session, phase).await?;
                    continue;
                }
                Phase::Inspection => match session.inspection.blocking_round() {
                    Some(round) => {
                        session.pause(now);
                        tracing::info!(entity = %entity, round, "inspection needs a fix before continuing");
                        return Ok(());
                    }
                    None => WorkKind::InspectionRound(session.inspection.next_round()),
                },
                _ => WorkKind::Phase,
            };
            return self.launch(session, phase, work).await;
        }
    }

    /// Approve every gated phase before `phase` that is generated but unapproved.
    async fn approve_upstream(
        &self,
        entity: &EntityId,
        phase: Phase,
        states: &PhaseStates,
    ) -> Result<(), OrchestratorError> {
        for gated in Phase::ALL.into_iter().take_while(|p| *p != phase) {
            if gated.requires_approval() && states.get(gated) == PhaseState::Generated {
                self.metadata.write_approval(entity, gated, true).await?;
                tracing::info!(entity = %entity, phase = %gated, "auto-approved phase");
            }
        }
        Ok(())
    }

    async fn record_generated(
        &self,
        session: &mut AutoExecutionSession,
        phase: Phase,
    ) -> Result<(), OrchestratorError> {
        self.mark_generated(&session.entity, phase).await?;
        session.record_executed(phase);
        Ok(())
    }

    pub(super) async fn launch(
        &self,
        session: &mut AutoExecutionSession,
        phase: Phase,
        work: WorkKind,
    ) -> Result<(), OrchestratorError> {
        if let WorkKind::ReviewRound(_) = work {
            session.document_review.status = ReviewStatus::InProgress;
        }
        let handle = self.spawn_work(&session.entity, phase, work).await?;
        tracing::info!(
            entity = %session.entity,
            phase = %phase,
            work = ?work,
            agent_id = %handle.agent_id,
            "auto-execution launched agent"
        );
        session.status = AutoExecutionStatus::Running;
        session.current_phase = Some(phase);
        session.awaiting = Some(AwaitingAgent { agent_id: handle.agent_id, phase, work });
        Ok(())
    }

    /// Fold the awaited agent's terminal status into the session and persist.
    pub(super) async fn complete(
        &self,
        mut session: AutoExecutionSession,
        status: AgentStatus,
    ) -> Result<(), OrchestratorError> {
        let Some(awaiting) = session.awaiting.take() else {
            return Ok(());
        };
        let result = self.apply_result(&mut session, &awaiting, status).await;
        self.settle(&mut session, result).await
    }

    async fn apply_result(
        &self,
        session: &mut AutoExecutionSession,
        awaiting: &AwaitingAgent,
        status: AgentStatus,
    ) -> Result<(), OrchestratorError> {
        let entity = session.entity.clone();
        let now = self.clock.epoch_ms();

        if status != AgentStatus::Completed {
            if let WorkKind::ReviewRound(_) = awaiting.work {
                session.document_review.status = ReviewStatus::Failed;
            }
            session.fail(format!("{} agent {} {status}", awaiting.phase, awaiting.agent_id), now);
            return Ok(());
        }

        match awaiting.work {
            WorkKind::Phase => self.record_generated(session, awaiting.phase).await?,
            WorkKind::ReviewRound(round) => {
                let file = format!("document-review-{round}-reply.md");
                let fix_required = match self.read_artifact(&entity, &file).await {
                    Ok(reply) => parse_fix_required(&reply)
                        .ok_or_else(|| format!("{file} has no Fix Required count")),
                    Err(e) => Err(format!("{file}: {e}")),
                };
                let fix_required = match fix_required {
                    Ok(n) => n,
                    Err(message) => {
                        session.document_review.status = ReviewStatus::Failed;
                        session.fail(format!("document review round {round}: {message}"), now);
                        return Ok(());
                    }
                };
                session.document_review.record_round(round, fix_required, now);
                tracing::info!(entity = %entity, round, fix_required, "document review round complete");
                if session.document_review.is_approved() {
                    self.record_generated(session, Phase::DocumentReview).await?;
                }
            }
            WorkKind::InspectionRound(round) => {
                let file = format!("inspection-{round}.md");
                let verdict = match self.read_artifact(&entity, &file).await {
                    Ok(report) => parse_inspection_verdict(&report)
                        .ok_or_else(|| format!("{file} has no GO/NOGO judgment")),
                    Err(e) => Err(format!("{file}: {e}")),
                };
                let verdict = match verdict {
                    Ok(verdict) => verdict,
                    Err(message) => {
                        session.fail(format!("inspection round {round}: {message}"), now);
                        return Ok(());
                    }
                };
                session.inspection.record(round, verdict, now);
                tracing::info!(entity = %entity, round, verdict = %verdict, "inspection round complete");
                if verdict == InspectionVerdict::NoGo {
                    session.pause(now);
                    return Ok(());
                }
                self.record_generated(session, Phase::Inspection).await?;
            }
            WorkKind::InspectionFix(round) => {
                session.inspection.mark_fixed(now);
                tracing::info!(entity = %entity, round, "inspection fix applied");
            }
        }
        self.advance(session).await
    }
}
