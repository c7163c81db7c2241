// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation of persisted pid records.

use super::{status_event, AgentEntry, Supervisor};
use crate::SupervisorError;
use sdd_core::{AgentId, AgentStatus, Clock};
use sdd_storage::PidRecord;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records that claimed running for a dead process, now interrupted
    pub interrupted: Vec<AgentId>,
    /// Records whose process is still alive, now tracked by polling
    pub adopted: Vec<AgentId>,
    /// Terminal records restored as-is
    pub restored: usize,
}

impl<C: Clock> Supervisor<C> {
    /// Load every record not already tracked. Running records whose process
    /// is gone are rewritten to interrupted before they become visible.
    ///
    /// Idempotent: a second pass finds nothing new.
    pub async fn reconcile(&self) -> Result<ReconcileReport, SupervisorError> {
        let inner = &self.inner;
        let mut report = ReconcileReport::default();

        for record in inner.records.load_all() {
            if inner.agents.lock().contains_key(&record.agent_id) {
                continue;
            }

            let mut handle = record.to_handle();
            if handle.is_running() {
                match self.probe(&record).await {
                    Ok(()) => {
                        tracing::info!(agent_id = %handle.agent_id, pid = ?handle.pid, "adopting live agent");
                        report.adopted.push(handle.agent_id.clone());
                    }
                    Err(reason) => {
                        handle.status = AgentStatus::Interrupted;
                        handle.exit_code = None;
                        inner.records.save(&PidRecord::from_handle(&handle, record.launch.clone()))?;
                        tracing::info!(agent_id = %handle.agent_id, reason = %reason, "stale running record marked interrupted");
                        report.interrupted.push(handle.agent_id.clone());
                    }
                }
            } else {
                report.restored += 1;
            }

            let now = inner.clock.epoch_ms();
            let event = (handle.status == AgentStatus::Interrupted && record.status == AgentStatus::Running)
                .then(|| status_event(&handle));
            inner
                .agents
                .lock()
                .insert(handle.agent_id.clone(), AgentEntry::new(handle, record.launch, now));
            if let Some(event) = event {
                inner.bus.publish(event).await;
            }
        }
        Ok(report)
    }

    async fn probe(&self, record: &PidRecord) -> Result<(), String> {
        let Some(pid) = record.pid else {
            return Err("no pid recorded".to_string());
        };
        let pair = self.inner.providers.resolve(&record.launch.root).map_err(|e| e.to_string())?;
        match pair.process.is_alive(pid).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("pid {pid} is not alive")),
            Err(e) => Err(e.to_string()),
        }
    }
}
