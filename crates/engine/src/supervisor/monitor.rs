// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hang detection and liveness polling for adopted agents.

use super::pump::duration_ms;
use super::{Supervisor, Termination};
use sdd_core::{AgentId, Clock, Event, ProjectRoot};
use tokio::task::JoinHandle;

impl<C: Clock> Supervisor<C> {
    /// Flag running agents idle past the hang threshold, and poll adopted
    /// agents for liveness. Never kills anything.
    ///
    /// Returns the agents newly flagged as possibly hung.
    pub async fn check_hangs(&self) -> Vec<AgentId> {
        let inner = &self.inner;
        let now = inner.clock.epoch_ms();
        let threshold = duration_ms(inner.config.hang_threshold);

        let mut flagged = Vec::new();
        let mut adopted: Vec<(AgentId, u32, ProjectRoot)> = Vec::new();
        {
            let mut agents = inner.agents.lock();
            for entry in agents.values_mut().filter(|e| e.handle.is_running()) {
                if !entry.pumped {
                    if let Some(pid) = entry.handle.pid {
                        adopted.push((entry.handle.agent_id.clone(), pid, entry.launch.root.clone()));
                    }
                    continue;
                }
                let idle_ms = entry.handle.idle_ms(now);
                if !entry.handle.hang_suspected && idle_ms > threshold {
                    entry.handle.hang_suspected = true;
                    flagged.push(Event::AgentPossiblyHung {
                        agent_id: entry.handle.agent_id.clone(),
                        entity: entry.handle.entity.clone(),
                        phase: entry.handle.phase,
                        idle_ms,
                    });
                }
            }
        }

        let mut ids = Vec::with_capacity(flagged.len());
        for event in flagged {
            if let Event::AgentPossiblyHung { agent_id, idle_ms, .. } = &event {
                tracing::warn!(agent_id = %agent_id, idle_ms, "agent possibly hung");
                ids.push(agent_id.clone());
            }
            inner.bus.publish(event).await;
        }

        for (agent_id, pid, root) in adopted {
            let alive = match inner.providers.resolve(&root) {
                Ok(pair) => pair.process.is_alive(pid).await,
                Err(e) => Err(e),
            };
            match alive {
                Ok(true) => {}
                Ok(false) => {
                    inner.conclude(&agent_id, None, Termination::Lost("exited while unobserved".into())).await
                }
                Err(e) => tracing::debug!(agent_id = %agent_id, error = %e, "liveness probe failed"),
            }
        }
        ids
    }

    /// Run [`Supervisor::check_hangs`] every `monitor_interval`.
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let supervisor = self.clone();
        let period = supervisor.inner.config.monitor_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                supervisor.check_hangs().await;
            }
        })
    }
}
