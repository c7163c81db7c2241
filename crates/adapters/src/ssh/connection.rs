// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handle for one remote target.
//!
//! Status is published on a `watch` channel. Each successful handshake bumps
//! the generation, which is what the provider factory keys its cache on.
//! Automatic reconnects back off exponentially up to a ceiling, then park in
//! `Error` until a manual [`ConnectionHandle::connect`].

use super::transport::SshTransport;
use sdd_core::{ConnectionStatus, SshTarget};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Capped exponential backoff for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before 1-based `attempt`: `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay)
    }
}

/// One failed attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("handshake with {target} failed: {message}")]
    Handshake { target: SshTarget, message: String },
    #[error("gave up after {} attempts: {}", attempts.len(), describe(attempts))]
    Exhausted { attempts: Vec<FailedAttempt> },
    /// Automatic retries are exhausted; only a manual connect may try again.
    #[error("connection to {0} is in error state; reconnect manually")]
    NeedsManualConnect(SshTarget),
}

fn describe(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("#{} after {}ms: {}", a.attempt, a.delay.as_millis(), a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    /// Attempts made in the current reconnect cycle
    pub attempt: u32,
    pub generation: u64,
    /// Set by [`ConnectionHandle::mark_lost`] until the next transition
    pub lost: bool,
}

pub struct ConnectionHandle {
    target: SshTarget,
    transport: Arc<dyn SshTransport>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionSnapshot>,
    /// Serializes handshakes
    op: AsyncMutex<()>,
}

impl ConnectionHandle {
    pub fn new(target: SshTarget, transport: Arc<dyn SshTransport>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionSnapshot {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            generation: 0,
            lost: false,
        });
        Self { target, transport, policy, state, op: AsyncMutex::new(()) }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    pub fn transport(&self) -> &Arc<dyn SshTransport> {
        &self.transport
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        *self.state.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.snapshot().status
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state.subscribe()
    }

    fn set(&self, status: ConnectionStatus, attempt: u32) {
        self.state.send_modify(|s| {
            s.status = status;
            s.attempt = attempt;
            s.lost = false;
        });
    }

    async fn attempt(&self, attempt: u32) -> Result<(), String> {
        let stage = |status: ConnectionStatus| self.set(status, attempt);
        self.transport.handshake(&self.target, &stage).await?;
        self.state.send_modify(|s| {
            s.status = ConnectionStatus::Connected;
            s.attempt = 0;
            s.generation += 1;
            s.lost = false;
        });
        tracing::info!(target = %self.target, generation = self.generation(), "ssh connected");
        Ok(())
    }

    /// Manual connect: resets the attempt counter and makes exactly one attempt.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let _op = self.op.lock().await;
        self.set(ConnectionStatus::Connecting, 1);
        self.attempt(1).await.map_err(|message| {
            tracing::warn!(target = %self.target, error = %message, "ssh connect failed");
            self.set(ConnectionStatus::Error, 1);
            ConnectionError::Handshake { target: self.target.clone(), message }
        })
    }

    /// Automatic reconnect with capped exponential backoff.
    ///
    /// After `max_attempts` failures the handle enters `Error` and further
    /// calls fail immediately without touching the transport.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        let _op = self.op.lock().await;
        match self.status() {
            ConnectionStatus::Error => {
                return Err(ConnectionError::NeedsManualConnect(self.target.clone()))
            }
            ConnectionStatus::Connected => {
                if self.transport.is_alive(&self.target).await {
                    return Ok(());
                }
            }
            _ => {}
        }

        let mut failures = Vec::new();
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_for(attempt);
            self.set(ConnectionStatus::Reconnecting, attempt);
            tokio::time::sleep(delay).await;
            match self.attempt(attempt).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(target = %self.target, attempt, error = %error, "ssh reconnect attempt failed");
                    failures.push(FailedAttempt { attempt, delay, error });
                }
            }
        }
        self.set(ConnectionStatus::Error, self.policy.max_attempts);
        tracing::error!(target = %self.target, attempts = failures.len(), "ssh reconnect gave up");
        Err(ConnectionError::Exhausted { attempts: failures })
    }

    /// The shared session was found dead by a provider. Unlike
    /// [`ConnectionHandle::disconnect`], this flags the snapshot as `lost`
    /// so a watcher can start [`ConnectionHandle::reconnect`].
    pub fn mark_lost(&self) {
        if self.status() == ConnectionStatus::Connected {
            tracing::warn!(target = %self.target, "ssh session lost");
            self.state.send_modify(|s| {
                s.status = ConnectionStatus::Disconnected;
                s.attempt = 0;
                s.lost = true;
            });
        }
    }

    pub async fn disconnect(&self) {
        let _op = self.op.lock().await;
        self.transport.disconnect(&self.target).await;
        self.set(ConnectionStatus::Disconnected, 0);
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
