// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relays SSH connection state onto the event bus and restarts lost sessions.

use crate::EventBus;
use sdd_adapters::ConnectionHandle;
use sdd_core::{ConnectionStatus, Event};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Publish every connection status change until the handle is dropped.
///
/// A session flagged lost by a provider starts
/// [`ConnectionHandle::reconnect`] in the background; its backoff states are
/// published like any other change. A deliberate disconnect is left alone.
/// Rapid transitions may coalesce; the latest state is always delivered.
pub fn spawn_connection_forwarder(connection: Arc<ConnectionHandle>, bus: EventBus) -> JoinHandle<()> {
    let mut state = connection.subscribe();
    let target = connection.target().clone();
    let weak: Weak<ConnectionHandle> = Arc::downgrade(&connection);
    drop(connection);
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let snapshot = *state.borrow_and_update();
            tracing::debug!(target = %target, status = %snapshot.status, attempt = snapshot.attempt, "connection status");
            bus.publish(Event::ConnectionStatusChanged {
                target: target.clone(),
                status: snapshot.status,
                attempt: snapshot.attempt,
            })
            .await;

            if snapshot.lost && snapshot.status == ConnectionStatus::Disconnected {
                if let Some(connection) = weak.upgrade() {
                    tokio::spawn(async move {
                        match connection.reconnect().await {
                            Ok(()) => tracing::info!(target = %connection.target(), "ssh session restored"),
                            Err(e) => tracing::error!(target = %connection.target(), error = %e, "ssh session not restored"),
                        }
                    });
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
