// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish/subscribe channel for engine events.
//!
//! Every subscriber owns a bounded queue. Publishing waits for room, so a
//! slow subscriber applies backpressure to the publisher. Dropping a
//! [`Subscription`] unsubscribes it.

use parking_lot::Mutex;
use sdd_core::{AgentId, Event};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Default per-subscriber queue depth
pub const DEFAULT_CAPACITY: usize = 1024;

type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    filter: Filter,
    tx: mpsc::Sender<Event>,
}

struct BusInner {
    next_id: u64,
    capacity: usize,
    subscribers: Vec<Subscriber>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                capacity: capacity.max(1),
                subscribers: Vec::new(),
            })),
        }
    }

    /// Subscribe to events matching `filter`.
    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = mpsc::channel(inner.capacity);
        inner.subscribers.push(Subscriber { id, filter: Arc::new(filter), tx });
        Subscription { id, rx, bus: Arc::downgrade(&self.inner) }
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(|_| true)
    }

    /// Output chunks of one agent, in emission order.
    pub fn on_agent_output(&self, agent_id: AgentId) -> Subscription {
        self.subscribe(move |e| matches!(e, Event::AgentOutput { agent_id: id, .. } if *id == agent_id))
    }

    pub fn on_agent_status(&self) -> Subscription {
        self.subscribe(|e| matches!(e, Event::AgentStatusChanged { .. }))
    }

    pub fn on_auto_execution_status(&self) -> Subscription {
        self.subscribe(|e| matches!(e, Event::AutoExecutionStatusChanged { .. }))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Deliver `event` to every matching subscriber.
    pub async fn publish(&self, event: Event) {
        let targets: Vec<(u64, mpsc::Sender<Event>)> = {
            let inner = self.inner.lock();
            inner
                .subscribers
                .iter()
                .filter(|s| (s.filter)(&event))
                .map(|s| (s.id, s.tx.clone()))
                .collect()
        };
        if targets.is_empty() {
            return;
        }
        tracing::trace!(event = %event.log_summary(), subscribers = targets.len(), "publish");

        let mut gone = Vec::new();
        for (id, tx) in targets {
            if tx.send(event.clone()).await.is_err() {
                gone.push(id);
            }
        }
        if !gone.is_empty() {
            tracing::warn!(count = gone.len(), "dropping closed subscribers");
            self.inner.lock().subscribers.retain(|s| !gone.contains(&s.id));
        }
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().subscribers.retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
