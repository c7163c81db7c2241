// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sdd_core::{EntityKind, OutputStream};

fn output(agent: &AgentId, chunk: &str) -> Event {
    Event::AgentOutput { agent_id: agent.clone(), stream: OutputStream::Stdout, chunk: chunk.into(), at_ms: 1 }
}

#[tokio::test]
async fn agent_output_subscription_is_filtered_and_ordered() {
    let bus = EventBus::new();
    let a = AgentId::new();
    let b = AgentId::new();
    let mut sub = bus.on_agent_output(a.clone());

    bus.publish(output(&a, "1")).await;
    bus.publish(output(&b, "x")).await;
    bus.publish(output(&a, "2")).await;

    assert_eq!(sub.recv().await, Some(output(&a, "1")));
    assert_eq!(sub.recv().await, Some(output(&a, "2")));
    assert_eq!(sub.try_recv(), None);
}

#[tokio::test]
async fn dropping_subscription_unsubscribes() {
    let bus = EventBus::new();
    let sub = bus.subscribe_all();
    let _other = bus.on_auto_execution_status();
    assert_eq!(bus.subscriber_count(), 2);
    drop(sub);
    assert_eq!(bus.subscriber_count(), 1);

    // Publishing with no match is a no-op
    bus.publish(Event::EntitiesChanged { kind: EntityKind::Specs, added: vec![], removed: vec![], changed: vec![] })
        .await;
}

#[tokio::test]
async fn full_queue_applies_backpressure() {
    let bus = EventBus::with_capacity(1);
    let a = AgentId::new();
    let mut sub = bus.subscribe_all();
    bus.publish(output(&a, "1")).await;

    let publisher = {
        let bus = bus.clone();
        let a = a.clone();
        tokio::spawn(async move { bus.publish(output(&a, "2")).await })
    };
    tokio::task::yield_now().await;
    assert!(!publisher.is_finished());

    assert_eq!(sub.recv().await, Some(output(&a, "1")));
    publisher.await.unwrap();
    assert_eq!(sub.recv().await, Some(output(&a, "2")));
}
