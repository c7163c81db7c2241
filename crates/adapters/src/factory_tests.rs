// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{FakeSshTransport, ReconnectPolicy};

fn target() -> SshTarget {
    SshTarget::new("dev", "box", 22)
}

fn ssh_root() -> ProjectRoot {
    ProjectRoot::ssh(target(), "/srv/app")
}

fn connection(transport: &FakeSshTransport) -> Arc<ConnectionHandle> {
    let policy = ReconnectPolicy {
        max_attempts: 2,
        base_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(1),
    };
    Arc::new(ConnectionHandle::new(target(), Arc::new(transport.clone()), policy))
}

#[test]
fn local_roots_share_one_instance() {
    let factory = ProviderFactory::new(CommandPolicy::default());
    let a = factory.resolve(&ProjectRoot::local("/a")).unwrap();
    let b = factory.resolve(&ProjectRoot::local("/b")).unwrap();
    assert!(a.same_as(&b));
    assert_eq!(a.kind(), ProviderKind::Local);
}

#[test]
fn ssh_before_registration_fails_fast() {
    let factory = ProviderFactory::new(CommandPolicy::default());
    let err = factory.resolve(&ssh_root()).err().unwrap();
    assert_eq!(err, ProviderError::NoConnection(target()));
}

#[tokio::test]
async fn ssh_providers_are_cached_per_generation() {
    let factory = ProviderFactory::new(CommandPolicy::default());
    let transport = FakeSshTransport::new();
    let conn = connection(&transport);
    factory.register_connection(conn.clone());
    conn.connect().await.unwrap();

    let first = factory.resolve(&ssh_root()).unwrap();
    let again = factory.resolve(&ProjectRoot::ssh(target(), "/srv/other")).unwrap();
    assert!(first.same_as(&again));
    assert_eq!(first.kind(), ProviderKind::Ssh);

    // New handshake invalidates
    transport.drop_session();
    conn.reconnect().await.unwrap();
    let after = factory.resolve(&ssh_root()).unwrap();
    assert!(!after.same_as(&first));

    // Local is untouched by ssh churn
    let local = factory.resolve(&ProjectRoot::local("/x")).unwrap();
    assert!(local.same_as(&factory.resolve(&ProjectRoot::local("/y")).unwrap()));
}

#[tokio::test]
async fn registering_a_new_connection_drops_cache() {
    let factory = ProviderFactory::new(CommandPolicy::default());
    let transport = FakeSshTransport::new();
    factory.register_connection(connection(&transport));
    let first = factory.resolve(&ssh_root()).unwrap();

    factory.register_connection(connection(&transport));
    let second = factory.resolve(&ssh_root()).unwrap();
    assert!(!first.same_as(&second));
}
