// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves project roots to provider pairs, caching by connection identity.

use crate::{
    CommandPolicy, ConnectionHandle, FileSystemProvider, LocalProvider, ProcessProvider,
    ProviderError, ProviderKind, SshProvider,
};
use parking_lot::Mutex;
use sdd_core::{ExecutionTarget, ProjectRoot, SshTarget};
use std::collections::HashMap;
use std::sync::Arc;

/// Process and filesystem providers for one execution target.
#[derive(Clone)]
pub struct ProviderPair {
    pub process: Arc<dyn ProcessProvider>,
    pub fs: Arc<dyn FileSystemProvider>,
}

impl ProviderPair {
    pub fn new(process: Arc<dyn ProcessProvider>, fs: Arc<dyn FileSystemProvider>) -> Self {
        Self { process, fs }
    }

    pub fn kind(&self) -> ProviderKind {
        self.process.kind()
    }

    /// Whether both halves are the same instances as `other`'s.
    pub fn same_as(&self, other: &ProviderPair) -> bool {
        Arc::ptr_eq(&self.process, &other.process) && Arc::ptr_eq(&self.fs, &other.fs)
    }
}

struct CachedSsh {
    generation: u64,
    pair: ProviderPair,
}

/// Sole owner of connection handles and cached providers.
pub struct ProviderFactory {
    local: ProviderPair,
    policy: CommandPolicy,
    connections: Mutex<HashMap<SshTarget, Arc<ConnectionHandle>>>,
    ssh_cache: Mutex<HashMap<SshTarget, CachedSsh>>,
}

impl ProviderFactory {
    pub fn new(policy: CommandPolicy) -> Self {
        let local = Arc::new(LocalProvider::new(policy.clone()));
        Self::with_local(ProviderPair::new(local.clone(), local), policy)
    }

    /// Use `local` for every local root.
    pub fn with_local(local: ProviderPair, policy: CommandPolicy) -> Self {
        Self {
            local,
            policy,
            connections: Mutex::new(HashMap::new()),
            ssh_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the connection for its target. Cached providers
    /// bound to a previous connection are dropped.
    pub fn register_connection(&self, handle: Arc<ConnectionHandle>) {
        let target = handle.target().clone();
        self.ssh_cache.lock().remove(&target);
        self.connections.lock().insert(target, handle);
    }

    pub fn connection(&self, target: &SshTarget) -> Option<Arc<ConnectionHandle>> {
        self.connections.lock().get(target).cloned()
    }

    pub fn resolve(&self, root: &ProjectRoot) -> Result<ProviderPair, ProviderError> {
        match &root.target {
            ExecutionTarget::Local => Ok(self.local.clone()),
            ExecutionTarget::Ssh(target) => self.resolve_ssh(target),
        }
    }

    fn resolve_ssh(&self, target: &SshTarget) -> Result<ProviderPair, ProviderError> {
        let handle = self
            .connection(target)
            .ok_or_else(|| ProviderError::NoConnection(target.clone()))?;
        let generation = handle.generation();

        let mut cache = self.ssh_cache.lock();
        if let Some(cached) = cache.get(target) {
            if cached.generation == generation {
                return Ok(cached.pair.clone());
            }
            tracing::info!(target = %target, old = cached.generation, new = generation, "ssh session replaced, dropping cached providers");
        }
        let provider = Arc::new(SshProvider::new(handle, self.policy.clone()));
        let pair = ProviderPair::new(provider.clone(), provider);
        cache.insert(target.clone(), CachedSsh { generation, pair: pair.clone() });
        Ok(pair)
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
