//! In-memory cluster for testing
//!
//! Holds release Secrets and resources in memory and counts every call, so
//! tests can assert exactly how many reads a scan performed without a
//! Kubernetes cluster.

use async_trait::async_trait;
use helmscan_core::{ResourceScope, builtin_scope, release_secret_name};
use kube::core::GroupVersionKind;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::{ClusterReader, Lookup, NAME_LABEL, OWNER_HELM, OWNER_LABEL, ReleaseSecret, VERSION_LABEL};
use crate::error::Result;

/// (group, kind, namespace, name)
type ResourceKey = (String, String, Option<String>, String);

#[derive(Default)]
struct State {
    /// namespace -> secret name -> secret
    secrets: HashMap<String, BTreeMap<String, ReleaseSecret>>,
    /// Resources that exist
    resources: HashMap<ResourceKey, Lookup>,
    /// One-shot responses consumed before falling back to `resources`
    scripted: HashMap<ResourceKey, VecDeque<Lookup>>,
    delays: HashMap<ResourceKey, Duration>,
    /// (group, kind) -> scope, overriding the built-in table
    scopes: HashMap<(String, String), Option<ResourceScope>>,
    /// (group, kind) -> scope lookups left to fail
    scope_failures: HashMap<(String, String), usize>,
}

/// In-memory cluster reader for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<State>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of reads performed, for test assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub secret_gets: usize,
    pub secret_lists: usize,
    pub scope_lookups: usize,
    pub resource_gets: usize,
}

impl OperationCounts {
    /// Every list call of any kind
    pub fn lists(&self) -> usize {
        self.secret_lists
    }
}

fn key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> ResourceKey {
    (
        gvk.group.clone(),
        gvk.kind.clone(),
        namespace.map(String::from),
        name.to_string(),
    )
}

fn unavailable() -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "the server is currently unable to handle the request".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    })
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.rsplit_once('/').unwrap_or(("", api_version))
}

fn manifest_key(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> ResourceKey {
    let (group, _) = split_api_version(api_version);
    (
        group.to_string(),
        kind.to_string(),
        namespace.map(String::from),
        name.to_string(),
    )
}

impl MockCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release revision stored the way Helm stores it
    ///
    /// `payload` is the raw `data.release` content.
    pub fn with_release(
        self,
        name: &str,
        namespace: &str,
        revision: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        let labels = BTreeMap::from([
            (OWNER_LABEL.to_string(), OWNER_HELM.to_string()),
            (NAME_LABEL.to_string(), name.to_string()),
            (VERSION_LABEL.to_string(), revision.to_string()),
        ]);
        self.with_secret(ReleaseSecret {
            name: release_secret_name(name, revision),
            namespace: namespace.to_string(),
            labels,
            payload: Some(payload.into()),
        })
    }

    /// Add an arbitrary Secret
    pub fn with_secret(self, secret: ReleaseSecret) -> Self {
        self.write_state()
            .secrets
            .entry(secret.namespace.clone())
            .or_default()
            .insert(secret.name.clone(), secret);
        self
    }

    /// Add a live resource
    pub fn with_resource(
        self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Self {
        self.with_response(api_version, kind, namespace, name, Lookup::Found)
    }

    /// Answer every GET for a resource with `lookup`
    pub fn with_response(
        self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        lookup: Lookup,
    ) -> Self {
        let key = manifest_key(api_version, kind, namespace, name);
        self.write_state().resources.insert(key, lookup);
        self
    }

    /// Answer the next GETs for a resource with `responses`, in order
    ///
    /// Once the script runs out the regular response applies.
    pub fn with_scripted(
        self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        responses: impl IntoIterator<Item = Lookup>,
    ) -> Self {
        let key = manifest_key(api_version, kind, namespace, name);
        self.write_state()
            .scripted
            .entry(key)
            .or_default()
            .extend(responses);
        self
    }

    /// Delay every GET for a resource
    pub fn with_delay(
        self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        delay: Duration,
    ) -> Self {
        let key = manifest_key(api_version, kind, namespace, name);
        self.write_state().delays.insert(key, delay);
        self
    }

    /// Declare the scope of a kind; `None` makes it unknown
    pub fn with_scope(self, api_version: &str, kind: &str, scope: Option<ResourceScope>) -> Self {
        let (group, _) = split_api_version(api_version);
        self.write_state()
            .scopes
            .insert((group.to_string(), kind.to_string()), scope);
        self
    }

    /// Fail the next `times` scope lookups of a kind with a 503
    pub fn with_scope_failures(self, api_version: &str, kind: &str, times: usize) -> Self {
        let (group, _) = split_api_version(api_version);
        self.write_state()
            .scope_failures
            .insert((group.to_string(), kind.to_string()), times);
        self
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner));
    }
}

#[async_trait]
impl ClusterReader for MockCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<ReleaseSecret>> {
        self.count(|ops| ops.secret_gets += 1);

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .secrets
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned())
    }

    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ReleaseSecret>> {
        self.count(|ops| ops.secret_lists += 1);

        // Equality selectors only: `k=v,k2=v2`
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter_map(|term| term.split_once('='))
            .collect();

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .secrets
            .get(namespace)
            .map(|ns| {
                ns.values()
                    .filter(|s| {
                        wanted
                            .iter()
                            .all(|(k, v)| s.labels.get(*k).map(String::as_str) == Some(*v))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn resource_scope(&self, gvk: &GroupVersionKind) -> Result<Option<ResourceScope>> {
        self.count(|ops| ops.scope_lookups += 1);

        let group_kind = (gvk.group.clone(), gvk.kind.clone());
        let mut state = self.write_state();
        if let Some(left) = state.scope_failures.get_mut(&group_kind).filter(|left| **left > 0) {
            *left -= 1;
            return Err(unavailable().into());
        }
        Ok(state
            .scopes
            .get(&group_kind)
            .copied()
            .unwrap_or_else(|| builtin_scope(&gvk.group, &gvk.kind)))
    }

    async fn get_resource(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Lookup {
        self.count(|ops| ops.resource_gets += 1);

        let key = key(gvk, namespace, name);
        let delay = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            state.delays.get(&key).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.write_state();
        if let Some(next) = state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
            return next;
        }
        state.resources.get(&key).cloned().unwrap_or(Lookup::NotFound)
    }
}
