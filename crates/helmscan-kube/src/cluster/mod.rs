//! Read-only cluster access
//!
//! Everything helmscan needs from the API server goes through the
//! [`ClusterReader`] trait, so the locator and resolver can run against a real
//! cluster ([`KubeCluster`]) or an in-memory one ([`MockCluster`]).
//!
//! The trait only offers targeted reads. Listing is limited to release
//! Secrets in one namespace filtered by label; there is no way to list
//! arbitrary resources.

mod live;
mod mock;

pub use live::KubeCluster;
pub use mock::{MockCluster, OperationCounts};

use async_trait::async_trait;
use helmscan_core::{ResourceRef, ResourceScope, revision_from_secret_name};
use k8s_openapi::api::core::v1::Secret;
use kube::core::GroupVersionKind;
use std::collections::BTreeMap;

use crate::error::Result;

/// Label Helm sets on every release Secret
pub const OWNER_LABEL: &str = "owner";
pub const OWNER_HELM: &str = "helm";
/// Label holding the release name
pub const NAME_LABEL: &str = "name";
/// Label holding the revision number
pub const VERSION_LABEL: &str = "version";
/// Label holding the Helm status of the revision
pub const STATUS_LABEL: &str = "status";

/// Result of a targeted GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found,
    NotFound,
    Forbidden,
    /// Any other failure; `transient` failures may succeed on retry
    Transport { detail: String, transient: bool },
}

/// The parts of a release Secret helmscan reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSecret {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Raw bytes of `data.release`
    pub payload: Option<Vec<u8>>,
}

impl ReleaseSecret {
    /// Revision from the `version` label, else from the `.v<N>` name suffix
    pub fn revision(&self) -> Option<u32> {
        self.labels
            .get(VERSION_LABEL)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .or_else(|| revision_from_secret_name(&self.name))
    }

    /// Helm status label, if set
    pub fn status(&self) -> Option<&str> {
        self.labels.get(STATUS_LABEL).map(String::as_str)
    }
}

impl From<Secret> for ReleaseSecret {
    fn from(secret: Secret) -> Self {
        let payload = secret
            .data
            .as_ref()
            .and_then(|d| d.get(helmscan_core::release::RELEASE_DATA_KEY))
            .map(|b| b.0.clone());

        Self {
            name: secret.metadata.name.unwrap_or_default(),
            namespace: secret.metadata.namespace.unwrap_or_default(),
            labels: secret.metadata.labels.unwrap_or_default(),
            payload,
        }
    }
}

/// Read-only view of a cluster
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Get a Secret by name, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<ReleaseSecret>>;

    /// List Secrets in one namespace matching a label selector
    async fn list_secrets(&self, namespace: &str, label_selector: &str)
    -> Result<Vec<ReleaseSecret>>;

    /// Scope of a resource type, `None` if the type is unknown
    async fn resource_scope(&self, gvk: &GroupVersionKind) -> Result<Option<ResourceScope>>;

    /// GET a single resource by name
    async fn get_resource(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Lookup;
}

/// GroupVersionKind of a manifest resource
pub fn gvk_of(reference: &ResourceRef) -> GroupVersionKind {
    let (group, version) = reference.group_version();
    GroupVersionKind::gvk(group, version, reference.kind())
}

/// Label selector matching every revision of a Helm release
pub fn release_selector(release: &str) -> String {
    format!("{}={},{}={}", OWNER_LABEL, OWNER_HELM, NAME_LABEL, release)
}
