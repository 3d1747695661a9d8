//! Resource identifiers and existence results

use serde::Serialize;

/// Whether a resource type lives inside a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceScope {
    /// Bound to exactly one namespace (Deployment, ConfigMap, ...)
    Namespaced,
    /// Not bound to a namespace (ClusterRole, Namespace, ...)
    Cluster,
}

/// Identifier of one resource declared in a release manifest
///
/// `kind` and `name` are never empty. The namespace is whatever the manifest
/// declared until [`ResourceRef::scoped`] normalises it against the resource's
/// scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    api_version: String,
    kind: String,
    namespace: Option<String>,
    name: String,
}

impl ResourceRef {
    /// Build a reference, returning `None` if `kind` or `name` is empty
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
    ) -> Option<Self> {
        let kind = kind.into();
        let name = name.into();
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            api_version: api_version.into(),
            kind,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            name,
        })
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split `apiVersion` into group and version
    ///
    /// - "apps/v1" -> ("apps", "v1")
    /// - "v1" -> ("", "v1") (core API)
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.rsplit_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }

    /// Normalise the namespace against the resource's scope
    ///
    /// Cluster-scoped resources carry no namespace. Namespaced resources keep
    /// an explicit manifest namespace and otherwise fall back to
    /// `default_namespace`.
    pub fn scoped(&self, scope: ResourceScope, default_namespace: &str) -> Self {
        let namespace = match scope {
            ResourceScope::Cluster => None,
            ResourceScope::Namespaced => Some(
                self.namespace
                    .clone()
                    .unwrap_or_else(|| default_namespace.to_string()),
            ),
        };
        Self {
            namespace,
            ..self.clone()
        }
    }

    /// Display name for logging (`ns/Kind/name` or `Kind/name`)
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Why an existence check could not give an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason", content = "detail")]
pub enum CheckFailure {
    /// The API server refused the GET (403)
    Forbidden,
    /// Neither discovery nor the built-in table knows the kind
    UnknownScope,
    /// The resolver deadline passed before this check finished
    Timeout,
    /// The run was interrupted before this check finished
    Cancelled,
    /// Any other API or transport failure
    Transport(String),
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckFailure::Forbidden => write!(f, "forbidden"),
            CheckFailure::UnknownScope => write!(f, "unknown resource scope"),
            CheckFailure::Timeout => write!(f, "timeout"),
            CheckFailure::Cancelled => write!(f, "cancelled"),
            CheckFailure::Transport(detail) => write!(f, "{}", detail),
        }
    }
}

/// Live-cluster status of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "error")]
pub enum ExistenceStatus {
    Exists,
    Absent,
    CheckError(CheckFailure),
}

impl ExistenceStatus {
    pub fn is_exists(&self) -> bool {
        matches!(self, ExistenceStatus::Exists)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ExistenceStatus::Absent)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExistenceStatus::CheckError(_))
    }
}

impl std::fmt::Display for ExistenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExistenceStatus::Exists => write!(f, "exists"),
            ExistenceStatus::Absent => write!(f, "absent"),
            ExistenceStatus::CheckError(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Outcome of checking one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceResult {
    #[serde(rename = "resource")]
    pub reference: ResourceRef,
    #[serde(flatten)]
    pub status: ExistenceStatus,
}

impl ExistenceResult {
    pub fn new(reference: ResourceRef, status: ExistenceStatus) -> Self {
        Self { reference, status }
    }

    pub fn failed(reference: ResourceRef, failure: CheckFailure) -> Self {
        Self::new(reference, ExistenceStatus::CheckError(failure))
    }
}
