//! Release query input
//!
//! A [`ReleaseQuery`] is validated when it is built, so every later stage can
//! assume a well-formed release name and namespace.

use regex::Regex;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::LazyLock;

use crate::error::{CoreError, Result};

/// Helm refuses release names longer than this
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Kubernetes namespaces are DNS-1123 labels
pub const MAX_NAMESPACE_LEN: usize = 63;

static RELEASE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("release name pattern is valid")
});

static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("namespace pattern is valid")
});

/// Which release revision to inspect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseQuery {
    name: String,
    namespace: String,
    revision: Option<NonZeroU32>,
}

impl ReleaseQuery {
    /// Build a query, rejecting malformed input before any cluster I/O happens
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        revision: Option<u32>,
    ) -> Result<Self> {
        let name = name.into();
        let namespace = namespace.into();

        if name.is_empty() {
            return Err(CoreError::invalid_query("release name", "must not be empty"));
        }
        if name.len() > MAX_RELEASE_NAME_LEN {
            return Err(CoreError::invalid_query(
                "release name",
                format!("'{}' is longer than {} characters", name, MAX_RELEASE_NAME_LEN),
            ));
        }
        if !RELEASE_NAME_RE.is_match(&name) {
            return Err(CoreError::invalid_query(
                "release name",
                format!(
                    "'{}' must consist of lowercase alphanumerics, '-' or '.'",
                    name
                ),
            ));
        }

        if namespace.is_empty() {
            return Err(CoreError::invalid_query("namespace", "must not be empty"));
        }
        if namespace.len() > MAX_NAMESPACE_LEN || !NAMESPACE_RE.is_match(&namespace) {
            return Err(CoreError::invalid_query(
                "namespace",
                format!("'{}' is not a valid DNS-1123 label", namespace),
            ));
        }

        let revision = match revision {
            None => None,
            Some(r) => Some(NonZeroU32::new(r).ok_or_else(|| {
                CoreError::invalid_query("revision", "must be a positive integer")
            })?),
        };

        Ok(Self {
            name,
            namespace,
            revision,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Requested revision, `None` meaning "latest"
    pub fn revision(&self) -> Option<u32> {
        self.revision.map(NonZeroU32::get)
    }

    /// Human-readable revision selector for messages
    pub fn revision_display(&self) -> String {
        match self.revision {
            Some(r) => format!("revision {}", r),
            None => "latest revision".to_string(),
        }
    }
}
