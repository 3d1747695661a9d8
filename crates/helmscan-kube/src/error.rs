//! Error types for helmscan-kube

use thiserror::Error;

/// Result type for helmscan-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that abort a release scan
///
/// Per-resource failures never show up here; they are reported as
/// `ExistenceStatus::CheckError` on the affected row.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No Secret exists for the release at all
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// The requested revision has no Secret
    #[error("release '{name}' revision {revision} not found in namespace '{namespace}'")]
    RevisionNotFound {
        name: String,
        namespace: String,
        revision: u32,
    },

    /// The Secret exists but does not hold a release payload
    #[error("secret '{secret}' is not a usable release record: {reason}")]
    InvalidReleaseSecret { secret: String, reason: String },

    /// Payload decoding or manifest parsing failed
    #[error(transparent)]
    Core(#[from] helmscan_core::CoreError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The scan was interrupted before resources were checked
    #[error("scan cancelled")]
    Cancelled,
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a Kubernetes 403 Forbidden error
    pub fn is_forbidden(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 403)
    }

    /// Release or revision missing
    pub fn is_release_missing(&self) -> bool {
        matches!(
            self,
            KubeError::ReleaseNotFound { .. } | KubeError::RevisionNotFound { .. }
        )
    }
}
