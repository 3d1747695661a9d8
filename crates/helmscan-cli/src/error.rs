//! CLI error types with exit code handling
//!
//! Every failure that stops a scan ends up here, carrying the help text shown
//! under the diagnostic and the exit code the process returns.

use helmscan_core::CoreError;
use helmscan_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid arguments, rejected before touching the cluster
    #[error("{message}")]
    #[diagnostic(code(helmscan::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Release or revision missing
    #[error("{message}")]
    #[diagnostic(code(helmscan::release::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Release payload in an unknown encoding
    #[error("{message}")]
    #[diagnostic(
        code(helmscan::release::decode),
        help("the Secret may not have been written by Helm 3")
    )]
    Decode { message: String },

    /// No document of the manifest could be read
    #[error("{message}")]
    #[diagnostic(code(helmscan::release::parse))]
    Parse { message: String },

    /// Cluster unreachable or refused a release lookup
    #[error("{message}")]
    #[diagnostic(code(helmscan::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Ctrl-C before the scan produced a report
    #[error("Interrupted")]
    #[diagnostic(code(helmscan::cli::interrupted))]
    Interrupted,

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(helmscan::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Decode { .. } => exit_codes::DECODE_ERROR,
            CliError::Parse { .. } => exit_codes::PARSE_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Interrupted => exit_codes::INTERRUPTED,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: None,
        }
    }

    /// Create a usage error with help text
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Failure building the cluster client
    pub fn cluster_connect(err: &KubeError) -> Self {
        Self::Cluster {
            message: format!("Cannot connect to the cluster: {}", err),
            help: Some("check KUBECONFIG and the current context (kubectl config current-context)".to_string()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::InvalidQuery { field, .. } => {
                let help = match *field {
                    "revision" => "revisions start at 1; omit --revision for the latest",
                    _ => "release names and namespaces are lowercase DNS names",
                };
                CliError::usage_with_help(err.to_string(), help)
            }
            CoreError::Decode { .. } => CliError::Decode {
                message: err.to_string(),
            },
            CoreError::Parse { .. } => CliError::Parse {
                message: err.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::ReleaseNotFound {
                ref name,
                ref namespace,
            } => CliError::NotFound {
                help: Some(format!(
                    "run `helm list -n {}` to see its releases, or `helm list -A` to search every namespace",
                    namespace
                )),
                message: format!("Helm release '{}' not found in namespace '{}'", name, namespace),
            },
            KubeError::RevisionNotFound {
                ref name,
                ref namespace,
                revision,
            } => CliError::NotFound {
                help: Some(format!(
                    "run `helm history {} -n {}` to list stored revisions",
                    name, namespace
                )),
                message: format!(
                    "Helm release '{}' revision {} not found in namespace '{}'",
                    name, revision, namespace
                ),
            },
            KubeError::InvalidReleaseSecret { .. } => CliError::Decode {
                message: err.to_string(),
            },
            KubeError::Core(core) => core.into(),
            KubeError::InvalidConfig(message) => CliError::usage(message),
            KubeError::Cancelled => CliError::Interrupted,
            ref api if api.is_forbidden() => CliError::Cluster {
                message: err.to_string(),
                help: Some("reading releases needs get/list permission on Secrets in the release namespace".to_string()),
            },
            other => CliError::Cluster {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_found: CliError = KubeError::RevisionNotFound {
            name: "web".to_string(),
            namespace: "prod".to_string(),
            revision: 5,
        }
        .into();
        assert_eq!(not_found.exit_code(), exit_codes::NOT_FOUND);
        assert!(not_found.to_string().contains("revision 5"));

        let interrupted: CliError = KubeError::Cancelled.into();
        assert_eq!(interrupted.exit_code(), exit_codes::INTERRUPTED);

        let invalid = helmscan_core::ReleaseQuery::new("web", "prod", Some(0)).unwrap_err();
        assert_eq!(CliError::from(invalid).exit_code(), exit_codes::USAGE_ERROR);
    }

    #[test]
    fn test_core_errors_through_kube() {
        let parse = helmscan_core::manifest::parse("a: [\n").unwrap_err();
        let err: CliError = KubeError::Core(parse).into();
        assert_eq!(err.exit_code(), exit_codes::PARSE_ERROR);

        let decode = helmscan_core::payload::decode(b"%%%").unwrap_err();
        let err: CliError = KubeError::Core(decode).into();
        assert_eq!(err.exit_code(), exit_codes::DECODE_ERROR);
    }

    #[test]
    fn test_forbidden_lookup_is_cluster_error() {
        let err: CliError = KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "secrets is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }))
        .into();

        assert_eq!(err.exit_code(), exit_codes::CLUSTER_ERROR);
        match err {
            CliError::Cluster { help, .. } => assert!(help.unwrap().contains("Secrets")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
