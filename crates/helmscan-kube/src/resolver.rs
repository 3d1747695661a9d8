//! Live-cluster existence checks
//!
//! Each manifest resource costs one scope lookup and one targeted GET (two on
//! a transient failure). Checks run on a bounded worker pool and results are
//! written back by document position, so the output order is the manifest
//! order whatever order the checks finish in.

use helmscan_core::{CheckFailure, ExistenceResult, ExistenceStatus, ResourceRef};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cluster::{ClusterReader, Lookup, gvk_of};
use crate::error::{KubeError, Result};

/// Default number of checks in flight
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Upper bound on checks in flight
pub const MAX_CONCURRENCY: usize = 64;

/// Default deadline for the whole resolution phase
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// Resolver tuning
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Checks in flight at once (1..=64)
    pub concurrency: usize,

    /// Overall deadline; unfinished checks become `timeout` errors
    pub deadline: Duration,

    /// Pause before retrying a transient failure
    pub retry_backoff: Duration,

    /// Retry transient failures once
    pub retry_transient: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deadline: DEFAULT_DEADLINE,
            retry_backoff: Duration::from_millis(250),
            retry_transient: true,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(KubeError::InvalidConfig(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        if self.deadline.is_zero() {
            return Err(KubeError::InvalidConfig(
                "deadline must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Results of a batch resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// One result per input resource, in input order
    pub results: Vec<ExistenceResult>,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl ResolveOutcome {
    pub fn interrupted(&self) -> bool {
        self.timed_out || self.cancelled
    }
}

/// Checks whether manifest resources exist in the cluster
pub struct ExistenceResolver<C: ClusterReader + ?Sized + 'static> {
    cluster: Arc<C>,
    config: ResolverConfig,
}

impl<C: ClusterReader + ?Sized + 'static> ExistenceResolver<C> {
    pub fn new(cluster: Arc<C>, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { cluster, config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Check a single resource
    pub async fn resolve(&self, reference: ResourceRef, release_namespace: &str) -> ExistenceResult {
        check(self.cluster.as_ref(), &self.config, reference, release_namespace).await
    }

    /// Check every resource concurrently, keeping input order
    ///
    /// When `cancel` completes or the deadline passes, in-flight checks are
    /// aborted; finished results are kept and the rest are reported as
    /// `cancelled` or `timeout`.
    pub async fn resolve_all(
        &self,
        resources: &[ResourceRef],
        release_namespace: &str,
        cancel: impl Future<Output = ()>,
    ) -> ResolveOutcome {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut join_set: JoinSet<(usize, ExistenceResult)> = JoinSet::new();

        for (index, reference) in resources.iter().cloned().enumerate() {
            let cluster = Arc::clone(&self.cluster);
            let sem = Arc::clone(&semaphore);
            let config = self.config.clone();
            let namespace = release_namespace.to_string();

            join_set.spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let failure = CheckFailure::Transport("worker pool closed".to_string());
                        return (index, ExistenceResult::failed(reference, failure));
                    }
                };
                (index, check(cluster.as_ref(), &config, reference, &namespace).await)
            });
        }

        let mut slots: Vec<Option<ExistenceResult>> = vec![None; resources.len()];
        let mut outcome = ResolveOutcome::default();

        let deadline = tokio::time::sleep(self.config.deadline);
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    warn!("resolution cancelled, aborting in-flight checks");
                    outcome.cancelled = true;
                    break;
                }
                _ = &mut deadline => {
                    warn!(deadline = ?self.config.deadline, "resolution deadline passed, aborting in-flight checks");
                    outcome.timed_out = true;
                    break;
                }
                joined = join_set.join_next() => match joined {
                    Some(Ok((index, result))) => slots[index] = Some(result),
                    Some(Err(err)) => warn!(error = %err, "existence check task failed"),
                    None => break,
                }
            }
        }
        // Checks that finished alongside the cancel or deadline still count
        while let Some(joined) = join_set.try_join_next() {
            if let Ok((index, result)) = joined {
                slots[index] = Some(result);
            }
        }
        join_set.abort_all();

        let unresolved = if outcome.cancelled {
            CheckFailure::Cancelled
        } else if outcome.timed_out {
            CheckFailure::Timeout
        } else {
            CheckFailure::Transport("check did not complete".to_string())
        };

        outcome.results = slots
            .into_iter()
            .zip(resources)
            .map(|(slot, reference)| {
                slot.unwrap_or_else(|| ExistenceResult::failed(reference.clone(), unresolved.clone()))
            })
            .collect();
        outcome
    }
}

async fn check<C: ClusterReader + ?Sized>(
    cluster: &C,
    config: &ResolverConfig,
    reference: ResourceRef,
    release_namespace: &str,
) -> ExistenceResult {
    let gvk = gvk_of(&reference);

    let mut scope = cluster.resource_scope(&gvk).await;
    if config.retry_transient {
        if let Err(err) = &scope {
            warn!(
                resource = %reference.display_name(),
                error = %err,
                backoff = ?config.retry_backoff,
                "scope lookup failed, retrying once"
            );
            tokio::time::sleep(config.retry_backoff).await;
            scope = cluster.resource_scope(&gvk).await;
        }
    }

    let scope = match scope {
        Ok(Some(scope)) => scope,
        Ok(None) => {
            debug!(resource = %reference.display_name(), "unknown resource scope");
            return ExistenceResult::failed(reference, CheckFailure::UnknownScope);
        }
        Err(err) => {
            return ExistenceResult::failed(reference, CheckFailure::Transport(err.to_string()));
        }
    };

    let reference = reference.scoped(scope, release_namespace);
    let mut lookup = cluster
        .get_resource(&gvk, reference.namespace(), reference.name())
        .await;

    if config.retry_transient {
        if let Lookup::Transport {
            detail,
            transient: true,
        } = &lookup
        {
            warn!(
                resource = %reference.display_name(),
                error = %detail,
                backoff = ?config.retry_backoff,
                "transient failure, retrying once"
            );
            tokio::time::sleep(config.retry_backoff).await;
            lookup = cluster
                .get_resource(&gvk, reference.namespace(), reference.name())
                .await;
        }
    }

    let status = match lookup {
        Lookup::Found => ExistenceStatus::Exists,
        Lookup::NotFound => ExistenceStatus::Absent,
        Lookup::Forbidden => ExistenceStatus::CheckError(CheckFailure::Forbidden),
        Lookup::Transport { detail, .. } => {
            ExistenceStatus::CheckError(CheckFailure::Transport(detail))
        }
    };
    debug!(resource = %reference.display_name(), %status, "checked");
    ExistenceResult::new(reference, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;
    use helmscan_core::ResourceScope;
    use std::future::pending;

    fn fast_config() -> ResolverConfig {
        ResolverConfig {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn resolver(cluster: &MockCluster) -> ExistenceResolver<MockCluster> {
        ExistenceResolver::new(Arc::new(cluster.clone()), fast_config()).unwrap()
    }

    fn resource(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> ResourceRef {
        ResourceRef::new(api_version, kind, namespace.map(String::from), name).unwrap()
    }

    fn transient() -> Lookup {
        Lookup::Transport {
            detail: "503 Service Unavailable".to_string(),
            transient: true,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.deadline, Duration::from_secs(60));
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert!(config.retry_transient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_bounds() {
        for concurrency in [0, 65] {
            let config = ResolverConfig {
                concurrency,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(KubeError::InvalidConfig(_))));
        }
        let config = ResolverConfig {
            concurrency: 64,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = ResolverConfig {
            deadline: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_namespaced_defaults_to_release_namespace() {
        let cluster = MockCluster::new().with_resource("v1", "ConfigMap", Some("prod"), "cfg");
        let result = resolver(&cluster)
            .resolve(resource("v1", "ConfigMap", None, "cfg"), "prod")
            .await;

        assert_eq!(result.status, ExistenceStatus::Exists);
        assert_eq!(result.reference.namespace(), Some("prod"));
    }

    #[tokio::test]
    async fn test_explicit_namespace_wins() {
        let cluster = MockCluster::new().with_resource("v1", "ConfigMap", Some("prod"), "cfg");
        let result = resolver(&cluster)
            .resolve(resource("v1", "ConfigMap", Some("team-a"), "cfg"), "prod")
            .await;

        assert_eq!(result.status, ExistenceStatus::Absent);
        assert_eq!(result.reference.namespace(), Some("team-a"));
    }

    #[tokio::test]
    async fn test_cluster_scoped_has_no_namespace() {
        let cluster = MockCluster::new().with_resource(
            "rbac.authorization.k8s.io/v1",
            "ClusterRole",
            None,
            "reader",
        );
        let result = resolver(&cluster)
            .resolve(
                resource("rbac.authorization.k8s.io/v1", "ClusterRole", Some("prod"), "reader"),
                "prod",
            )
            .await;

        assert_eq!(result.status, ExistenceStatus::Exists);
        assert_eq!(result.reference.namespace(), None);
    }

    #[tokio::test]
    async fn test_unknown_scope_is_not_fetched() {
        let cluster = MockCluster::new();
        let result = resolver(&cluster)
            .resolve(resource("example.com/v1", "Widget", None, "w"), "prod")
            .await;

        assert_eq!(
            result.status,
            ExistenceStatus::CheckError(CheckFailure::UnknownScope)
        );
        assert_eq!(cluster.operation_counts().resource_gets, 0);
    }

    #[tokio::test]
    async fn test_discovered_crd_scope() {
        let cluster = MockCluster::new()
            .with_scope("example.com/v1", "Widget", Some(ResourceScope::Namespaced))
            .with_resource("example.com/v1", "Widget", Some("prod"), "w");
        let result = resolver(&cluster)
            .resolve(resource("example.com/v1", "Widget", None, "w"), "prod")
            .await;

        assert!(result.status.is_exists());
    }

    #[tokio::test]
    async fn test_forbidden_is_a_check_error() {
        let cluster = MockCluster::new().with_response(
            "v1",
            "Secret",
            Some("prod"),
            "creds",
            Lookup::Forbidden,
        );
        let result = resolver(&cluster)
            .resolve(resource("v1", "Secret", None, "creds"), "prod")
            .await;

        assert_eq!(result.status, ExistenceStatus::CheckError(CheckFailure::Forbidden));
        assert_eq!(cluster.operation_counts().resource_gets, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let cluster = MockCluster::new()
            .with_resource("apps/v1", "Deployment", Some("prod"), "web")
            .with_scripted("apps/v1", "Deployment", Some("prod"), "web", [transient()]);
        let result = resolver(&cluster)
            .resolve(resource("apps/v1", "Deployment", None, "web"), "prod")
            .await;

        assert_eq!(result.status, ExistenceStatus::Exists);
        assert_eq!(cluster.operation_counts().resource_gets, 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_surfaces() {
        let cluster = MockCluster::new().with_scripted(
            "apps/v1",
            "Deployment",
            Some("prod"),
            "web",
            [transient(), transient(), Lookup::Found],
        );
        let result = resolver(&cluster)
            .resolve(resource("apps/v1", "Deployment", None, "web"), "prod")
            .await;

        assert_eq!(
            result.status,
            ExistenceStatus::CheckError(CheckFailure::Transport(
                "503 Service Unavailable".to_string()
            ))
        );
        assert_eq!(cluster.operation_counts().resource_gets, 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let cluster = MockCluster::new().with_response(
            "apps/v1",
            "Deployment",
            Some("prod"),
            "web",
            Lookup::Transport {
                detail: "400 Bad Request".to_string(),
                transient: false,
            },
        );
        let result = resolver(&cluster)
            .resolve(resource("apps/v1", "Deployment", None, "web"), "prod")
            .await;

        assert!(result.status.is_error());
        assert_eq!(cluster.operation_counts().resource_gets, 1);
    }

    #[tokio::test]
    async fn test_retry_disabled() {
        let cluster = MockCluster::new()
            .with_resource("apps/v1", "Deployment", Some("prod"), "web")
            .with_scripted("apps/v1", "Deployment", Some("prod"), "web", [transient()]);
        let config = ResolverConfig {
            retry_transient: false,
            ..fast_config()
        };
        let resolver = ExistenceResolver::new(Arc::new(cluster.clone()), config).unwrap();
        let result = resolver
            .resolve(resource("apps/v1", "Deployment", None, "web"), "prod")
            .await;

        assert!(result.status.is_error());
        assert_eq!(cluster.operation_counts().resource_gets, 1);
    }

    #[tokio::test]
    async fn test_order_kept_despite_completion_order() {
        // The first resource finishes last
        let cluster = MockCluster::new()
            .with_resource("v1", "ConfigMap", Some("prod"), "slow")
            .with_delay("v1", "ConfigMap", Some("prod"), "slow", Duration::from_millis(100))
            .with_resource("v1", "ConfigMap", Some("prod"), "fast-1");

        let resources = vec![
            resource("v1", "ConfigMap", None, "slow"),
            resource("v1", "ConfigMap", None, "fast-1"),
            resource("v1", "ConfigMap", None, "fast-2"),
        ];
        let outcome = resolver(&cluster)
            .resolve_all(&resources, "prod", pending())
            .await;

        let names: Vec<_> = outcome.results.iter().map(|r| r.reference.name()).collect();
        assert_eq!(names, vec!["slow", "fast-1", "fast-2"]);
        assert!(outcome.results[0].status.is_exists());
        assert!(outcome.results[1].status.is_exists());
        assert!(outcome.results[2].status.is_absent());
        assert!(!outcome.interrupted());
        assert_eq!(cluster.operation_counts().lists(), 0);
    }

    #[tokio::test]
    async fn test_deadline_marks_unfinished_as_timeout() {
        let cluster = MockCluster::new()
            .with_resource("v1", "ConfigMap", Some("prod"), "quick")
            .with_delay("v1", "ConfigMap", Some("prod"), "stuck", Duration::from_secs(30));
        let config = ResolverConfig {
            deadline: Duration::from_millis(200),
            ..fast_config()
        };
        let resolver = ExistenceResolver::new(Arc::new(cluster), config).unwrap();

        let resources = vec![
            resource("v1", "ConfigMap", None, "quick"),
            resource("v1", "ConfigMap", None, "stuck"),
        ];
        let outcome = resolver.resolve_all(&resources, "prod", pending()).await;

        assert!(outcome.timed_out);
        assert!(outcome.results[0].status.is_exists());
        assert_eq!(
            outcome.results[1].status,
            ExistenceStatus::CheckError(CheckFailure::Timeout)
        );
    }

    #[tokio::test]
    async fn test_cancel_marks_unfinished_as_cancelled() {
        let cluster = MockCluster::new()
            .with_resource("v1", "ConfigMap", Some("prod"), "quick")
            .with_delay("v1", "ConfigMap", Some("prod"), "stuck", Duration::from_secs(30));
        let resolver = resolver(&cluster);

        let resources = vec![
            resource("v1", "ConfigMap", None, "quick"),
            resource("v1", "ConfigMap", None, "stuck"),
        ];
        let cancel = tokio::time::sleep(Duration::from_millis(200));
        let outcome = resolver.resolve_all(&resources, "prod", cancel).await;

        assert!(outcome.cancelled);
        assert!(!outcome.timed_out);
        assert!(outcome.results[0].status.is_exists());
        assert_eq!(
            outcome.results[1].status,
            ExistenceStatus::CheckError(CheckFailure::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_transient_scope_failure_retried_once() {
        let cluster = MockCluster::new()
            .with_scope_failures("apps/v1", "Deployment", 1)
            .with_resource("apps/v1", "Deployment", Some("prod"), "web");
        let result = resolver(&cluster)
            .resolve(resource("apps/v1", "Deployment", None, "web"), "prod")
            .await;

        assert_eq!(result.status, ExistenceStatus::Exists);
        assert_eq!(cluster.operation_counts().scope_lookups, 2);
    }

    #[tokio::test]
    async fn test_repeated_scope_failure_surfaces() {
        let cluster = MockCluster::new()
            .with_scope_failures("apps/v1", "Deployment", 2)
            .with_resource("apps/v1", "Deployment", Some("prod"), "web");
        let result = resolver(&cluster)
            .resolve(resource("apps/v1", "Deployment", None, "web"), "prod")
            .await;

        assert!(matches!(
            result.status,
            ExistenceStatus::CheckError(CheckFailure::Transport(_))
        ));
        assert_eq!(cluster.operation_counts().scope_lookups, 2);
        assert_eq!(cluster.operation_counts().resource_gets, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_checks_finished_before_cancel_are_kept() {
        let cluster = MockCluster::new()
            .with_resource("v1", "ConfigMap", Some("prod"), "a")
            .with_resource("v1", "ConfigMap", Some("prod"), "b")
            .with_delay("v1", "ConfigMap", Some("prod"), "stuck", Duration::from_secs(30));
        let resolver = resolver(&cluster);

        let resources = vec![
            resource("v1", "ConfigMap", None, "a"),
            resource("v1", "ConfigMap", None, "b"),
            resource("v1", "ConfigMap", None, "stuck"),
        ];
        // Blocks the resolving thread while the workers finish the quick
        // checks, so they complete before anything joins them.
        let cancel = async { std::thread::sleep(Duration::from_millis(300)) };
        let outcome = resolver.resolve_all(&resources, "prod", cancel).await;

        assert!(outcome.cancelled);
        assert!(outcome.results[0].status.is_exists());
        assert!(outcome.results[1].status.is_exists());
        assert_eq!(
            outcome.results[2].status,
            ExistenceStatus::CheckError(CheckFailure::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        let cluster = MockCluster::new();
        let outcome = resolver(&cluster).resolve_all(&[], "prod", pending()).await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.interrupted());
    }
}
