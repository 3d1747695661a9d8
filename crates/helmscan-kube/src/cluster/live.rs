//! kube-rs backed cluster reader

use async_trait::async_trait;
use helmscan_core::{ResourceScope, builtin_scope};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Scope, oneshot::pinned_kind};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::{ClusterReader, Lookup, ReleaseSecret};
use crate::error::Result;

#[derive(Debug, Clone)]
struct Discovered {
    resource: ApiResource,
    scope: ResourceScope,
}

/// Cluster reader over a pre-authenticated kube [`Client`]
///
/// Discovery results are cached per GroupVersionKind for the lifetime of the
/// reader, so each type costs at most one successful discovery round trip.
/// Concurrent checks only wait on discovery of their own type.
pub struct KubeCluster {
    client: Client,
    discovered: Mutex<HashMap<GroupVersionKind, Arc<OnceCell<Option<Discovered>>>>>,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovered: Mutex::new(HashMap::new()),
        }
    }

    /// Build a reader from the ambient kubeconfig or in-cluster credentials
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn secrets_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn discover(&self, gvk: &GroupVersionKind) -> Result<Option<Discovered>> {
        let cell = {
            let mut cache = self.discovered.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry(gvk.clone()).or_default())
        };
        // A failed init leaves the cell empty, so transient errors are retried
        let discovered = cell.get_or_try_init(|| self.query_scope(gvk)).await?;
        Ok(discovered.clone())
    }

    async fn query_scope(&self, gvk: &GroupVersionKind) -> Result<Option<Discovered>> {
        let discovered = match pinned_kind(&self.client, gvk).await {
            Ok((resource, caps)) => Some(Discovered {
                resource,
                scope: match caps.scope {
                    Scope::Namespaced => ResourceScope::Namespaced,
                    Scope::Cluster => ResourceScope::Cluster,
                },
            }),
            Err(err) => {
                let fallback = builtin_scope(&gvk.group, &gvk.kind);
                debug!(
                    group = %gvk.group,
                    kind = %gvk.kind,
                    error = %err,
                    builtin = fallback.is_some(),
                    "discovery failed, using built-in scope table"
                );
                match fallback {
                    Some(scope) => Some(Discovered {
                        resource: ApiResource::from_gvk(gvk),
                        scope,
                    }),
                    // The group or kind is not served; nothing to cache yet
                    // if the failure was a transport problem.
                    None if is_transient(&err) => return Err(err.into()),
                    None => None,
                }
            }
        };
        Ok(discovered)
    }
}

#[async_trait]
impl ClusterReader for KubeCluster {
    #[instrument(skip(self))]
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<ReleaseSecret>> {
        let secret = self.secrets_api(namespace).get_opt(name).await?;
        Ok(secret.map(ReleaseSecret::from))
    }

    #[instrument(skip(self))]
    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ReleaseSecret>> {
        let lp = ListParams::default().labels(label_selector);
        let list = self.secrets_api(namespace).list(&lp).await?;
        Ok(list.items.into_iter().map(ReleaseSecret::from).collect())
    }

    async fn resource_scope(&self, gvk: &GroupVersionKind) -> Result<Option<ResourceScope>> {
        Ok(self.discover(gvk).await?.map(|d| d.scope))
    }

    async fn get_resource(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Lookup {
        let resource = match self.discover(gvk).await {
            Ok(Some(d)) => d.resource,
            Ok(None) => ApiResource::from_gvk(gvk),
            Err(err) => {
                return Lookup::Transport {
                    detail: err.to_string(),
                    transient: true,
                };
            }
        };

        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };

        match api.get_metadata(name).await {
            Ok(_) => Lookup::Found,
            Err(err) => classify(err),
        }
    }
}

/// Map a kube error from a GET onto a lookup outcome
fn classify(err: kube::Error) -> Lookup {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => Lookup::NotFound,
        kube::Error::Api(resp) if resp.code == 403 => Lookup::Forbidden,
        _ => Lookup::Transport {
            transient: is_transient(&err),
            detail: err.to_string(),
        },
    }
}

/// Errors worth one retry: throttling, server-side failures, broken transport
fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(resp) => resp.code == 429 || resp.code >= 500,
        kube::Error::HyperError(_) | kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ExistenceResolver, ResolverConfig};
    use helmscan_core::{CheckFailure, ExistenceStatus, ResourceRef};
    use kube::core::ErrorResponse;
    use serde_json::json;
    use std::future::pending;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {}", code),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(classify(api_error(404)), Lookup::NotFound);
        assert_eq!(classify(api_error(403)), Lookup::Forbidden);

        match classify(api_error(503)) {
            Lookup::Transport { transient, .. } => assert!(transient),
            other => panic!("unexpected {:?}", other),
        }
        match classify(api_error(400)) {
            Lookup::Transport { transient, detail } => {
                assert!(!transient);
                assert!(detail.contains("status 400"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transient_codes() {
        assert!(is_transient(&api_error(429)));
        assert!(is_transient(&api_error(500)));
        assert!(is_transient(&api_error(504)));
        assert!(!is_transient(&api_error(401)));
        assert!(!is_transient(&api_error(422)));
    }

    fn cluster_for(server: &MockServer) -> KubeCluster {
        let config = kube::Config::new(server.uri().parse().unwrap());
        KubeCluster::new(Client::try_from(config).unwrap())
    }

    fn resource_list(group_version: &str, kind: &str, plural: &str, namespaced: bool) -> serde_json::Value {
        json!({
            "kind": "APIResourceList",
            "apiVersion": "v1",
            "groupVersion": group_version,
            "resources": [{
                "name": plural,
                "singularName": kind.to_lowercase(),
                "namespaced": namespaced,
                "kind": kind,
                "verbs": ["get", "list"]
            }]
        })
    }

    fn status(code: u16, reason: &str) -> ResponseTemplate {
        ResponseTemplate::new(code).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": format!("{} from test server", reason),
            "reason": reason,
            "code": code
        }))
    }

    fn object_meta(name: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "meta.k8s.io/v1",
            "kind": "PartialObjectMetadata",
            "metadata": { "name": name }
        }))
    }

    async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn requests_to(server: &MockServer, route: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }

    async fn serve_widgets(server: &MockServer) {
        mount(
            server,
            "/apis/example.com/v1",
            ResponseTemplate::new(200).set_body_json(resource_list("example.com/v1", "Widget", "widgets", true)),
        )
        .await;
    }

    #[tokio::test]
    async fn test_discovered_scope() {
        let server = MockServer::start().await;
        serve_widgets(&server).await;
        mount(
            &server,
            "/apis/example.com/v1/namespaces/prod/widgets/w",
            object_meta("w"),
        )
        .await;
        let cluster = cluster_for(&server);
        let widget = GroupVersionKind::gvk("example.com", "v1", "Widget");

        assert_eq!(
            cluster.resource_scope(&widget).await.unwrap(),
            Some(ResourceScope::Namespaced)
        );
        assert_eq!(
            cluster.get_resource(&widget, Some("prod"), "w").await,
            Lookup::Found
        );
    }

    #[tokio::test]
    async fn test_discovery_cached_per_kind() {
        let server = MockServer::start().await;
        serve_widgets(&server).await;
        mount(
            &server,
            "/apis/example.com/v1/namespaces/prod/widgets/a",
            object_meta("a"),
        )
        .await;
        let cluster = cluster_for(&server);
        let widget = GroupVersionKind::gvk("example.com", "v1", "Widget");

        cluster.resource_scope(&widget).await.unwrap();
        cluster.resource_scope(&widget).await.unwrap();
        assert_eq!(cluster.get_resource(&widget, Some("prod"), "a").await, Lookup::Found);
        assert_eq!(
            cluster.get_resource(&widget, Some("prod"), "b").await,
            Lookup::NotFound
        );

        assert_eq!(requests_to(&server, "/apis/example.com/v1").await, 1);
    }

    #[tokio::test]
    async fn test_builtin_scope_when_discovery_fails() {
        let server = MockServer::start().await;
        mount(&server, "/apis/apps/v1", status(404, "NotFound")).await;
        mount(
            &server,
            "/apis/apps/v1/namespaces/prod/deployments/web",
            object_meta("web"),
        )
        .await;
        mount(
            &server,
            "/apis/rbac.authorization.k8s.io/v1",
            status(404, "NotFound"),
        )
        .await;
        mount(
            &server,
            "/apis/rbac.authorization.k8s.io/v1/clusterroles/reader",
            object_meta("reader"),
        )
        .await;
        let cluster = cluster_for(&server);

        let deployment = GroupVersionKind::gvk("apps", "v1", "Deployment");
        assert_eq!(
            cluster.resource_scope(&deployment).await.unwrap(),
            Some(ResourceScope::Namespaced)
        );
        assert_eq!(
            cluster.get_resource(&deployment, Some("prod"), "web").await,
            Lookup::Found
        );

        let role = GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRole");
        assert_eq!(
            cluster.resource_scope(&role).await.unwrap(),
            Some(ResourceScope::Cluster)
        );
        assert_eq!(cluster.get_resource(&role, None, "reader").await, Lookup::Found);
    }

    #[tokio::test]
    async fn test_unserved_kind_has_no_scope() {
        let server = MockServer::start().await;
        mount(&server, "/apis/example.com/v1", status(404, "NotFound")).await;
        let cluster = cluster_for(&server);
        let widget = GroupVersionKind::gvk("example.com", "v1", "Widget");

        assert_eq!(cluster.resource_scope(&widget).await.unwrap(), None);
        assert_eq!(cluster.resource_scope(&widget).await.unwrap(), None);
        assert_eq!(requests_to(&server, "/apis/example.com/v1").await, 1);
    }

    #[tokio::test]
    async fn test_transient_discovery_failure_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/example.com/v1"))
            .respond_with(status(503, "ServiceUnavailable"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        serve_widgets(&server).await;
        let cluster = cluster_for(&server);
        let widget = GroupVersionKind::gvk("example.com", "v1", "Widget");

        assert!(cluster.resource_scope(&widget).await.is_err());
        assert_eq!(
            cluster.resource_scope(&widget).await.unwrap(),
            Some(ResourceScope::Namespaced)
        );
        assert_eq!(requests_to(&server, "/apis/example.com/v1").await, 2);
    }

    #[tokio::test]
    async fn test_get_status_mapping() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/api/v1",
            ResponseTemplate::new(200).set_body_json(resource_list("v1", "ConfigMap", "configmaps", true)),
        )
        .await;
        mount(
            &server,
            "/api/v1/namespaces/prod/configmaps/gone",
            status(404, "NotFound"),
        )
        .await;
        mount(
            &server,
            "/api/v1/namespaces/prod/configmaps/locked",
            status(403, "Forbidden"),
        )
        .await;
        mount(
            &server,
            "/api/v1/namespaces/prod/configmaps/busy",
            status(503, "ServiceUnavailable"),
        )
        .await;
        let cluster = cluster_for(&server);
        let config_map = GroupVersionKind::gvk("", "v1", "ConfigMap");

        assert_eq!(
            cluster.get_resource(&config_map, Some("prod"), "gone").await,
            Lookup::NotFound
        );
        assert_eq!(
            cluster.get_resource(&config_map, Some("prod"), "locked").await,
            Lookup::Forbidden
        );
        match cluster.get_resource(&config_map, Some("prod"), "busy").await {
            Lookup::Transport { transient, .. } => assert!(transient),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_discovery_does_not_block_other_kinds() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/apis/example.com/v1",
            ResponseTemplate::new(200)
                .set_body_json(resource_list("example.com/v1", "Widget", "widgets", true))
                .set_delay(Duration::from_secs(3)),
        )
        .await;
        mount(
            &server,
            "/api/v1",
            ResponseTemplate::new(200).set_body_json(resource_list("v1", "ConfigMap", "configmaps", true)),
        )
        .await;
        mount(
            &server,
            "/api/v1/namespaces/prod/configmaps/cfg",
            object_meta("cfg"),
        )
        .await;

        let config = ResolverConfig {
            deadline: Duration::from_secs(1),
            ..Default::default()
        };
        let resolver = ExistenceResolver::new(Arc::new(cluster_for(&server)), config).unwrap();
        let resources = vec![
            ResourceRef::new("example.com/v1", "Widget", None, "w").unwrap(),
            ResourceRef::new("v1", "ConfigMap", None, "cfg").unwrap(),
        ];
        let outcome = resolver.resolve_all(&resources, "prod", pending()).await;

        assert!(outcome.timed_out);
        assert_eq!(
            outcome.results[0].status,
            ExistenceStatus::CheckError(CheckFailure::Timeout)
        );
        assert_eq!(outcome.results[1].status, ExistenceStatus::Exists);
    }
}
