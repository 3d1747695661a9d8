//! Built-in kind-to-scope table
//!
//! Used when API discovery is unavailable and by the in-memory test cluster.
//! Keys are `Kind.group` (bare `Kind` for the core group), the same form
//! `kubectl` uses for qualified resource names.

use phf::phf_map;

use crate::resource::ResourceScope;

use ResourceScope::{Cluster, Namespaced};

static BUILTIN_SCOPES: phf::Map<&'static str, ResourceScope> = phf_map! {
    // core
    "Binding" => Namespaced,
    "ComponentStatus" => Cluster,
    "ConfigMap" => Namespaced,
    "Endpoints" => Namespaced,
    "Event" => Namespaced,
    "LimitRange" => Namespaced,
    "Namespace" => Cluster,
    "Node" => Cluster,
    "PersistentVolume" => Cluster,
    "PersistentVolumeClaim" => Namespaced,
    "Pod" => Namespaced,
    "PodTemplate" => Namespaced,
    "ReplicationController" => Namespaced,
    "ResourceQuota" => Namespaced,
    "Secret" => Namespaced,
    "Service" => Namespaced,
    "ServiceAccount" => Namespaced,

    // workloads
    "ControllerRevision.apps" => Namespaced,
    "DaemonSet.apps" => Namespaced,
    "Deployment.apps" => Namespaced,
    "ReplicaSet.apps" => Namespaced,
    "StatefulSet.apps" => Namespaced,
    "CronJob.batch" => Namespaced,
    "Job.batch" => Namespaced,
    "HorizontalPodAutoscaler.autoscaling" => Namespaced,
    "PodDisruptionBudget.policy" => Namespaced,
    "PodSecurityPolicy.policy" => Cluster,

    // networking
    "Ingress.networking.k8s.io" => Namespaced,
    "IngressClass.networking.k8s.io" => Cluster,
    "NetworkPolicy.networking.k8s.io" => Namespaced,
    "EndpointSlice.discovery.k8s.io" => Namespaced,

    // rbac
    "ClusterRole.rbac.authorization.k8s.io" => Cluster,
    "ClusterRoleBinding.rbac.authorization.k8s.io" => Cluster,
    "Role.rbac.authorization.k8s.io" => Namespaced,
    "RoleBinding.rbac.authorization.k8s.io" => Namespaced,

    // storage
    "CSIDriver.storage.k8s.io" => Cluster,
    "CSINode.storage.k8s.io" => Cluster,
    "CSIStorageCapacity.storage.k8s.io" => Namespaced,
    "StorageClass.storage.k8s.io" => Cluster,
    "VolumeAttachment.storage.k8s.io" => Cluster,

    // cluster extension points
    "CustomResourceDefinition.apiextensions.k8s.io" => Cluster,
    "APIService.apiregistration.k8s.io" => Cluster,
    "MutatingWebhookConfiguration.admissionregistration.k8s.io" => Cluster,
    "ValidatingWebhookConfiguration.admissionregistration.k8s.io" => Cluster,
    "ValidatingAdmissionPolicy.admissionregistration.k8s.io" => Cluster,
    "ValidatingAdmissionPolicyBinding.admissionregistration.k8s.io" => Cluster,

    // scheduling and node
    "PriorityClass.scheduling.k8s.io" => Cluster,
    "RuntimeClass.node.k8s.io" => Cluster,
    "Lease.coordination.k8s.io" => Namespaced,
    "Event.events.k8s.io" => Namespaced,
    "CertificateSigningRequest.certificates.k8s.io" => Cluster,
    "FlowSchema.flowcontrol.apiserver.k8s.io" => Cluster,
    "PriorityLevelConfiguration.flowcontrol.apiserver.k8s.io" => Cluster,
};

/// Scope of a built-in Kubernetes kind, `None` for anything else (CRDs)
pub fn builtin_scope(group: &str, kind: &str) -> Option<ResourceScope> {
    if group.is_empty() {
        BUILTIN_SCOPES.get(kind).copied()
    } else {
        BUILTIN_SCOPES.get(format!("{}.{}", kind, group).as_str()).copied()
    }
}
