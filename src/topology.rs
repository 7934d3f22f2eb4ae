//! Placement and injection facts derived from cluster state
//!
//! Everything here is a pure function of an already-fetched cluster
//! declaration (or of a secret resolved before assembly). Optional facts are
//! decided once, here, and handed to assembly as `Option`s.

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, HostAlias, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, SecretVolumeSource, Volume, VolumeMount,
};

use crate::crd::{ImageHub, K8sNode, RainbondClusterSpec};
use crate::{DEFAULT_ETCD_ENDPOINT, DEFAULT_IMAGE_REPOSITORY};

/// Node label the required-node affinity matches on
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Directory etcd TLS material is mounted at
pub const ETCD_SSL_PATH: &str = "/run/ssl/etcd";

/// Name of the volume carrying etcd TLS material
pub const ETCD_SSL_VOLUME: &str = "etcdssl";

/// Registry repository path variable
pub const REGISTRY_DOMAIN_ENV: &str = "BUILD_IMAGE_REPOSTORY_DOMAIN";
/// Registry namespace variable
pub const REGISTRY_NAMESPACE_ENV: &str = "BUILD_IMAGE_REPOSTORY_NAMESPACE";
/// Registry user variable
pub const REGISTRY_USER_ENV: &str = "BUILD_IMAGE_REPOSTORY_USER";
/// Registry password variable
pub const REGISTRY_PASS_ENV: &str = "BUILD_IMAGE_REPOSTORY_PASS";

// =============================================================================
// Node placement
// =============================================================================

/// Required node affinity restricting scheduling to exactly `node_names`
///
/// Returns `None` for an empty list: the scheduler is left unconstrained.
pub fn affinity_for_required_nodes(node_names: &[String]) -> Option<Affinity> {
    if node_names.is_empty() {
        return None;
    }

    Some(Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: HOSTNAME_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(node_names.to_vec()),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Desired replica count: one instance per designated node
///
/// Zero designated nodes means the component is intentionally disabled.
pub fn replicas_for_nodes(nodes: &[K8sNode]) -> i32 {
    i32::try_from(nodes.len()).unwrap_or(i32::MAX)
}

// =============================================================================
// Registry
// =============================================================================

/// Registry the cluster's images are pushed to and pulled from
pub fn image_repository(cluster: &RainbondClusterSpec) -> String {
    cluster
        .image_hub
        .as_ref()
        .map(ImageHub::repository)
        .unwrap_or_else(|| DEFAULT_IMAGE_REPOSITORY.to_string())
}

/// Environment carrying external registry coordinates and credentials
///
/// Empty when the cluster has no image hub; no placeholders are emitted.
pub fn image_hub_env(image_hub: Option<&ImageHub>) -> Vec<EnvVar> {
    let Some(hub) = image_hub else {
        return Vec::new();
    };

    [
        (REGISTRY_DOMAIN_ENV, hub.repository()),
        (REGISTRY_NAMESPACE_ENV, hub.namespace.clone()),
        (REGISTRY_USER_ENV, hub.username.clone()),
        (REGISTRY_PASS_ENV, hub.password.clone()),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    })
    .collect()
}

/// Host aliases pods need to reach the built-in registry
///
/// The built-in registry domain is served by the gateway, so when the
/// cluster uses it the domain is pinned to the gateway address.
pub fn host_aliases(cluster: &RainbondClusterSpec) -> Vec<HostAlias> {
    if image_repository(cluster) != DEFAULT_IMAGE_REPOSITORY {
        return Vec::new();
    }

    cluster
        .gateway_ingress_ip()
        .map(|ip| HostAlias {
            ip: ip.to_string(),
            hostnames: Some(vec![DEFAULT_IMAGE_REPOSITORY.to_string()]),
        })
        .into_iter()
        .collect()
}

// =============================================================================
// Etcd
// =============================================================================

/// Etcd client endpoints for component daemons
pub fn etcd_endpoints(cluster: &RainbondClusterSpec) -> Vec<String> {
    match &cluster.etcd_config {
        Some(cfg) => cfg.endpoints.clone(),
        None => vec![DEFAULT_ETCD_ENDPOINT.to_string()],
    }
}

/// Mutual-TLS material for etcd, present only when a secret was resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EtcdTls {
    secret_name: String,
}

impl EtcdTls {
    /// TLS material carried by the named secret
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
        }
    }

    /// Volume projecting the secret
    pub fn volume(&self) -> Volume {
        Volume {
            name: ETCD_SSL_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(self.secret_name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Mount of the secret volume
    pub fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: ETCD_SSL_VOLUME.to_string(),
            mount_path: ETCD_SSL_PATH.to_string(),
            ..Default::default()
        }
    }

    /// Flags pointing the daemon at the mounted material
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--etcd-ca={ETCD_SSL_PATH}/ca-file"),
            format!("--etcd-cert={ETCD_SSL_PATH}/cert-file"),
            format!("--etcd-key={ETCD_SSL_PATH}/key-file"),
        ]
    }
}
