//! RainbondCluster Custom Resource Definition
//!
//! The RainbondCluster CRD describes the environment every component of one
//! Rainbond installation runs in: which nodes host which component classes,
//! where images are pushed, how etcd and the region database are reached.

use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Database, EtcdConfig, ImageHub, K8sNode};

/// Specification for a RainbondCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "rainbond.io",
    version = "v1alpha1",
    kind = "RainbondCluster",
    plural = "rainbondclusters",
    shortname = "rbdcluster",
    status = "RainbondClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RainbondClusterSpec {
    /// Nodes that run the builder (rbd-chaos), one instance per node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes_for_chaos: Vec<K8sNode>,

    /// Nodes that run the gateway
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes_for_gateway: Vec<K8sNode>,

    /// Addresses the gateway is reachable on from inside the cluster
    #[serde(
        default,
        rename = "gatewayIngressIPs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub gateway_ingress_ips: Vec<String>,

    /// External image registry; absent means the built-in registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hub: Option<ImageHub>,

    /// External etcd; absent means the bundled rbd-etcd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd_config: Option<EtcdConfig>,

    /// External region database; absent means the bundled rbd-db
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_database: Option<Database>,
}

impl RainbondClusterSpec {
    /// Names of the nodes designated for the builder
    pub fn chaos_node_names(&self) -> Vec<String> {
        self.nodes_for_chaos.iter().map(|n| n.name.clone()).collect()
    }

    /// Address the gateway answers on, if one is known
    ///
    /// Declared ingress IPs take precedence over gateway node addresses.
    pub fn gateway_ingress_ip(&self) -> Option<&str> {
        self.gateway_ingress_ips
            .iter()
            .map(String::as_str)
            .chain(self.nodes_for_gateway.iter().map(|n| n.internal_ip.as_str()))
            .find(|ip| !ip.is_empty())
    }
}

/// Status for a RainbondCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RainbondClusterStatus {
    /// Pull secret the operator created for the cluster registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<LocalObjectReference>,
}

impl RainbondCluster {
    /// Name of the cluster-wide image pull secret, empty when none exists
    pub fn image_pull_secret_name(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.image_pull_secret.as_ref())
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }
}
