//! Cluster facts handlers read before assembly
//!
//! Handlers never talk to the API server directly: everything they need is
//! fetched through [`ClusterFacts`], which keeps `before` testable with a
//! mock and lets the CLI render from static manifests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crate::crd::{Database, RainbondClusterSpec, RainbondVolume, ACCESS_MODES_LABEL};
use crate::handler::PvcParameters;
use crate::topology::EtcdTls;
use crate::{Error, Result, DB_SECRET_NAME, DEFAULT_DB_PORT};

/// Secret key holding the bundled database user
pub const MYSQL_USER_KEY: &str = "mysql-user";

/// Secret key holding the bundled database password
pub const MYSQL_PASSWORD_KEY: &str = "mysql-password";

/// Read access to the cluster state handlers depend on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterFacts: Send + Sync {
    /// Fetch a secret, `None` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Storage parameters for read-write-many claims, `None` when no
    /// storage class is registered for that access mode
    async fn rwx_storage_parameters(&self, namespace: &str) -> Result<Option<PvcParameters>>;

    /// Pods in `namespace` carrying every label in `labels`
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;
}

/// Label selector string matching every label in `labels`
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// API server implementation
// =============================================================================

/// [`ClusterFacts`] backed by the Kubernetes API
pub struct KubeClusterFacts {
    client: Client,
}

impl KubeClusterFacts {
    /// Create a new KubeClusterFacts wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterFacts for KubeClusterFacts {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn rwx_storage_parameters(&self, namespace: &str) -> Result<Option<PvcParameters>> {
        let api: Api<RainbondVolume> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&format!("{ACCESS_MODES_LABEL}=rwx"));
        let volumes = api.list(&lp).await?;

        Ok(volumes.items.iter().find_map(|volume| {
            volume.spec.storage_class().map(|class| {
                PvcParameters::rwx(class).with_storage_request(volume.spec.storage_request)
            })
        }))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&lp).await?.items)
    }
}

// =============================================================================
// Static implementation
// =============================================================================

/// [`ClusterFacts`] answered from objects held in memory
///
/// Used for offline rendering, where the cluster state is supplied as
/// manifests instead of being read from an API server.
#[derive(Clone, Debug, Default)]
pub struct StaticClusterFacts {
    secrets: BTreeMap<(String, String), Secret>,
    rwx: Option<PvcParameters>,
    pods: Vec<Pod>,
}

impl StaticClusterFacts {
    /// Empty cluster: no secrets, no storage classes, no pods
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret, keyed by its own namespace and name
    pub fn with_secret(mut self, secret: Secret) -> Self {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.insert(key, secret);
        self
    }

    /// Register the read-write-many storage parameters
    pub fn with_rwx_storage(mut self, params: PvcParameters) -> Self {
        self.rwx = Some(params);
        self
    }

    /// Add a running pod
    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }
}

#[async_trait]
impl ClusterFacts for StaticClusterFacts {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn rwx_storage_parameters(&self, _namespace: &str) -> Result<Option<PvcParameters>> {
        Ok(self.rwx.clone())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        Ok(self
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| {
                let pod_labels = pod.metadata.labels.as_ref();
                labels
                    .iter()
                    .all(|(k, v)| pod_labels.and_then(|l| l.get(k)) == Some(v))
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Value of `key` in a secret, from `data` or else `stringData`
fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .cloned()
        })
}

/// Resolve the region database the component connects to
///
/// A database declared on the cluster is used as-is. Otherwise the bundled
/// database is assumed and its credentials are read from the `rbd-db`
/// secret. Either way an empty database name becomes the region default.
#[instrument(skip(facts, declared))]
pub async fn resolve_database(
    facts: &dyn ClusterFacts,
    declared: Option<&Database>,
    namespace: &str,
) -> Result<Database> {
    if let Some(db) = declared {
        debug!(host = %db.host, "using declared region database");
        return Ok(db.clone().with_default_name());
    }

    let secret = facts
        .get_secret(namespace, DB_SECRET_NAME)
        .await?
        .ok_or_else(|| Error::not_found("Secret", namespace, DB_SECRET_NAME))?;

    let field = |key: &str| {
        secret_value(&secret, key).ok_or_else(|| Error::MissingSecretKey {
            namespace: namespace.to_string(),
            name: DB_SECRET_NAME.to_string(),
            key: key.to_string(),
        })
    };

    let database = Database {
        host: DB_SECRET_NAME.to_string(),
        port: DEFAULT_DB_PORT,
        username: field(MYSQL_USER_KEY)?,
        password: field(MYSQL_PASSWORD_KEY)?,
        name: String::new(),
    };
    debug!(host = %database.host, "using bundled region database");
    Ok(database.with_default_name())
}

/// Resolve etcd TLS material for the cluster
///
/// `None` when the cluster configures no etcd secret. A configured secret
/// that does not exist is an error: the daemon would otherwise start
/// without the certificates it was told to use.
#[instrument(skip(facts, cluster))]
pub async fn resolve_etcd_tls(
    facts: &dyn ClusterFacts,
    cluster: &RainbondClusterSpec,
    namespace: &str,
) -> Result<Option<EtcdTls>> {
    let Some(secret_name) = cluster
        .etcd_config
        .as_ref()
        .and_then(|cfg| cfg.secret_name.as_deref())
        .filter(|name| !name.is_empty())
    else {
        return Ok(None);
    };

    match facts.get_secret(namespace, secret_name).await? {
        Some(secret) => {
            let name = secret
                .metadata
                .name
                .unwrap_or_else(|| secret_name.to_string());
            debug!(secret = %name, "etcd TLS enabled");
            Ok(Some(EtcdTls::new(name)))
        }
        None => Err(Error::not_found("Secret", namespace, secret_name)),
    }
}
