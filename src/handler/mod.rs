//! Component handler protocol
//!
//! A handler turns one component's declaration into the objects that should
//! exist for it. The control loop drives a handler through one pass:
//!
//! 1. [`ComponentHandler::before`] fetches the cluster facts the handler needs
//!    and returns them as the handler's `Resolved` context. This is the only
//!    step that performs I/O, and the only step that may fail.
//! 2. [`ComponentHandler::resources`] builds the steady-state object set from
//!    that context. Pure and infallible.
//! 3. Capabilities a handler may advertise:
//!    - [`StorageClassProvider`]: claims applied only when absent
//!    - [`ReplicaProvider`]: the desired instance count
//!    - [`ComponentHandler::list_pods`]: live pods, empty unless overridden
//! 4. [`ComponentHandler::after`] runs post-apply hooks.
//!
//! Handlers are built per pass and discarded afterwards; nothing is shared
//! between passes.

mod chaos;
mod storage;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{
    ConfigMap, HTTPGetAction, LocalObjectReference, PersistentVolumeClaim, Pod, Probe, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::Resource as K8sResource;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::crd::{RainbondCluster, RbdComponent};
use crate::facts::ClusterFacts;
use crate::{Error, Result};

pub use chaos::{
    ChaosContext, ChaosHandler, CACHE_PVC, CHAOS_API_PORT, CHAOS_HEALTH_PATH, CHAOS_NAME,
    MAVEN_SETTING_CONFIGMAP, MAVEN_SETTING_KEY,
};
pub use storage::{persistent_volume_claim, validate_storage_claims, PvcParameters, READ_WRITE_MANY};

// =============================================================================
// Resource set
// =============================================================================

/// One object a handler wants to exist
///
/// Serializes to the object's own manifest, so a resource set can be written
/// straight out as multi-document YAML.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    /// Workload controller
    DaemonSet(DaemonSet),
    /// Network endpoint
    Service(Service),
    /// Configuration artifact
    ConfigMap(ConfigMap),
    /// Storage claim
    PersistentVolumeClaim(PersistentVolumeClaim),
}

impl Resource {
    /// Kubernetes kind of the wrapped object
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::DaemonSet(_) => DaemonSet::KIND,
            Resource::Service(_) => Service::KIND,
            Resource::ConfigMap(_) => ConfigMap::KIND,
            Resource::PersistentVolumeClaim(_) => PersistentVolumeClaim::KIND,
        }
    }

    /// Metadata of the wrapped object
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::DaemonSet(o) => &o.metadata,
            Resource::Service(o) => &o.metadata,
            Resource::ConfigMap(o) => &o.metadata,
            Resource::PersistentVolumeClaim(o) => &o.metadata,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Render the object as a YAML manifest
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::serialization(format!("{} {}: {}", self.kind(), self.name(), e)))
    }
}

impl From<DaemonSet> for Resource {
    fn from(o: DaemonSet) -> Self {
        Resource::DaemonSet(o)
    }
}

impl From<Service> for Resource {
    fn from(o: Service) -> Self {
        Resource::Service(o)
    }
}

impl From<ConfigMap> for Resource {
    fn from(o: ConfigMap) -> Self {
        Resource::ConfigMap(o)
    }
}

impl From<PersistentVolumeClaim> for Resource {
    fn from(o: PersistentVolumeClaim) -> Self {
        Resource::PersistentVolumeClaim(o)
    }
}

// =============================================================================
// Protocol
// =============================================================================

/// The per-component protocol the control loop drives
#[async_trait]
pub trait ComponentHandler: Send + Sync {
    /// Facts resolved by [`before`](Self::before) and consumed by assembly
    type Resolved: Send + Sync + 'static;

    /// Component name, used for logging
    fn name(&self) -> &str;

    /// Namespace the component's objects live in
    fn namespace(&self) -> &str;

    /// Labels identifying the component's objects and pods
    fn labels(&self) -> &BTreeMap<String, String>;

    /// Fetch every cluster fact assembly needs
    ///
    /// A failure aborts the pass; no resources are produced.
    async fn before(&self) -> Result<Self::Resolved>;

    /// Steady-state object set, applied with create-or-update semantics
    fn resources(&self, resolved: &Self::Resolved) -> Vec<Resource>;

    /// Post-apply hook
    async fn after(&self, _resolved: &Self::Resolved) -> Result<()> {
        Ok(())
    }

    /// Live pods belonging to the component
    ///
    /// Handlers whose component runs no pods of its own keep the empty default.
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        Ok(Vec::new())
    }

    /// Storage-class capability, if the handler has claims
    fn as_storage_class_provider(&self) -> Option<&dyn StorageClassProvider<Self::Resolved>> {
        None
    }

    /// Replica capability, if the handler derives its own instance count
    fn as_replica_provider(&self) -> Option<&dyn ReplicaProvider> {
        None
    }
}

/// Handlers that own read-write-many storage claims
pub trait StorageClassProvider<R>: Send + Sync {
    /// Record the storage class claims are provisioned from
    fn set_storage_class_rwx(&self, resolved: &mut R, params: PvcParameters);

    /// Claims applied only when absent, never updated in place
    ///
    /// If no storage class was ever set the claims carry an empty class;
    /// see [`validate_storage_claims`].
    fn resources_create_if_not_exists(&self, resolved: &R) -> Vec<Resource>;
}

/// Handlers that declare their own desired instance count
pub trait ReplicaProvider: Send + Sync {
    /// Desired replicas, never negative
    fn replicas(&self) -> i32;
}

/// Feed the handler's storage capability from the cluster, if it has one
///
/// Absence of a storage class is not an error here: the claims will carry
/// an empty class and a warning is logged.
#[instrument(skip(handler, facts, resolved), fields(component = %handler.name()))]
pub async fn resolve_storage_class<H>(
    handler: &H,
    facts: &dyn ClusterFacts,
    namespace: &str,
    resolved: &mut H::Resolved,
) -> Result<()>
where
    H: ComponentHandler + ?Sized,
{
    let Some(provider) = handler.as_storage_class_provider() else {
        return Ok(());
    };

    match facts.rwx_storage_parameters(namespace).await? {
        Some(params) => {
            debug!(storage_class = %params.storage_class_name, "resolved rwx storage class");
            provider.set_storage_class_rwx(resolved, params);
        }
        None => warn!(
            namespace,
            "no rwx storage class available; claims will carry an empty storage class"
        ),
    }
    Ok(())
}

// =============================================================================
// Pass driver
// =============================================================================

/// Everything one pass produced for a component
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DesiredState {
    /// Objects to create or update
    pub resources: Vec<Resource>,
    /// Objects to create only when absent
    pub create_if_not_exists: Vec<Resource>,
    /// Desired replicas, when the handler declares them
    pub replicas: Option<i32>,
}

/// Run one full pass of a handler
///
/// Any failure in `before` aborts the pass with no partial output.
pub async fn desired_state<H>(handler: &H) -> Result<DesiredState>
where
    H: ComponentHandler + ?Sized,
{
    let resolved = handler.before().await?;

    let resources = handler.resources(&resolved);
    let create_if_not_exists = handler
        .as_storage_class_provider()
        .map(|p| p.resources_create_if_not_exists(&resolved))
        .unwrap_or_default();
    let replicas = handler.as_replica_provider().map(|p| p.replicas());

    handler.after(&resolved).await?;

    info!(
        component = %handler.name(),
        namespace = %handler.namespace(),
        resources = resources.len(),
        claims = create_if_not_exists.len(),
        ?replicas,
        "computed desired state"
    );

    Ok(DesiredState {
        resources,
        create_if_not_exists,
        replicas,
    })
}

// =============================================================================
// Shared builders
// =============================================================================

/// HTTP readiness probe against `path` on `port`
pub fn readiness_probe_http(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            host: None,
            http_headers: None,
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            scheme: None,
        }),
        initial_delay_seconds: Some(2),
        period_seconds: Some(3),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        success_threshold: Some(1),
        ..Default::default()
    }
}

/// Pull secrets for a component's pods
///
/// The component's own secrets win; otherwise the cluster's registry
/// secret is used when the operator has created one.
pub fn image_pull_secrets(
    component: &RbdComponent,
    cluster: &RainbondCluster,
) -> Option<Vec<LocalObjectReference>> {
    if !component.spec.image_pull_secrets.is_empty() {
        return Some(component.spec.image_pull_secrets.clone());
    }

    let name = cluster.image_pull_secret_name();
    (!name.is_empty()).then(|| {
        vec![LocalObjectReference {
            name: name.to_string(),
        }]
    })
}
