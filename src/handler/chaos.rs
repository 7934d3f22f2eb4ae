//! Builder (rbd-chaos) handler
//!
//! The builder runs on every node designated for builds. It needs the region
//! database, etcd, the shared grdata claim, its own cache claim and the host
//! container runtime socket.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodTemplateSpec, Service, ServicePort,
    ServiceSpec, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::{debug, instrument};

use super::{
    image_pull_secrets, persistent_volume_claim, readiness_probe_http, resolve_storage_class,
    ComponentHandler, PvcParameters, ReplicaProvider, Resource, StorageClassProvider,
};
use crate::config::ChaosConfig;
use crate::crd::{labels_for_component, labels_for_rainbond, Database, RainbondCluster, RbdComponent};
use crate::facts::{resolve_database, resolve_etcd_tls, ClusterFacts};
use crate::merge::{merge_args, merge_envs, merge_volume_mounts, merge_volumes};
use crate::topology::{
    affinity_for_required_nodes, etcd_endpoints, host_aliases, image_hub_env, replicas_for_nodes,
    EtcdTls,
};
use crate::{Error, Result, GRDATA_PVC, RESOURCE_PROXY_NAME};

/// Name of the builder's workload and service
pub const CHAOS_NAME: &str = "rbd-chaos";

/// Builder cache claim
pub const CACHE_PVC: &str = "rbd-chaos-cache";

/// Port the builder API listens on
pub const CHAOS_API_PORT: i32 = 3228;

/// Builder health endpoint
pub const CHAOS_HEALTH_PATH: &str = "/v2/builder/health";

/// ConfigMap carrying the default maven settings for Java builds
pub const MAVEN_SETTING_CONFIGMAP: &str = "java-maven-aliyun";

/// Data key of the maven settings document
pub const MAVEN_SETTING_KEY: &str = "mavensetting";

const DEFAULT_MAVEN_SETTING: &str = include_str!("maven-settings.xml");

/// Facts the builder needs resolved before assembly
#[derive(Clone, Debug, PartialEq)]
pub struct ChaosContext {
    /// Region database connection
    pub database: Database,
    /// Etcd TLS material, when the cluster configures a secret
    pub etcd_tls: Option<EtcdTls>,
    /// Where the shared claims are provisioned
    pub pvc_rwx: Option<PvcParameters>,
}

/// Handler for the rbd-chaos builder component
pub struct ChaosHandler {
    facts: Arc<dyn ClusterFacts>,
    component: RbdComponent,
    cluster: RainbondCluster,
    labels: BTreeMap<String, String>,
    namespace: String,
    config: ChaosConfig,
}

impl ChaosHandler {
    /// Create a handler for one pass over `component`
    pub fn new(
        facts: Arc<dyn ClusterFacts>,
        component: RbdComponent,
        cluster: RainbondCluster,
        config: ChaosConfig,
    ) -> Self {
        let labels = labels_for_component(&component);
        let namespace = component.namespace_or_default();
        Self {
            facts,
            component,
            cluster,
            labels,
            namespace,
            config,
        }
    }

    /// Namespace the cluster declaration (and its secrets) live in
    fn cluster_namespace(&self) -> String {
        self.cluster
            .namespace()
            .unwrap_or_else(|| self.namespace.clone())
    }

    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels.clone()),
            ..Default::default()
        }
    }

    fn base_env(&self) -> Vec<EnvVar> {
        let value = |name: &str, value: &str| EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        };

        vec![
            EnvVar {
                name: "POD_IP".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "status.podIP".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            value("SOURCE_DIR", "/cache/source"),
            value("CACHE_DIR", "/cache"),
            value("IMAGE_PULL_SECRET", self.cluster.image_pull_secret_name()),
        ]
    }

    fn base_volume_mounts() -> Vec<VolumeMount> {
        let mount = |name: &str, path: &str, sub_path: Option<&str>| VolumeMount {
            name: name.to_string(),
            mount_path: path.to_string(),
            sub_path: sub_path.map(str::to_string),
            ..Default::default()
        };

        vec![
            mount("grdata", "/grdata", None),
            mount("dockersock", "/var/run/docker.sock", None),
            mount("cache", "/cache", None),
            mount("grdata", "/root/.ssh", Some("services/ssh")),
        ]
    }

    fn base_volumes() -> Vec<Volume> {
        let claim = |name: &str, claim_name: &str| Volume {
            name: name.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.to_string(),
                read_only: None,
            }),
            ..Default::default()
        };

        vec![
            claim("grdata", GRDATA_PVC),
            Volume {
                name: "dockersock".to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: "/var/run/docker.sock".to_string(),
                    type_: Some("Socket".to_string()),
                }),
                ..Default::default()
            },
            claim("cache", CACHE_PVC),
        ]
    }

    fn base_args(&self, ctx: &ChaosContext) -> Vec<String> {
        vec![
            "--hostIP=$(POD_IP)".to_string(),
            ctx.database.region_data_source(),
            format!(
                "--etcd-endpoints={}",
                etcd_endpoints(&self.cluster.spec).join(",")
            ),
            format!("--pvc-grdata-name={GRDATA_PVC}"),
            format!("--pvc-cache-name={CACHE_PVC}"),
            format!("--rbd-namespace={}", self.namespace),
            format!("--rbd-repo={RESOURCE_PROXY_NAME}"),
        ]
    }

    /// The builder daemon set
    pub fn daemon_set(&self, ctx: &ChaosContext) -> DaemonSet {
        let mut volume_mounts = Self::base_volume_mounts();
        let mut volumes = Self::base_volumes();
        let mut args = self.base_args(ctx);

        if let Some(tls) = &ctx.etcd_tls {
            volumes.push(tls.volume());
            volume_mounts.push(tls.volume_mount());
            args.extend(tls.args());
        }

        let mut env = self.base_env();
        env.extend(image_hub_env(self.cluster.spec.image_hub.as_ref()));

        let spec = &self.component.spec;
        let env = merge_envs(env, &spec.env);
        let volume_mounts = merge_volume_mounts(volume_mounts, &spec.volume_mounts);
        let volumes = merge_volumes(volumes, &spec.volumes);
        let args = merge_args(args, &spec.args);

        let aliases = host_aliases(&self.cluster.spec);

        DaemonSet {
            metadata: self.metadata(CHAOS_NAME),
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(self.labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        name: Some(CHAOS_NAME.to_string()),
                        labels: Some(self.labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        termination_grace_period_seconds: Some(0),
                        service_account_name: Some(self.config.service_account.clone()),
                        image_pull_secrets: image_pull_secrets(&self.component, &self.cluster),
                        // tolerate everything
                        tolerations: Some(vec![Toleration {
                            operator: Some("Exists".to_string()),
                            ..Default::default()
                        }]),
                        host_aliases: (!aliases.is_empty()).then_some(aliases),
                        affinity: affinity_for_required_nodes(&self.cluster.spec.chaos_node_names()),
                        containers: vec![Container {
                            name: CHAOS_NAME.to_string(),
                            image: Some(spec.image.clone()),
                            image_pull_policy: Some(self.component.image_pull_policy()),
                            env: Some(env),
                            args: Some(args),
                            volume_mounts: Some(volume_mounts),
                            readiness_probe: Some(readiness_probe_http(
                                CHAOS_HEALTH_PATH,
                                CHAOS_API_PORT,
                            )),
                            resources: spec.resources.clone(),
                            ..Default::default()
                        }],
                        volumes: Some(volumes),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Service exposing the builder API
    pub fn service(&self) -> Service {
        Service {
            metadata: self.metadata(CHAOS_NAME),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("api".to_string()),
                    port: CHAOS_API_PORT,
                    target_port: Some(IntOrString::Int(CHAOS_API_PORT)),
                    ..Default::default()
                }]),
                selector: Some(self.labels.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Default maven settings offered to Java builds
    pub fn default_maven_setting(&self) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(MAVEN_SETTING_CONFIGMAP.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels_for_rainbond([
                    ("configtype".to_string(), MAVEN_SETTING_KEY.to_string()),
                    ("default".to_string(), "true".to_string()),
                ])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                MAVEN_SETTING_KEY.to_string(),
                DEFAULT_MAVEN_SETTING.to_string(),
            )])),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ComponentHandler for ChaosHandler {
    type Resolved = ChaosContext;

    fn name(&self) -> &str {
        CHAOS_NAME
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    #[instrument(skip(self), fields(component = CHAOS_NAME, namespace = %self.namespace))]
    async fn before(&self) -> Result<ChaosContext> {
        if self.namespace.is_empty() {
            return Err(Error::validation(format!(
                "RbdComponent {} has no namespace",
                self.component.name_any()
            )));
        }

        let facts = self.facts.as_ref();
        let cluster_namespace = self.cluster_namespace();

        let database = resolve_database(
            facts,
            self.cluster.spec.region_database.as_ref(),
            &self.namespace,
        )
        .await
        .map_err(|e| Error::config_resolution("region database", e))?;

        let etcd_tls = resolve_etcd_tls(facts, &self.cluster.spec, &cluster_namespace)
            .await
            .map_err(|e| Error::config_resolution("etcd secret", e))?;

        let mut ctx = ChaosContext {
            database,
            etcd_tls,
            pvc_rwx: None,
        };
        resolve_storage_class(self, facts, &self.namespace, &mut ctx)
            .await
            .map_err(|e| Error::config_resolution("rwx storage class", e))?;

        debug!(
            etcd_tls = ctx.etcd_tls.is_some(),
            storage_class = ctx.pvc_rwx.as_ref().map(|p| p.storage_class_name.as_str()),
            "resolved builder context"
        );
        Ok(ctx)
    }

    fn resources(&self, ctx: &ChaosContext) -> Vec<Resource> {
        vec![
            self.daemon_set(ctx).into(),
            self.service().into(),
            self.default_maven_setting().into(),
        ]
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.facts.list_pods(&self.namespace, &self.labels).await
    }

    fn as_storage_class_provider(&self) -> Option<&dyn StorageClassProvider<ChaosContext>> {
        Some(self)
    }

    fn as_replica_provider(&self) -> Option<&dyn ReplicaProvider> {
        Some(self)
    }
}

impl StorageClassProvider<ChaosContext> for ChaosHandler {
    fn set_storage_class_rwx(&self, ctx: &mut ChaosContext, params: PvcParameters) {
        ctx.pvc_rwx = Some(params);
    }

    fn resources_create_if_not_exists(&self, ctx: &ChaosContext) -> Vec<Resource> {
        let params = ctx.pvc_rwx.as_ref();
        vec![
            persistent_volume_claim(
                &self.namespace,
                GRDATA_PVC,
                params,
                &self.labels,
                self.config.grdata_storage_request,
            )
            .into(),
            persistent_volume_claim(
                &self.namespace,
                CACHE_PVC,
                params,
                &self.labels,
                self.config.cache_storage_request,
            )
            .into(),
        ]
    }
}

impl ReplicaProvider for ChaosHandler {
    fn replicas(&self) -> i32 {
        replicas_for_nodes(&self.cluster.spec.nodes_for_chaos)
    }
}
