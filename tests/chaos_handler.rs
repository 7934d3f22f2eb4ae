//! Integration tests for the builder handler
//!
//! These tests drive a full pass the way the control loop does: manifests are
//! parsed as they would arrive from the API server, the cluster is simulated
//! with in-memory facts, and assertions are made on the desired state.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Container, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use rbd_operator::config::ChaosConfig;
use rbd_operator::crd::{RainbondCluster, RbdComponent};
use rbd_operator::facts::StaticClusterFacts;
use rbd_operator::handler::{
    desired_state, validate_storage_claims, ChaosHandler, ComponentHandler, DesiredState,
    PvcParameters, Resource,
};
use rbd_operator::Error;

// =============================================================================
// Test Fixtures
// =============================================================================

const COMPONENT: &str = r#"
apiVersion: rainbond.io/v1alpha1
kind: RbdComponent
metadata:
  name: rbd-chaos
  namespace: rbd-system
spec:
  image: registry.cn-hangzhou.aliyuncs.com/goodrain/rbd-chaos:v6.0
"#;

const CLUSTER: &str = r#"
apiVersion: rainbond.io/v1alpha1
kind: RainbondCluster
metadata:
  name: rainbondcluster
  namespace: rbd-system
spec:
  gatewayIngressIPs:
    - 172.20.0.10
status:
  imagePullSecret:
    name: rbd-hub-credentials
"#;

fn component() -> RbdComponent {
    serde_yaml::from_str(COMPONENT).expect("component fixture should parse")
}

fn cluster() -> RainbondCluster {
    serde_yaml::from_str(CLUSTER).expect("cluster fixture should parse")
}

fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("rbd-system".to_string()),
            ..Default::default()
        },
        string_data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

/// A cluster with the bundled database and an NFS storage class
fn facts() -> StaticClusterFacts {
    StaticClusterFacts::new()
        .with_secret(secret(
            "rbd-db",
            &[("mysql-user", "root"), ("mysql-password", "s3cret")],
        ))
        .with_rwx_storage(PvcParameters::rwx("nfs-client"))
}

fn handler_with(
    facts: StaticClusterFacts,
    component: RbdComponent,
    cluster: RainbondCluster,
) -> ChaosHandler {
    ChaosHandler::new(Arc::new(facts), component, cluster, ChaosConfig::default())
}

async fn run(handler: &ChaosHandler) -> DesiredState {
    desired_state(handler).await.expect("pass should succeed")
}

fn daemon_set(state: &DesiredState) -> &DaemonSet {
    state
        .resources
        .iter()
        .find_map(|r| match r {
            Resource::DaemonSet(ds) => Some(ds),
            _ => None,
        })
        .expect("desired state should include a daemon set")
}

fn container(ds: &DaemonSet) -> &Container {
    &ds.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
}

fn env_names(c: &Container) -> Vec<&str> {
    c.env
        .as_ref()
        .unwrap()
        .iter()
        .map(|e| e.name.as_str())
        .collect()
}

// =============================================================================
// Story: A full pass over a freshly installed cluster
// =============================================================================

#[tokio::test]
async fn story_fresh_cluster_produces_complete_desired_state() {
    let handler = handler_with(facts(), component(), cluster());
    let state = run(&handler).await;

    let kinds: Vec<&str> = state.resources.iter().map(Resource::kind).collect();
    assert_eq!(kinds, vec!["DaemonSet", "Service", "ConfigMap"]);

    let claims: Vec<&str> = state.create_if_not_exists.iter().map(Resource::name).collect();
    assert_eq!(claims, vec!["rbd-cpt-grdata", "rbd-chaos-cache"]);
    assert!(validate_storage_claims(&state.create_if_not_exists).is_ok());

    // No builder nodes designated yet
    assert_eq!(state.replicas, Some(0));
    let pod = daemon_set(&state).spec.as_ref().unwrap().template.spec.clone().unwrap();
    assert!(pod.affinity.is_none());
}

#[tokio::test]
async fn story_designated_nodes_drive_replicas_and_affinity() {
    let mut cluster = cluster();
    cluster.spec.nodes_for_chaos = serde_yaml::from_str("[{name: n1}, {name: n2}]").unwrap();

    let state = run(&handler_with(facts(), component(), cluster)).await;

    assert_eq!(state.replicas, Some(2));
    let affinity = daemon_set(&state)
        .spec
        .as_ref()
        .unwrap()
        .template
        .spec
        .as_ref()
        .unwrap()
        .affinity
        .clone()
        .expect("affinity should be set");
    let terms = affinity
        .node_affinity
        .unwrap()
        .required_during_scheduling_ignored_during_execution
        .unwrap()
        .node_selector_terms;
    let values = terms[0].match_expressions.as_ref().unwrap()[0].values.clone();
    assert_eq!(values, Some(vec!["n1".to_string(), "n2".to_string()]));
}

// =============================================================================
// Story: Optional cluster facts
// =============================================================================

#[tokio::test]
async fn story_no_image_hub_means_no_registry_env() {
    let state = run(&handler_with(facts(), component(), cluster())).await;
    let names = env_names(container(daemon_set(&state)));

    assert!(names.iter().all(|n| !n.starts_with("BUILD_IMAGE_REPOSTORY_")));
    assert_eq!(names, vec!["POD_IP", "SOURCE_DIR", "CACHE_DIR", "IMAGE_PULL_SECRET"]);
}

#[tokio::test]
async fn story_etcd_secret_presence_toggles_tls() {
    let mut tls_cluster = cluster();
    tls_cluster.spec.etcd_config = serde_yaml::from_str(
        "{endpoints: ['https://etcd-0:2379'], secretName: rbd-etcd-secret}",
    )
    .unwrap();

    let tls_facts = facts().with_secret(secret("rbd-etcd-secret", &[("ca-file", "ca")]));
    let state = run(&handler_with(tls_facts, component(), tls_cluster)).await;
    let c = container(daemon_set(&state));

    let tls_mounts: Vec<_> = c
        .volume_mounts
        .as_ref()
        .unwrap()
        .iter()
        .filter(|m| m.name == "etcdssl")
        .collect();
    assert_eq!(tls_mounts.len(), 1);

    let tls_flags = c
        .args
        .as_ref()
        .unwrap()
        .iter()
        .filter(|a| a.starts_with("--etcd-ca=") || a.starts_with("--etcd-cert=") || a.starts_with("--etcd-key="))
        .count();
    assert_eq!(tls_flags, 3);

    // Without a secret configured there is nothing to mount
    let state = run(&handler_with(facts(), component(), cluster())).await;
    let c = container(daemon_set(&state));
    assert!(c.volume_mounts.as_ref().unwrap().iter().all(|m| m.name != "etcdssl"));
    assert!(c.args.as_ref().unwrap().iter().all(|a| !a.starts_with("--etcd-ca=")));
}

#[tokio::test]
async fn story_configured_etcd_secret_missing_aborts_pass() {
    let mut cluster = cluster();
    cluster.spec.etcd_config =
        serde_yaml::from_str("{endpoints: [], secretName: rbd-etcd-secret}").unwrap();

    let err = desired_state(&handler_with(facts(), component(), cluster))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConfigResolution { .. }));
    assert!(err.to_string().contains("etcd secret"));
}

// =============================================================================
// Story: User overrides
// =============================================================================

#[tokio::test]
async fn story_override_env_wins_over_builtin() {
    let mut component = component();
    component.spec.env = serde_yaml::from_str(
        "[{name: SOURCE_DIR, value: /data/source}, {name: BUILD_DEBUG, value: 'true'}]",
    )
    .unwrap();

    let state = run(&handler_with(facts(), component, cluster())).await;
    let c = container(daemon_set(&state));

    let env: BTreeMap<&str, Option<&str>> = c
        .env
        .as_ref()
        .unwrap()
        .iter()
        .map(|e| (e.name.as_str(), e.value.as_deref()))
        .collect();
    assert_eq!(env["SOURCE_DIR"], Some("/data/source"));
    assert_eq!(
        env_names(c),
        vec!["POD_IP", "SOURCE_DIR", "CACHE_DIR", "IMAGE_PULL_SECRET", "BUILD_DEBUG"]
    );
}

// =============================================================================
// Story: Passes are repeatable
// =============================================================================

#[tokio::test]
async fn story_repeated_passes_are_identical() {
    let mut cluster = cluster();
    cluster.spec.image_hub = serde_yaml::from_str(
        "{domain: hub.example.com, namespace: rainbond, username: admin, password: pass}",
    )
    .unwrap();
    let handler = handler_with(facts(), component(), cluster);

    let first = run(&handler).await;
    let second = run(&handler).await;
    assert_eq!(first, second);

    let ctx = handler.before().await.unwrap();
    assert_eq!(handler.resources(&ctx), handler.resources(&ctx));
}

// =============================================================================
// Story: Database resolution
// =============================================================================

#[tokio::test]
async fn story_declared_database_without_name_uses_region() {
    let mut cluster = cluster();
    cluster.spec.region_database =
        serde_yaml::from_str("{host: mysql.example.com, username: rbd, password: pw}").unwrap();

    // No rbd-db secret: the declared database must not need one
    let facts = StaticClusterFacts::new().with_rwx_storage(PvcParameters::rwx("nfs-client"));
    let state = run(&handler_with(facts, component(), cluster)).await;

    let args = container(daemon_set(&state)).args.clone().unwrap();
    assert!(args.contains(&"--mysql=rbd:pw@tcp(mysql.example.com:3306)/region".to_string()));
}

#[tokio::test]
async fn story_missing_db_secret_produces_nothing() {
    let facts = StaticClusterFacts::new().with_rwx_storage(PvcParameters::rwx("nfs-client"));

    let err = desired_state(&handler_with(facts, component(), cluster()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("region database"));
    assert!(err.is_retryable());
}

// =============================================================================
// Story: Storage class availability
// =============================================================================

#[tokio::test]
async fn story_no_storage_class_yields_unvalidated_claims() {
    let facts = StaticClusterFacts::new().with_secret(secret(
        "rbd-db",
        &[("mysql-user", "root"), ("mysql-password", "s3cret")],
    ));
    let state = run(&handler_with(facts, component(), cluster())).await;

    assert_eq!(state.create_if_not_exists.len(), 2);
    let err = validate_storage_claims(&state.create_if_not_exists).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn story_rendered_yaml_is_apply_ready() {
    let state = run(&handler_with(facts(), component(), cluster())).await;

    for resource in state.resources.iter().chain(&state.create_if_not_exists) {
        let yaml = resource.to_yaml().unwrap();
        assert!(yaml.contains(&format!("kind: {}", resource.kind())));
        assert!(yaml.contains("namespace: rbd-system"));
    }
}
