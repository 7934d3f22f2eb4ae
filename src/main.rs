//! rbd-operator - desired state for Rainbond cluster components

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, CustomResourceExt};
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rbd_operator::config::ChaosConfig;
use rbd_operator::crd::{RainbondCluster, RainbondVolume, RbdComponent};
use rbd_operator::facts::{ClusterFacts, KubeClusterFacts, StaticClusterFacts};
use rbd_operator::handler::{desired_state, validate_storage_claims, ChaosHandler, DesiredState, PvcParameters};

/// rbd-operator - desired-state handlers for Rainbond cluster components
#[derive(Parser, Debug)]
#[command(name = "rbd-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Output format for rendered objects
    #[arg(short, long, global = true, value_enum, default_value = "yaml")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Multi-document YAML, one document per object
    Yaml,
    /// A single v1 List object
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the builder's desired state from manifests on disk
    ///
    /// No API server is contacted: secrets and the storage class are taken
    /// from the command line.
    Render(RenderArgs),

    /// Compute the builder's desired state against the live cluster
    Plan(PlanArgs),
}

/// Offline render arguments
#[derive(Parser, Debug)]
struct RenderArgs {
    /// Path to the RbdComponent manifest
    #[arg(long)]
    component: PathBuf,

    /// Path to the RainbondCluster manifest
    #[arg(long)]
    cluster: PathBuf,

    /// Namespace for a component manifest that does not declare one
    #[arg(short, long)]
    namespace: Option<String>,

    /// Storage class read-write-many claims are provisioned from
    #[arg(long)]
    storage_class: Option<String>,

    /// Requested claim size in GiB, overriding the configured defaults
    #[arg(long, requires = "storage_class")]
    storage_request: Option<i64>,

    /// Secret manifests visible to the handler (repeatable)
    #[arg(long = "secret")]
    secrets: Vec<PathBuf>,
}

/// Live plan arguments
#[derive(Parser, Debug)]
struct PlanArgs {
    /// Namespace Rainbond is installed in
    #[arg(short, long, env = "RBD_NAMESPACE", default_value = "rbd-system")]
    namespace: String,

    /// Name of the RbdComponent
    #[arg(long, default_value = "rbd-chaos")]
    component: String,

    /// Name of the RainbondCluster
    #[arg(long, default_value = "rainbondcluster")]
    cluster: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        for crd in [RbdComponent::crd(), RainbondCluster::crd(), RainbondVolume::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    match cli.command {
        Some(Commands::Render(args)) => run_render(args, cli.output).await,
        Some(Commands::Plan(args)) => run_plan(args, cli.output).await,
        None => Err(anyhow::anyhow!("no command given; see --help")),
    }
}

/// Render from manifests with an in-memory view of the cluster
async fn run_render(args: RenderArgs, output: OutputFormat) -> anyhow::Result<()> {
    let mut component: RbdComponent = read_manifest(&args.component).await?;
    let cluster: RainbondCluster = read_manifest(&args.cluster).await?;
    let namespace = component.ensure_namespace(args.namespace.as_deref())?.to_string();

    let mut facts = StaticClusterFacts::new();
    for path in &args.secrets {
        let mut secret: Secret = read_manifest(path).await?;
        if secret.metadata.namespace.is_none() {
            secret.metadata.namespace = Some(namespace.clone());
        }
        facts = facts.with_secret(secret);
    }
    if let Some(class) = args.storage_class {
        facts = facts.with_rwx_storage(
            PvcParameters::rwx(class).with_storage_request(args.storage_request),
        );
    }

    let handler = ChaosHandler::new(Arc::new(facts), component, cluster, ChaosConfig::from_env());
    let state = desired_state(&handler).await?;
    print_state(&state, output)
}

/// Plan against the API server the current kubeconfig points at
async fn run_plan(args: PlanArgs, output: OutputFormat) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let components: Api<RbdComponent> = Api::namespaced(client.clone(), &args.namespace);
    let clusters: Api<RainbondCluster> = Api::namespaced(client.clone(), &args.namespace);
    let component = components.get(&args.component).await?;
    let cluster = clusters.get(&args.cluster).await?;

    let facts: Arc<dyn ClusterFacts> = Arc::new(KubeClusterFacts::new(client));
    let handler = ChaosHandler::new(facts, component, cluster, ChaosConfig::from_env());
    let state = desired_state(&handler).await?;
    print_state(&state, output)
}

async fn read_manifest<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", path, e))?;
    serde_yaml::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse {:?}: {}", path, e))
}

/// Print the desired state
///
/// Claims without a storage class are refused here rather than emitted.
fn print_state(state: &DesiredState, output: OutputFormat) -> anyhow::Result<()> {
    validate_storage_claims(&state.create_if_not_exists)?;

    let objects = state.resources.iter().chain(&state.create_if_not_exists);
    match output {
        OutputFormat::Yaml => {
            for resource in objects {
                println!("---\n{}", resource.to_yaml()?);
            }
        }
        OutputFormat::Json => {
            let list = serde_json::json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": objects.collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }

    if let Some(replicas) = state.replicas {
        info!(replicas, "desired replicas");
    }
    Ok(())
}
