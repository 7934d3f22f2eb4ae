//! rbd-operator - desired-state handlers for Rainbond cluster components
//!
//! Each managed component (a builder daemon, a gateway, an API server, ...)
//! is described by an `RbdComponent` and lives inside a `RainbondCluster`.
//! A component handler turns those two declarations plus a handful of
//! cluster facts into the Kubernetes objects that should exist for it.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (RbdComponent, RainbondCluster, RainbondVolume)
//! - [`handler`] - The component handler protocol and its implementations
//! - [`merge`] - Override merging for env vars, mounts, volumes and args
//! - [`topology`] - Placement and injection facts derived from cluster state
//! - [`facts`] - Cluster-facts collaborator (secrets, storage classes, pods)
//! - [`config`] - Handler tunables read from the process environment
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod facts;
pub mod handler;
pub mod merge;
pub mod topology;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Service account every component pod runs as
pub const OPERATOR_SERVICE_ACCOUNT: &str = "rainbond-operator";

/// Secret holding the bundled region database credentials
pub const DB_SECRET_NAME: &str = "rbd-db";

/// Database name used when the cluster does not declare one
pub const REGION_DATABASE_NAME: &str = "region";

/// Port of the bundled MySQL service
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Registry domain used when the cluster has no external image hub
pub const DEFAULT_IMAGE_REPOSITORY: &str = "goodrain.me";

/// Etcd endpoint used when the cluster does not configure etcd
pub const DEFAULT_ETCD_ENDPOINT: &str = "http://rbd-etcd:2379";

/// Shared PVC holding Rainbond's grdata directory
pub const GRDATA_PVC: &str = "rbd-cpt-grdata";

/// Name of the resource proxy component builders pull artifacts through
pub const RESOURCE_PROXY_NAME: &str = "rbd-resource-proxy";
