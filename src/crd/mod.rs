//! Custom Resource Definitions for the Rainbond operator
//!
//! This module contains the CRDs component handlers read from.

mod cluster;
mod component;
mod types;
mod volume;

pub use cluster::{RainbondCluster, RainbondClusterSpec, RainbondClusterStatus};
pub use component::{
    labels_for_component, labels_for_rainbond, RbdComponent, RbdComponentSpec,
    DEFAULT_IMAGE_PULL_POLICY,
};
pub use types::{Database, EtcdConfig, ImageHub, K8sNode};
pub use volume::{RainbondVolume, RainbondVolumeSpec, ACCESS_MODES_LABEL};
