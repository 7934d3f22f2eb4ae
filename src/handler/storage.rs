//! Storage claim parameters and builders

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::Resource;
use crate::{Error, Result};

/// Access mode shared claims are mounted with
pub const READ_WRITE_MANY: &str = "ReadWriteMany";

/// Where and how a handler's claims are provisioned
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PvcParameters {
    /// Storage class name
    pub storage_class_name: String,
    /// Requested size in GiB, overriding the handler's default when set
    pub storage_request: Option<i64>,
}

impl PvcParameters {
    /// Parameters for claims provisioned from a storage class
    pub fn rwx(storage_class_name: impl Into<String>) -> Self {
        Self {
            storage_class_name: storage_class_name.into(),
            storage_request: None,
        }
    }

    /// Set the requested size in GiB
    pub fn with_storage_request(mut self, size_gi: Option<i64>) -> Self {
        self.storage_request = size_gi;
        self
    }
}

/// Build a read-write-many claim named `name`
///
/// Without parameters the claim carries an empty storage
/// class; the caller is expected to have resolved parameters first.
pub fn persistent_volume_claim(
    namespace: &str,
    name: &str,
    params: Option<&PvcParameters>,
    labels: &BTreeMap<String, String>,
    default_request_gi: i64,
) -> PersistentVolumeClaim {
    let storage_class = params
        .map(|p| p.storage_class_name.clone())
        .unwrap_or_default();
    let size = params
        .and_then(|p| p.storage_request)
        .filter(|size| *size > 0)
        .unwrap_or(default_request_gi);

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![READ_WRITE_MANY.to_string()]),
            storage_class_name: Some(storage_class),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(format!("{size}Gi")),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Reject claims that would be created without a storage class
pub fn validate_storage_claims(resources: &[Resource]) -> Result<()> {
    for resource in resources {
        let Resource::PersistentVolumeClaim(claim) = resource else {
            continue;
        };

        let class = claim
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.as_deref())
            .unwrap_or_default();
        if class.is_empty() {
            return Err(Error::validation(format!(
                "claim {}/{} has no storage class",
                resource.namespace().unwrap_or_default(),
                resource.name()
            )));
        }
    }
    Ok(())
}
