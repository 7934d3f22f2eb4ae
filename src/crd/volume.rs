//! RainbondVolume Custom Resource Definition
//!
//! A RainbondVolume records which storage class backs a given access mode.
//! The operator looks up the one labelled `accessModes=rwx` to learn where
//! shared claims should be provisioned.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label key RainbondVolumes are selected by
pub const ACCESS_MODES_LABEL: &str = "accessModes";

/// Specification for a RainbondVolume
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "rainbond.io",
    version = "v1alpha1",
    kind = "RainbondVolume",
    plural = "rainbondvolumes",
    shortname = "rbdvol",
    namespaced,
    printcolumn = r#"{"name":"StorageClass","type":"string","jsonPath":".spec.storageClassName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RainbondVolumeSpec {
    /// Storage class claims of this access mode are provisioned from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Requested size in GiB; absent means each handler's own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_request: Option<i64>,
}

impl RainbondVolumeSpec {
    /// The storage class, if one is set and non-empty
    pub fn storage_class(&self) -> Option<&str> {
        self.storage_class_name.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_storage_class_is_absent() {
        let spec = RainbondVolumeSpec {
            storage_class_name: Some(String::new()),
            storage_request: None,
        };
        assert_eq!(spec.storage_class(), None);
    }

    #[test]
    fn test_storage_class_present() {
        let spec: RainbondVolumeSpec =
            serde_yaml::from_str("storageClassName: nfs\nstorageRequest: 20").unwrap();
        assert_eq!(spec.storage_class(), Some("nfs"));
        assert_eq!(spec.storage_request, Some(20));
    }
}
