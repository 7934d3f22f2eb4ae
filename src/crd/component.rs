//! RbdComponent Custom Resource Definition
//!
//! An RbdComponent declares one managed workload: which image to run and the
//! user's customizations on top of the operator's defaults.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EnvVar, LocalObjectReference, ResourceRequirements, Volume, VolumeMount,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pull policy used when the component does not declare one
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "Always";

/// Specification for an RbdComponent
///
/// The override lists (`env`, `volumeMounts`, `volumes`, `args`) are merged on
/// top of what the component handler computes; see [`crate::merge`].
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "rainbond.io",
    version = "v1alpha1",
    kind = "RbdComponent",
    plural = "rbdcomponents",
    shortname = "rbdc",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RbdComponentSpec {
    /// Container image
    pub image: String,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Pull secrets for the image; falls back to the cluster's pull secret
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Compute resource requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Environment variable overrides, keyed by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Volume mount overrides, keyed by mount path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,

    /// Volume overrides, keyed by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    /// Argument overrides, keyed by flag name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl RbdComponent {
    /// Effective image pull policy
    pub fn image_pull_policy(&self) -> String {
        self.spec
            .image_pull_policy
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.to_string())
    }

    /// Namespace the component's objects are created in
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// Make sure the component names a namespace, taking `fallback` if not
    ///
    /// Manifests read from disk often omit the namespace; objects rendered
    /// from such a component would otherwise land in `""`.
    pub fn ensure_namespace(&mut self, fallback: Option<&str>) -> crate::Result<&str> {
        let declared = self.metadata.namespace.as_deref().is_some_and(|ns| !ns.is_empty());
        if !declared {
            match fallback.filter(|ns| !ns.is_empty()) {
                Some(ns) => self.metadata.namespace = Some(ns.to_string()),
                None => {
                    return Err(crate::Error::validation(format!(
                        "RbdComponent {} has no namespace",
                        self.name_any()
                    )))
                }
            }
        }
        Ok(self.metadata.namespace.as_deref().unwrap_or_default())
    }
}

/// Labels shared by every object the operator creates
pub fn labels_for_rainbond(
    extra: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        ("creator".to_string(), "Rainbond".to_string()),
        ("belongTo".to_string(), "rainbond-operator".to_string()),
    ]);
    labels.extend(extra);
    labels
}

/// Labels identifying one component's objects and pods
pub fn labels_for_component(component: &RbdComponent) -> BTreeMap<String, String> {
    labels_for_rainbond([("name".to_string(), component.name_any())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(policy: Option<&str>) -> RbdComponent {
        let mut c = RbdComponent::new(
            "rbd-chaos",
            RbdComponentSpec {
                image: "rainbond/rbd-chaos:v6".to_string(),
                image_pull_policy: policy.map(str::to_string),
                ..Default::default()
            },
        );
        c.metadata.namespace = Some("rbd-system".to_string());
        c
    }

    #[test]
    fn test_pull_policy_defaults_to_always() {
        assert_eq!(component(None).image_pull_policy(), "Always");
        assert_eq!(component(Some("")).image_pull_policy(), "Always");
    }

    #[test]
    fn test_declared_pull_policy_passes_through() {
        assert_eq!(component(Some("IfNotPresent")).image_pull_policy(), "IfNotPresent");
    }

    #[test]
    fn test_component_labels() {
        let labels = labels_for_component(&component(None));
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get("name"), Some(&"rbd-chaos".to_string()));
        assert_eq!(labels.get("creator"), Some(&"Rainbond".to_string()));
        assert_eq!(labels.get("belongTo"), Some(&"rainbond-operator".to_string()));
    }

    #[test]
    fn test_override_lists_parse_from_yaml() {
        let yaml = r#"
image: rainbond/rbd-chaos:v6
env:
  - name: CACHE_DIR
    value: /data/cache
volumeMounts:
  - name: extra
    mountPath: /extra
args:
  - --log-level=debug
"#;
        let spec: RbdComponentSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.env[0].value.as_deref(), Some("/data/cache"));
        assert_eq!(spec.volume_mounts[0].mount_path, "/extra");
        assert_eq!(spec.args, vec!["--log-level=debug"]);
        assert!(spec.volumes.is_empty());
    }

    #[test]
    fn test_namespace_or_default() {
        assert_eq!(component(None).namespace_or_default(), "rbd-system");
        let mut c = component(None);
        c.metadata.namespace = None;
        assert_eq!(c.namespace_or_default(), "");
    }

    #[test]
    fn test_declared_namespace_wins_over_fallback() {
        let mut c = component(None);
        assert_eq!(c.ensure_namespace(Some("other")).unwrap(), "rbd-system");
    }

    #[test]
    fn test_missing_namespace_takes_fallback() {
        let mut c = component(None);
        c.metadata.namespace = None;
        assert_eq!(c.ensure_namespace(Some("rbd-system")).unwrap(), "rbd-system");
        assert_eq!(c.metadata.namespace.as_deref(), Some("rbd-system"));
    }

    #[test]
    fn test_missing_namespace_without_fallback_is_rejected() {
        let mut c = component(None);
        c.metadata.namespace = Some(String::new());

        let err = c.ensure_namespace(None).unwrap_err();
        assert!(matches!(err, crate::Error::Validation(_)));
        assert!(err.to_string().contains("rbd-chaos"));
        assert!(c.ensure_namespace(Some("")).is_err());
    }
}
