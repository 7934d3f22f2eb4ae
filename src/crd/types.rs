//! Supporting types for the RainbondCluster CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_DB_PORT, REGION_DATABASE_NAME};

/// Connection parameters for a region-level MySQL datastore
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Database host
    pub host: String,

    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Login user
    #[serde(default)]
    pub username: String,

    /// Login password
    #[serde(default)]
    pub password: String,

    /// Database (schema) name; empty means the region default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}

impl Database {
    /// Return the descriptor with an empty name replaced by the region default
    pub fn with_default_name(mut self) -> Self {
        if self.name.is_empty() {
            self.name = REGION_DATABASE_NAME.to_string();
        }
        self
    }

    /// Render the `--mysql` flag component daemons accept
    pub fn region_data_source(&self) -> String {
        format!(
            "--mysql={}:{}@tcp({}:{})/{}",
            self.username, self.password, self.host, self.port, self.name
        )
    }
}

/// External image registry ("image hub") configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageHub {
    /// Registry domain (e.g., "registry.example.com")
    pub domain: String,

    /// Repository namespace within the registry
    #[serde(default)]
    pub namespace: String,

    /// Registry user
    #[serde(default)]
    pub username: String,

    /// Registry password
    #[serde(default)]
    pub password: String,
}

impl ImageHub {
    /// Repository path: domain and namespace joined like a URL path
    pub fn repository(&self) -> String {
        let domain = self.domain.trim_end_matches('/');
        let namespace = self.namespace.trim_matches('/');
        if namespace.is_empty() {
            domain.to_string()
        } else if domain.is_empty() {
            namespace.to_string()
        } else {
            format!("{domain}/{namespace}")
        }
    }
}

/// Etcd cluster used by Rainbond components
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdConfig {
    /// Client endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,

    /// Secret holding mutual-TLS material (ca-file, cert-file, key-file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// A cluster node designated for a component class
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct K8sNode {
    /// Kubernetes node name (matches `kubernetes.io/hostname`)
    pub name: String,

    /// Internal IP address
    #[serde(default, rename = "internalIP", skip_serializing_if = "String::is_empty")]
    pub internal_ip: String,

    /// External IP address
    #[serde(default, rename = "externalIP", skip_serializing_if = "String::is_empty")]
    pub external_ip: String,
}

impl K8sNode {
    /// Create a node entry with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod database {
        use super::*;

        #[test]
        fn test_empty_name_defaults_to_region() {
            let db = Database {
                host: "rbd-db".to_string(),
                ..Default::default()
            }
            .with_default_name();
            assert_eq!(db.name, "region");
        }

        #[test]
        fn test_declared_name_passes_through() {
            let db = Database {
                host: "mysql.prod".to_string(),
                name: "console".to_string(),
                ..Default::default()
            }
            .with_default_name();
            assert_eq!(db.name, "console");
        }

        #[test]
        fn test_region_data_source() {
            let db = Database {
                host: "rbd-db".to_string(),
                port: 3306,
                username: "root".to_string(),
                password: "s3cret".to_string(),
                name: "region".to_string(),
            };
            assert_eq!(
                db.region_data_source(),
                "--mysql=root:s3cret@tcp(rbd-db:3306)/region"
            );
        }

        #[test]
        fn test_port_defaults_when_omitted() {
            let db: Database = serde_json::from_str(r#"{"host":"mysql"}"#).unwrap();
            assert_eq!(db.port, 3306);
            assert!(db.name.is_empty());
        }
    }

    mod image_hub {
        use super::*;

        fn hub(domain: &str, namespace: &str) -> ImageHub {
            ImageHub {
                domain: domain.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            }
        }

        #[test]
        fn test_repository_joins_domain_and_namespace() {
            assert_eq!(hub("hub.example.com", "rainbond").repository(), "hub.example.com/rainbond");
        }

        #[test]
        fn test_repository_without_namespace() {
            assert_eq!(hub("hub.example.com", "").repository(), "hub.example.com");
        }

        #[test]
        fn test_repository_strips_redundant_slashes() {
            assert_eq!(hub("hub.example.com/", "/rainbond/").repository(), "hub.example.com/rainbond");
        }
    }

    #[test]
    fn test_node_ip_field_names() {
        let node: K8sNode =
            serde_json::from_str(r#"{"name":"n1","internalIP":"10.0.0.1"}"#).unwrap();
        assert_eq!(node.name, "n1");
        assert_eq!(node.internal_ip, "10.0.0.1");
        assert!(node.external_ip.is_empty());
    }
}
