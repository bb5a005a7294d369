//! DseDatacenter Custom Resource Definition.
//!
//! Defines the DseDatacenter CRD describing one rack-aware DSE datacenter
//! inside a named cluster, plus the derived values (images, ports, racks)
//! that resource generation needs.

use k8s_openapi::api::core::v1::ContainerPort;
use kube::CustomResource;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use serde::{Deserialize, Serialize};

use crate::controller::error::{Error, Result};

/// DseDatacenter is a custom resource for deploying one DSE datacenter.
///
/// Example:
/// ```yaml
/// apiVersion: datastax.com/v1alpha1
/// kind: DseDatacenter
/// metadata:
///   name: dc1
/// spec:
///   dseClusterName: cluster1
///   dseVersion: 6.8.0
///   size: 3
///   racks:
///     - name: rack1
///       zone: us-east-1a
///   storageClaim:
///     size: 10Gi
///     storageClassName: standard
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "datastax.com",
    version = "v1alpha1",
    kind = "DseDatacenter",
    plural = "dsedatacenters",
    shortname = "dsedc",
    namespaced,
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.dseClusterName"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.dseVersion"}"#,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DseDatacenterSpec {
    // === Identity ===
    /// Name of the DSE cluster this datacenter belongs to.
    pub dse_cluster_name: String,

    /// DSE server version (default: 6.8.0).
    #[serde(default = "default_dse_version")]
    pub dse_version: String,

    // === Topology ===
    /// Desired number of DSE nodes across all racks (default 3).
    #[serde(default = "default_size")]
    pub size: i32,

    /// Racks of the datacenter, each optionally pinned to a zone.
    /// When empty a single `default` rack without a zone is used.
    #[serde(default)]
    pub racks: Vec<Rack>,

    /// Allow more than one DSE pod of a rack on a single worker node.
    #[serde(default)]
    pub allow_multiple_nodes_per_worker: bool,

    // === Storage ===
    /// Persistent storage for the data directory.
    /// When absent, pods only use ephemeral storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_claim: Option<StorageClaimSpec>,

    // === Resources ===
    /// Resource requests and limits for the DSE container.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    // === Images ===
    /// Server image override. Resolved from `dseVersion` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_image: Option<String>,

    /// Config builder image override for the init container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_builder_image: Option<String>,

    /// Service account for DSE pods (default: default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    // === Configuration ===
    /// Opaque configuration merged into the rendered node config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,

    /// Management API transport security.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_api_auth: Option<ManagementApiAuthConfig>,
}

impl Default for DseDatacenterSpec {
    fn default() -> Self {
        Self {
            dse_cluster_name: String::new(),
            dse_version: default_dse_version(),
            size: default_size(),
            racks: Vec::new(),
            allow_multiple_nodes_per_worker: false,
            storage_claim: None,
            resources: ResourceRequirementsSpec::default(),
            server_image: None,
            config_builder_image: None,
            service_account: None,
            config: None,
            management_api_auth: None,
        }
    }
}

fn default_dse_version() -> String {
    "6.8.0".to_string()
}

fn default_size() -> i32 {
    3
}

fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

/// A topology rack mapped to a failure domain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    /// Rack name, unique within the datacenter.
    pub name: String,

    /// Availability zone the rack is pinned to. Empty means any zone.
    #[serde(default)]
    pub zone: String,
}

/// Persistent storage for the DSE data directory.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClaimSpec {
    /// Requested volume size (default: 10Gi).
    #[serde(default = "default_storage_size")]
    pub size: String,

    /// Declared access mode. Claims are always created as ReadWriteOnce;
    /// any other value is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,

    /// Storage class name. Uses the cluster default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

impl Default for StorageClaimSpec {
    fn default() -> Self {
        Self {
            size: default_storage_size(),
            access_mode: None,
            storage_class_name: None,
        }
    }
}

fn default_storage_size() -> String {
    "10Gi".to_string()
}

/// Resource requests and limits for DSE pods.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// CPU and memory requests.
    #[serde(default)]
    pub requests: ResourceSpec,

    /// CPU and memory limits.
    #[serde(default)]
    pub limits: ResourceLimitsSpec,
}

/// Resource requests specification.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// CPU request (default: 1).
    #[serde(default = "default_cpu_request")]
    pub cpu: String,

    /// Memory request (default: 4Gi).
    #[serde(default = "default_memory_request")]
    pub memory: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu: default_cpu_request(),
            memory: default_memory_request(),
        }
    }
}

fn default_cpu_request() -> String {
    "1".to_string()
}

fn default_memory_request() -> String {
    "4Gi".to_string()
}

/// Resource limits specification.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimitsSpec {
    /// CPU limit (default: 2).
    #[serde(default = "default_cpu_limit")]
    pub cpu: String,

    /// Memory limit (default: 8Gi).
    #[serde(default = "default_memory_limit")]
    pub memory: String,
}

impl Default for ResourceLimitsSpec {
    fn default() -> Self {
        Self {
            cpu: default_cpu_limit(),
            memory: default_memory_limit(),
        }
    }
}

fn default_cpu_limit() -> String {
    "2".to_string()
}

fn default_memory_limit() -> String {
    "8Gi".to_string()
}

/// Management API transport security.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementApiAuthConfig {
    /// TLS material provisioned out of band as Secrets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualManagementApiAuth>,
}

/// Secrets holding management API TLS material.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualManagementApiAuth {
    /// Secret with the client certificate used by the operator.
    pub client_secret_name: String,

    /// Secret with the server certificate mounted into DSE pods.
    pub server_secret_name: String,
}

/// DSE versions with a known server image.
pub const SUPPORTED_DSE_VERSIONS: &[&str] = &["6.8.0"];

/// Repository of the DSE server image.
pub const SERVER_IMAGE_REPOSITORY: &str = "datastax/dse-server";

/// Default image of the config builder init container.
pub const DEFAULT_CONFIG_BUILDER_IMAGE: &str = "datastax/dse-server-config-builder:7.0.0";

/// CQL native protocol port.
pub const NATIVE_PORT: i32 = 9042;
/// Management API HTTP port.
pub const MGMT_API_PORT: i32 = 8080;
/// Default Prometheus exporter port.
pub const DEFAULT_PROMETHEUS_PORT: i32 = 9103;

/// Config section holding the Prometheus exporter settings.
const PROMETHEUS_CONFIG_SECTION: &str = "10-write-prom-conf";

/// Name of the rack used when none are declared.
pub const DEFAULT_RACK_NAME: &str = "default";

impl DseDatacenter {
    /// Datacenter name (the object name).
    pub fn datacenter_name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    /// Racks of the datacenter, falling back to a single zone-less rack.
    pub fn racks(&self) -> Vec<Rack> {
        if self.spec.racks.is_empty() {
            vec![Rack {
                name: DEFAULT_RACK_NAME.to_string(),
                zone: String::new(),
            }]
        } else {
            self.spec.racks.clone()
        }
    }

    /// Zone of the named rack, or empty when the rack is unknown.
    pub fn zone_for_rack(&self, rack_name: &str) -> String {
        self.racks()
            .into_iter()
            .find(|rack| rack.name == rack_name)
            .map(|rack| rack.zone)
            .unwrap_or_default()
    }

    /// Resolve the DSE server image.
    pub fn server_image(&self) -> Result<String> {
        if let Some(image) = self.spec.server_image.as_ref().filter(|i| !i.is_empty()) {
            return Ok(image.clone());
        }

        let version = self.spec.dse_version.as_str();
        if SUPPORTED_DSE_VERSIONS.contains(&version) {
            Ok(format!("{}:{}", SERVER_IMAGE_REPOSITORY, version))
        } else {
            Err(Error::UnsupportedVersion(version.to_string()))
        }
    }

    /// Resolve the config builder image.
    pub fn config_builder_image(&self) -> String {
        self.spec
            .config_builder_image
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_BUILDER_IMAGE.to_string())
    }

    /// Service account for DSE pods.
    pub fn service_account(&self) -> String {
        self.spec
            .service_account
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Container ports exposed by the DSE container.
    ///
    /// Port names stay within the 15 character limit.
    pub fn container_ports(&self) -> Result<Vec<ContainerPort>> {
        let port = |name: &str, container_port: i32| ContainerPort {
            name: Some(name.to_string()),
            container_port,
            ..Default::default()
        };

        Ok(vec![
            port("native", NATIVE_PORT),
            port("inter-node-msg", 8609),
            port("intra-node", 7000),
            port("tls-intra-node", 7001),
            port("mgmt-api-http", MGMT_API_PORT),
            port("prometheus", self.prometheus_port()?),
        ])
    }

    fn prometheus_port(&self) -> Result<i32> {
        let value = self
            .spec
            .config
            .as_ref()
            .and_then(|config| config.get(PROMETHEUS_CONFIG_SECTION))
            .and_then(|section| section.get("port"));

        let Some(value) = value else {
            return Ok(DEFAULT_PROMETHEUS_PORT);
        };

        // YAML tooling may emit integral numbers as floats (9500.0)
        let port = value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && (1.0..=65535.0).contains(f))
                .map(|f| f as i64)
        });

        port.filter(|p| (1..=65535).contains(p))
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| Error::InvalidPort {
                name: "prometheus".to_string(),
                value: value.to_string(),
            })
    }
}
