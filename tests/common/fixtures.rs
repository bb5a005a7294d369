//! Test fixtures and builder patterns for DseDatacenter.

#![allow(dead_code)]

use dse_operator::crd::{DseDatacenter, DseDatacenterSpec, Rack, StorageClaimSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Builder for creating DseDatacenter test fixtures.
///
/// # Example
/// ```
/// let dc = DseDatacenterBuilder::new("dc1")
///     .cluster("cluster1")
///     .size(3)
///     .rack("rack1", "zoneA")
///     .storage("10Gi")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct DseDatacenterBuilder {
    name: String,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    uid: Option<String>,
    resource_version: Option<String>,
    spec: DseDatacenterSpec,
}

impl DseDatacenterBuilder {
    /// Create a new builder with the given datacenter name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            labels: BTreeMap::new(),
            uid: None,
            resource_version: None,
            spec: DseDatacenterSpec {
                dse_cluster_name: "cluster1".to_string(),
                ..Default::default()
            },
        }
    }

    /// Set the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the DSE cluster name.
    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.spec.dse_cluster_name = cluster.into();
        self
    }

    /// Set the number of nodes.
    pub fn size(mut self, size: i32) -> Self {
        self.spec.size = size;
        self
    }

    /// Add a rack pinned to a zone. An empty zone means any zone.
    pub fn rack(mut self, name: impl Into<String>, zone: impl Into<String>) -> Self {
        self.spec.racks.push(Rack {
            name: name.into(),
            zone: zone.into(),
        });
        self
    }

    /// Request persistent storage of the given size.
    pub fn storage(mut self, size: impl Into<String>) -> Self {
        self.spec.storage_claim = Some(StorageClaimSpec {
            size: size.into(),
            ..Default::default()
        });
        self
    }

    /// Allow several DSE pods on one worker.
    pub fn allow_multiple_nodes_per_worker(mut self, allow: bool) -> Self {
        self.spec.allow_multiple_nodes_per_worker = allow;
        self
    }

    /// Set the opaque node configuration.
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.spec.config = Some(config);
        self
    }

    /// Add a label to the resource.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the UID (for testing owner references).
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Set the resource version (for testing optimistic concurrency).
    pub fn resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    /// Build the DseDatacenter.
    pub fn build(self) -> DseDatacenter {
        DseDatacenter {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace,
                labels: if self.labels.is_empty() {
                    None
                } else {
                    Some(self.labels)
                },
                uid: self.uid,
                resource_version: self.resource_version,
                ..Default::default()
            },
            spec: self.spec,
        }
    }
}

impl Default for DseDatacenterBuilder {
    fn default() -> Self {
        Self::new("dc1")
    }
}

/// Create a DseDatacenter with common test defaults.
pub fn test_datacenter(name: &str, namespace: &str) -> DseDatacenter {
    DseDatacenterBuilder::new(name)
        .namespace(namespace)
        .uid(format!("test-uid-{}", name))
        .resource_version("1")
        .build()
}
