//! Label sets for DSE resources.
//!
//! Labels are built at cluster, datacenter, or rack scope. Each scope builds
//! a fresh [`LabelSet`], and the provenance tag is added by a single
//! [`LabelSet::managed`] step at the point an object is constructed.

use std::collections::BTreeMap;

use crate::crd::DseDatacenter;

/// Cluster name label
pub const CLUSTER_LABEL: &str = "com.datastax.dse.cluster";
/// Datacenter name label
pub const DATACENTER_LABEL: &str = "com.datastax.dse.datacenter";
/// Rack name label
pub const RACK_LABEL: &str = "com.datastax.dse.rack";
/// Marks pods acting as seed nodes
pub const SEED_NODE_LABEL: &str = "com.datastax.dse.seednode";
/// Node state handed off to the process running in the pod
pub const NODE_STATE_LABEL: &str = "com.datastax.dse.node.state";
/// Operator progress label on the DseDatacenter object
pub const PROGRESS_LABEL: &str = "com.datastax.dse.operator.progress";

/// Standard label for the tool managing a resource
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of the managed-by label
pub const MANAGED_BY_VALUE: &str = "dse-operator";

/// Initial value of the node state label
pub const NODE_STATE_READY_TO_START: &str = "Ready-to-Start";

/// An immutable set of labels.
///
/// Every operation returns a new set, so a set handed to one object can
/// never be changed through another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Labels identifying the cluster.
    pub fn cluster(resource: &DseDatacenter) -> Self {
        Self::default().with(CLUSTER_LABEL, &resource.spec.dse_cluster_name)
    }

    /// Labels identifying the datacenter within its cluster.
    pub fn datacenter(resource: &DseDatacenter) -> Self {
        Self::cluster(resource).with(DATACENTER_LABEL, resource.datacenter_name())
    }

    /// Labels identifying one rack of the datacenter.
    pub fn rack(resource: &DseDatacenter, rack_name: &str) -> Self {
        Self::datacenter(resource).with(RACK_LABEL, rack_name)
    }

    /// Copy of this set with one more entry.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut labels = self.0.clone();
        labels.insert(key.into(), value.into());
        Self(labels)
    }

    /// Copy of this set carrying the provenance tag.
    pub fn managed(&self) -> Self {
        self.with(MANAGED_BY_LABEL, MANAGED_BY_VALUE)
    }

    /// Look up a label value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Check if a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the set has no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Owned map for a Kubernetes object field.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }
}

impl From<LabelSet> for BTreeMap<String, String> {
    fn from(labels: LabelSet) -> Self {
        labels.0
    }
}
