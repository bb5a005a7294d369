//! Scheduling constraints for DSE pods.
//!
//! Both constraints are hard requirements. A rack's zone is a durability
//! guarantee, and two pods of one rack sharing a host defeats the rack as a
//! failure domain, so an unsatisfiable constraint blocks scheduling.

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    PodAffinityTerm, PodAntiAffinity,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use crate::resources::labels::{CLUSTER_LABEL, DATACENTER_LABEL, RACK_LABEL};

/// Node label carrying the availability zone
pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";
/// Node label carrying the hostname
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Pin pods to a zone. An empty zone leaves every node eligible.
pub fn node_affinity(zone: &str) -> Option<NodeAffinity> {
    if zone.is_empty() {
        return None;
    }

    Some(NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: ZONE_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![zone.to_string()]),
                }]),
                ..Default::default()
            }],
        }),
        ..Default::default()
    })
}

/// Keep DSE pods on distinct hosts unless sharing a worker is allowed.
pub fn pod_anti_affinity(allow_multiple_nodes_per_worker: bool) -> Option<PodAntiAffinity> {
    if allow_multiple_nodes_per_worker {
        return None;
    }

    let exists = |key: &str| LabelSelectorRequirement {
        key: key.to_string(),
        operator: "Exists".to_string(),
        values: None,
    };

    Some(PodAntiAffinity {
        required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: Some(vec![
                    exists(CLUSTER_LABEL),
                    exists(DATACENTER_LABEL),
                    exists(RACK_LABEL),
                ]),
                ..Default::default()
            }),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    })
}

/// Combined affinity for a rack's pods.
pub fn affinity(zone: &str, allow_multiple_nodes_per_worker: bool) -> Affinity {
    Affinity {
        node_affinity: node_affinity(zone),
        pod_anti_affinity: pod_anti_affinity(allow_multiple_nodes_per_worker),
        ..Default::default()
    }
}
