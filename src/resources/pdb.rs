//! PodDisruptionBudget generation for DSE datacenters.
//!
//! Allows one voluntary disruption (node drain, upgrade) at a time across
//! the datacenter.

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::DseDatacenter;
use crate::resources::common::{owner_reference, pod_disruption_budget_name};
use crate::resources::labels::LabelSet;

/// Generate a PodDisruptionBudget for a DseDatacenter.
///
/// `minAvailable = size - 1`, independent of replication factor. There is no
/// special case for small datacenters: a single-node datacenter gets
/// `minAvailable = 0`. The subtraction saturates at `i32::MIN`.
pub fn generate_pod_disruption_budget(resource: &DseDatacenter) -> PodDisruptionBudget {
    let datacenter = LabelSet::datacenter(resource);
    let min_available = resource.spec.size.saturating_sub(1);

    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(pod_disruption_budget_name(resource)),
            namespace: resource.namespace(),
            labels: Some(datacenter.managed().into()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available)),
            selector: Some(LabelSelector {
                match_labels: Some(datacenter.into()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::crd::DseDatacenterSpec;
    use crate::resources::labels::{DATACENTER_LABEL, MANAGED_BY_LABEL};

    fn test_resource(size: i32) -> DseDatacenter {
        DseDatacenter {
            metadata: ObjectMeta {
                name: Some("dc1".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: DseDatacenterSpec {
                dse_cluster_name: "cluster1".to_string(),
                size,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_generate_pdb_3_nodes() {
        let pdb = generate_pod_disruption_budget(&test_resource(3));

        assert_eq!(pdb.metadata.name, Some("dc1-pdb".to_string()));
        assert_eq!(pdb.metadata.namespace, Some("default".to_string()));

        let spec = pdb.spec.unwrap();
        assert_eq!(spec.min_available, Some(IntOrString::Int(2)));
        assert!(spec.max_unavailable.is_none());
    }

    #[test]
    fn test_generate_pdb_single_node() {
        // One node tolerates no disruption budget at all: minAvailable is 0
        let pdb = generate_pod_disruption_budget(&test_resource(1));
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(0)));
    }

    #[test]
    fn test_generate_pdb_zero_nodes_is_not_clamped() {
        let pdb = generate_pod_disruption_budget(&test_resource(0));
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(-1)));
    }

    #[test]
    fn test_generate_pdb_min_size_does_not_overflow() {
        let pdb = generate_pod_disruption_budget(&test_resource(i32::MIN));
        assert_eq!(
            pdb.spec.unwrap().min_available,
            Some(IntOrString::Int(i32::MIN))
        );
    }

    #[test]
    fn test_pdb_selector() {
        let pdb = generate_pod_disruption_budget(&test_resource(3));

        let labels = pdb.metadata.labels.unwrap();
        assert!(labels.contains_key(MANAGED_BY_LABEL));

        let selector = pdb.spec.unwrap().selector.unwrap();
        let match_labels = selector.match_labels.unwrap();
        assert_eq!(match_labels.get(DATACENTER_LABEL), Some(&"dc1".to_string()));
        assert!(!match_labels.contains_key(MANAGED_BY_LABEL));
    }
}
