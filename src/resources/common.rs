//! Common resource generation utilities.
//!
//! Deterministic names and owner references shared by all generated
//! resources.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::DseDatacenter;

/// Create owner reference for a DseDatacenter
pub fn owner_reference(resource: &DseDatacenter) -> OwnerReference {
    OwnerReference {
        api_version: DseDatacenter::api_version(&()).to_string(),
        kind: DseDatacenter::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Name of the client Service, also the StatefulSets' governing service.
pub fn client_service_name(resource: &DseDatacenter) -> String {
    format!(
        "{}-{}-service",
        resource.spec.dse_cluster_name,
        resource.datacenter_name()
    )
}

/// Name of the seed discovery Service (shared by all datacenters of a cluster).
pub fn seed_service_name(resource: &DseDatacenter) -> String {
    format!("{}-seed-service", resource.spec.dse_cluster_name)
}

/// Name of the Service covering every pod of the datacenter.
pub fn all_pods_service_name(resource: &DseDatacenter) -> String {
    format!(
        "{}-{}-all-pods-service",
        resource.spec.dse_cluster_name,
        resource.datacenter_name()
    )
}

/// Name of the StatefulSet for a rack.
///
/// Stable across calls so the rack's workload is updated in place.
pub fn statefulset_name(resource: &DseDatacenter, rack_name: &str) -> String {
    format!(
        "{}-{}-{}-sts",
        resource.spec.dse_cluster_name,
        resource.datacenter_name(),
        rack_name
    )
}

/// Name of the PodDisruptionBudget.
pub fn pod_disruption_budget_name(resource: &DseDatacenter) -> String {
    format!("{}-pdb", resource.datacenter_name())
}
