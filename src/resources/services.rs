//! Service generation for DSE datacenters.
//!
//! Creates three headless services:
//! - **Client Service**: CQL and management API access to datacenter pods
//! - **Seed Service**: Discovery of seed nodes across the whole cluster
//! - **All Pods Service**: Per-pod DNS for every pod, ready or not

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{DseDatacenter, MGMT_API_PORT, NATIVE_PORT};
use crate::resources::common::{
    all_pods_service_name, client_service_name, owner_reference, seed_service_name,
};
use crate::resources::labels::{LabelSet, SEED_NODE_LABEL};

/// Generate the client Service.
///
/// Exposes the CQL native port and the management API on every pod of the
/// datacenter. Governs the per-rack StatefulSets.
pub fn generate_client_service(resource: &DseDatacenter) -> Service {
    let mut service = generate_headless_service(resource, client_service_name(resource));
    if let Some(spec) = service.spec.as_mut() {
        // Port names cannot be more than 15 characters
        spec.ports = Some(vec![
            ServicePort {
                name: Some("native".to_string()),
                port: NATIVE_PORT,
                target_port: Some(IntOrString::Int(NATIVE_PORT)),
                ..Default::default()
            },
            ServicePort {
                name: Some("mgmt-api".to_string()),
                port: MGMT_API_PORT,
                target_port: Some(IntOrString::Int(MGMT_API_PORT)),
                ..Default::default()
            },
        ]);
    }
    service
}

/// Generate the seed Service.
///
/// Selects seed-marked pods of the whole cluster. `publishNotReadyAddresses`
/// lets nodes find seeds during bootstrap, before any node is ready.
pub fn generate_seed_service(resource: &DseDatacenter) -> Service {
    let mut service = generate_headless_service(resource, seed_service_name(resource));
    let cluster = LabelSet::cluster(resource);

    service.metadata.labels = Some(cluster.managed().into());
    if let Some(spec) = service.spec.as_mut() {
        spec.selector = Some(cluster.with(SEED_NODE_LABEL, "true").into());
        spec.publish_not_ready_addresses = Some(true);
    }
    service
}

/// Generate the all-pods Service.
///
/// Selects every pod of the datacenter regardless of seed or readiness
/// state, for direct per-pod addressing.
pub fn generate_all_pods_service(resource: &DseDatacenter) -> Service {
    let mut service = generate_headless_service(resource, all_pods_service_name(resource));
    if let Some(spec) = service.spec.as_mut() {
        spec.publish_not_ready_addresses = Some(true);
    }
    service
}

/// Headless Service selecting the datacenter's pods.
fn generate_headless_service(resource: &DseDatacenter, name: String) -> Service {
    let datacenter = LabelSet::datacenter(resource);

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(datacenter.managed().into()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            // Headless service (no cluster IP)
            cluster_ip: Some("None".to_string()),
            selector: Some(datacenter.into()),
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
    use crate::resources::labels::{
        CLUSTER_LABEL, DATACENTER_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    };

    fn test_resource() -> DseDatacenter {
        DseDatacenter {
            metadata: ObjectMeta {
                name: Some("dc1".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: DseDatacenterSpec {
                dse_cluster_name: "cluster1".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_generate_client_service() {
        let svc = generate_client_service(&test_resource());

        assert_eq!(svc.metadata.name, Some("cluster1-dc1-service".to_string()));
        assert_eq!(svc.metadata.namespace, Some("default".to_string()));

        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, None);

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 2);
        assert!(
            ports
                .iter()
                .any(|p| p.name == Some("native".to_string()) && p.port == 9042)
        );
        assert!(
            ports
                .iter()
                .any(|p| p.name == Some("mgmt-api".to_string()) && p.port == 8080)
        );
    }

    #[test]
    fn test_client_service_selects_datacenter() {
        let svc = generate_client_service(&test_resource());
        let selector = svc.spec.unwrap().selector.unwrap();

        assert_eq!(selector.len(), 2);
        assert_eq!(selector.get(CLUSTER_LABEL), Some(&"cluster1".to_string()));
        assert_eq!(selector.get(DATACENTER_LABEL), Some(&"dc1".to_string()));
    }

    #[test]
    fn test_generate_seed_service() {
        let svc = generate_seed_service(&test_resource());

        assert_eq!(svc.metadata.name, Some("cluster1-seed-service".to_string()));

        let labels = svc.metadata.labels.unwrap();
        assert_eq!(
            labels.get(MANAGED_BY_LABEL),
            Some(&MANAGED_BY_VALUE.to_string())
        );
        assert!(!labels.contains_key(DATACENTER_LABEL));

        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));

        let selector = spec.selector.unwrap();
        assert_eq!(selector.get(SEED_NODE_LABEL), Some(&"true".to_string()));
        assert_eq!(selector.get(CLUSTER_LABEL), Some(&"cluster1".to_string()));
    }

    #[test]
    fn test_generate_all_pods_service() {
        let svc = generate_all_pods_service(&test_resource());

        assert_eq!(
            svc.metadata.name,
            Some("cluster1-dc1-all-pods-service".to_string())
        );

        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));

        let selector = spec.selector.unwrap();
        assert!(!selector.contains_key(SEED_NODE_LABEL));
        assert_eq!(selector.get(DATACENTER_LABEL), Some(&"dc1".to_string()));
    }

    #[test]
    fn test_service_labels_carry_provenance() {
        let resource = test_resource();
        for svc in [
            generate_client_service(&resource),
            generate_seed_service(&resource),
            generate_all_pods_service(&resource),
        ] {
            let labels = svc.metadata.labels.unwrap();
            assert_eq!(
                labels.get(MANAGED_BY_LABEL),
                Some(&MANAGED_BY_VALUE.to_string())
            );
            // Provenance is on the object, not in what it selects
            let selector = svc.spec.unwrap().selector.unwrap();
            assert!(!selector.contains_key(MANAGED_BY_LABEL));
        }
    }

    #[test]
    fn test_services_are_deterministic() {
        let resource = test_resource();
        assert_eq!(
            generate_seed_service(&resource),
            generate_seed_service(&resource)
        );
        assert_eq!(
            generate_client_service(&resource),
            generate_client_service(&resource)
        );
    }
}
