// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for dse-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the public
//! synthesis and progress APIs end to end.

#[path = "../common/fixtures.rs"]
mod fixtures;

mod scenario_tests {
    use crate::fixtures::DseDatacenterBuilder;
    use dse_operator::resources::affinity::{HOSTNAME_TOPOLOGY_KEY, ZONE_LABEL};
    use dse_operator::resources::statefulset::{DATA_VOLUME, generate_statefulset};
    use dse_operator::resources::{JsonConfigRenderer, NoSecurity};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn test_three_node_rack_with_storage() {
        let dc = DseDatacenterBuilder::new("dc1")
            .namespace("dse")
            .cluster("cluster1")
            .size(3)
            .rack("rack1", "zoneA")
            .storage("10Gi")
            .build();

        let sts = generate_statefulset(&dc, "rack1", dc.spec.size, &JsonConfigRenderer, &NoSecurity)
            .unwrap();

        assert_eq!(sts.metadata.name.as_deref(), Some("cluster1-dc1-rack1-sts"));
        assert_eq!(sts.metadata.namespace.as_deref(), Some("dse"));

        let spec = sts.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));

        let claims = spec.volume_claim_templates.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name.as_deref(), Some(DATA_VOLUME));
        let claim_spec = claims[0].spec.as_ref().unwrap();
        assert_eq!(
            claim_spec.access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
        assert_eq!(
            claim_spec.resources.as_ref().unwrap().requests.as_ref().unwrap()["storage"],
            Quantity("10Gi".to_string())
        );

        let affinity = spec.template.spec.unwrap().affinity.unwrap();
        let term = &affinity
            .node_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms[0];
        let requirement = &term.match_expressions.as_ref().unwrap()[0];
        assert_eq!(requirement.key, ZONE_LABEL);
        assert_eq!(requirement.operator, "In");
        assert_eq!(requirement.values, Some(vec!["zoneA".to_string()]));

        let anti = affinity
            .pod_anti_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap();
        assert_eq!(anti.len(), 1);
        assert_eq!(anti[0].topology_key, HOSTNAME_TOPOLOGY_KEY);
    }

    #[test]
    fn test_one_statefulset_per_rack() {
        let dc = DseDatacenterBuilder::new("dc1")
            .rack("r1", "zoneA")
            .rack("r2", "zoneB")
            .rack("r3", "")
            .build();

        let names: Vec<String> = dc
            .racks()
            .iter()
            .map(|rack| {
                generate_statefulset(&dc, &rack.name, 1, &JsonConfigRenderer, &NoSecurity)
                    .unwrap()
                    .metadata
                    .name
                    .unwrap()
            })
            .collect();

        assert_eq!(
            names,
            vec![
                "cluster1-dc1-r1-sts",
                "cluster1-dc1-r2-sts",
                "cluster1-dc1-r3-sts"
            ]
        );
    }

    #[test]
    fn test_default_rack_without_declared_racks() {
        let dc = DseDatacenterBuilder::new("dc1").build();
        let racks = dc.racks();
        assert_eq!(racks.len(), 1);

        let sts = generate_statefulset(&dc, &racks[0].name, 3, &JsonConfigRenderer, &NoSecurity)
            .unwrap();
        assert_eq!(sts.metadata.name.as_deref(), Some("cluster1-dc1-default-sts"));
        let affinity = sts.spec.unwrap().template.spec.unwrap().affinity.unwrap();
        assert!(affinity.node_affinity.is_none());
    }

    #[test]
    fn test_shared_workers_drop_anti_affinity() {
        let dc = DseDatacenterBuilder::new("dc1")
            .rack("rack1", "zoneA")
            .allow_multiple_nodes_per_worker(true)
            .build();

        let sts =
            generate_statefulset(&dc, "rack1", 3, &JsonConfigRenderer, &NoSecurity).unwrap();
        let affinity = sts.spec.unwrap().template.spec.unwrap().affinity.unwrap();
        assert!(affinity.pod_anti_affinity.is_none());
        assert!(affinity.node_affinity.is_some());
    }
}

mod service_tests {
    use crate::fixtures::test_datacenter;
    use dse_operator::resources::labels::SEED_NODE_LABEL;
    use dse_operator::resources::services::{
        generate_all_pods_service, generate_client_service, generate_seed_service,
    };

    #[test]
    fn test_all_services_are_headless() {
        let dc = test_datacenter("dc1", "dse");
        for svc in [
            generate_client_service(&dc),
            generate_seed_service(&dc),
            generate_all_pods_service(&dc),
        ] {
            let spec = svc.spec.unwrap();
            assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
            assert_eq!(svc.metadata.namespace.as_deref(), Some("dse"));
            let owner = &svc.metadata.owner_references.unwrap()[0];
            assert_eq!(owner.kind, "DseDatacenter");
            assert_eq!(owner.uid, "test-uid-dc1");
        }
    }

    #[test]
    fn test_readiness_publication() {
        let dc = test_datacenter("dc1", "dse");
        let client = generate_client_service(&dc).spec.unwrap();
        let seed = generate_seed_service(&dc).spec.unwrap();
        let all = generate_all_pods_service(&dc).spec.unwrap();

        assert_ne!(client.publish_not_ready_addresses, Some(true));
        assert_eq!(seed.publish_not_ready_addresses, Some(true));
        assert_eq!(all.publish_not_ready_addresses, Some(true));

        assert!(seed.selector.unwrap().contains_key(SEED_NODE_LABEL));
        assert!(!all.selector.unwrap().contains_key(SEED_NODE_LABEL));
        assert_eq!(client.ports.unwrap().len(), 2);
    }
}

mod pdb_tests {
    use crate::fixtures::DseDatacenterBuilder;
    use dse_operator::resources::pdb::generate_pod_disruption_budget;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    #[test]
    fn test_min_available_is_size_minus_one() {
        for (size, expected) in [(1, 0), (3, 2), (6, 5)] {
            let dc = DseDatacenterBuilder::new("dc1").size(size).build();
            let pdb = generate_pod_disruption_budget(&dc);
            assert_eq!(pdb.metadata.name.as_deref(), Some("dc1-pdb"));
            assert_eq!(
                pdb.spec.unwrap().min_available,
                Some(IntOrString::Int(expected))
            );
        }
    }
}

mod config_tests {
    use crate::fixtures::DseDatacenterBuilder;
    use dse_operator::Error;
    use dse_operator::resources::statefulset::generate_statefulset;
    use dse_operator::resources::{ConfigRenderer, JsonConfigRenderer, NoSecurity};
    use serde_json::json;

    #[test]
    fn test_prometheus_port_follows_config() {
        let dc = DseDatacenterBuilder::new("dc1")
            .config(json!({"10-write-prom-conf": {"port": 9500}}))
            .build();

        let sts = generate_statefulset(&dc, "default", 1, &JsonConfigRenderer, &NoSecurity)
            .unwrap();
        let pod = sts.spec.unwrap().template.spec.unwrap();
        let dse = pod.containers.iter().find(|c| c.name == "dse").unwrap();
        assert!(
            dse.ports
                .as_ref()
                .unwrap()
                .iter()
                .any(|p| p.name.as_deref() == Some("prometheus") && p.container_port == 9500)
        );

        // The same config is also rendered for the init container
        let rendered: serde_json::Value =
            serde_json::from_str(&JsonConfigRenderer.render(&dc).unwrap()).unwrap();
        assert_eq!(rendered["10-write-prom-conf"]["port"], 9500);
    }

    #[test]
    fn test_invalid_config_yields_no_statefulset() {
        let dc = DseDatacenterBuilder::new("dc1").config(json!("not-an-object")).build();
        let result = generate_statefulset(&dc, "default", 1, &JsonConfigRenderer, &NoSecurity);
        assert!(matches!(result, Err(Error::ConfigRender(_))));
    }
}

mod security_tests {
    use crate::fixtures::DseDatacenterBuilder;
    use dse_operator::crd::{ManagementApiAuthConfig, ManualManagementApiAuth};
    use dse_operator::resources::statefulset::generate_statefulset;
    use dse_operator::resources::{JsonConfigRenderer, ManagementApiSecurity};

    #[test]
    fn test_manual_auth_secures_probes() {
        let mut dc = DseDatacenterBuilder::new("dc1").build();
        dc.spec.management_api_auth = Some(ManagementApiAuthConfig {
            manual: Some(ManualManagementApiAuth {
                client_secret_name: "mgmt-client".to_string(),
                server_secret_name: "mgmt-server".to_string(),
            }),
        });

        let sts = generate_statefulset(&dc, "default", 3, &JsonConfigRenderer, &ManagementApiSecurity)
            .unwrap();
        let pod = sts.spec.unwrap().template.spec.unwrap();

        assert!(
            pod.volumes
                .unwrap()
                .iter()
                .any(|v| v.secret.as_ref().and_then(|s| s.secret_name.as_deref())
                    == Some("mgmt-server"))
        );
        let dse = pod.containers.iter().find(|c| c.name == "dse").unwrap();
        let scheme = dse
            .readiness_probe
            .as_ref()
            .and_then(|p| p.http_get.as_ref())
            .and_then(|h| h.scheme.as_deref());
        assert_eq!(scheme, Some("HTTPS"));
    }

    #[test]
    fn test_insecure_matches_no_security() {
        let dc = DseDatacenterBuilder::new("dc1").build();
        let secured =
            generate_statefulset(&dc, "default", 3, &JsonConfigRenderer, &ManagementApiSecurity)
                .unwrap();
        let plain = generate_statefulset(
            &dc,
            "default",
            3,
            &JsonConfigRenderer,
            &dse_operator::resources::NoSecurity,
        )
        .unwrap();
        assert_eq!(secured, plain);
    }
}

mod progress_tests {
    use crate::fixtures::{DseDatacenterBuilder, test_datacenter};
    use dse_operator::crd::DseDatacenter;
    use dse_operator::resources::labels::PROGRESS_LABEL;
    use dse_operator::{
        Error, PersistenceClient, ProgressLabelTransitioner, ProgressState, Result,
    };
    use kube::ResourceExt;
    use std::sync::Mutex;

    /// Stores the last written object and checks resource versions.
    struct InMemoryStore {
        stored: Mutex<DseDatacenter>,
        writes: Mutex<usize>,
    }

    impl InMemoryStore {
        fn new(initial: DseDatacenter) -> Self {
            Self {
                stored: Mutex::new(initial),
                writes: Mutex::new(0),
            }
        }

        fn writes(&self) -> usize {
            *self.writes.lock().unwrap()
        }
    }

    impl PersistenceClient for InMemoryStore {
        async fn update(&self, resource: &DseDatacenter) -> Result<DseDatacenter> {
            *self.writes.lock().unwrap() += 1;
            let mut stored = self.stored.lock().unwrap();
            if stored.metadata.resource_version != resource.metadata.resource_version {
                return Err(Error::Conflict(resource.name_any()));
            }

            let next: u64 = stored
                .metadata
                .resource_version
                .as_deref()
                .unwrap_or("0")
                .parse()
                .unwrap();
            let mut written = resource.clone();
            written.metadata.resource_version = Some((next + 1).to_string());
            *stored = written.clone();
            Ok(written)
        }
    }

    #[tokio::test]
    async fn test_ready_twice_writes_once() {
        let dc = test_datacenter("dc1", "dse");
        let transitioner = ProgressLabelTransitioner::new(InMemoryStore::new(dc.clone()));
        let mut local = dc;

        let first = transitioner.transition(&mut local, ProgressState::Ready).await.unwrap();
        let second = transitioner.transition(&mut local, ProgressState::Ready).await.unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(local.labels().get(PROGRESS_LABEL).map(String::as_str), Some("Ready"));
        assert_eq!(local.metadata.resource_version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_updating_then_ready() {
        let dc = test_datacenter("dc1", "dse");
        let store = InMemoryStore::new(dc.clone());
        let transitioner = ProgressLabelTransitioner::new(store);
        let mut local = dc;

        for state in [ProgressState::Updating, ProgressState::Ready] {
            assert!(transitioner.transition(&mut local, state).await.unwrap());
        }
        assert_eq!(local.metadata.resource_version.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_stale_object_conflicts() {
        let stored = DseDatacenterBuilder::new("dc1").resource_version("5").build();
        let store = InMemoryStore::new(stored);
        let mut stale = DseDatacenterBuilder::new("dc1")
            .resource_version("4")
            .label(PROGRESS_LABEL, "Updating")
            .build();

        let transitioner = ProgressLabelTransitioner::new(store);
        let err = transitioner
            .transition(&mut stale, ProgressState::Ready)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(matches!(err, Error::ProgressLabel { ref value, .. } if value == "Ready"));
        assert_eq!(
            stale.labels().get(PROGRESS_LABEL).map(String::as_str),
            Some("Updating")
        );
    }

    #[tokio::test]
    async fn test_converged_object_issues_no_writes() {
        let dc = DseDatacenterBuilder::new("dc1")
            .resource_version("1")
            .label(PROGRESS_LABEL, "Ready")
            .build();
        let store = InMemoryStore::new(dc.clone());
        let transitioner = ProgressLabelTransitioner::new(&store);
        let mut local = dc;

        for _ in 0..3 {
            assert!(!transitioner.transition(&mut local, ProgressState::Ready).await.unwrap());
        }
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_write_count_matches_state_changes() {
        let dc = test_datacenter("dc1", "dse");
        let store = InMemoryStore::new(dc.clone());
        let mut local = dc;

        let transitioner = ProgressLabelTransitioner::new(&store);
        for state in [
            ProgressState::Updating,
            ProgressState::Updating,
            ProgressState::Ready,
            ProgressState::Ready,
        ] {
            transitioner.transition(&mut local, state).await.unwrap();
        }
        assert_eq!(store.writes(), 2);
    }
}
