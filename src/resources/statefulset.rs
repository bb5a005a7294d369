//! StatefulSet generation for DSE datacenters.
//!
//! Creates one StatefulSet per rack:
//! - Deterministic name so the rack's workload is updated in place
//! - Zone pinning and host anti-affinity
//! - Optional persistent data volume
//! - Config builder init container fed the rendered node configuration
//! - Management API health probes
//! - System log tailing sidecar

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, HTTPGetAction, ObjectFieldSelector,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSecurityContext, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use crate::controller::error::Result;
use crate::crd::{DseDatacenter, MGMT_API_PORT, StorageClaimSpec};
use crate::resources::affinity::affinity;
use crate::resources::common::{client_service_name, owner_reference, statefulset_name};
use crate::resources::config::ConfigRenderer;
use crate::resources::labels::{
    LabelSet, NODE_STATE_LABEL, NODE_STATE_READY_TO_START, RACK_LABEL,
};
use crate::resources::security::{DSE_CONTAINER_NAME, SecurityDecorator};

/// User and group ID of the DSE process in the server image
const DSE_USER_ID: i64 = 999;

/// Name of the data volume claim template
pub const DATA_VOLUME: &str = "dse-data";
/// Shared volume the init container writes config files to
const CONFIG_VOLUME: &str = "dse-config";
/// Shared volume holding DSE logs
const LOGS_VOLUME: &str = "dse-logs";

const CONFIG_PATH: &str = "/config";
const LOGS_PATH: &str = "/var/log/cassandra";
const DATA_PATH: &str = "/var/lib/cassandra";

/// Only access mode a data claim is created with
const SINGLE_WRITER_ACCESS_MODE: &str = "ReadWriteOnce";

const LIVENESS_PATH: &str = "/api/v0/probes/liveness";
const READINESS_PATH: &str = "/api/v0/probes/readiness";

/// Image of the system log sidecar
const LOGGER_IMAGE: &str = "busybox";

/// Generate the StatefulSet for one rack of a DseDatacenter.
///
/// Fails without returning a partial StatefulSet when the configuration
/// cannot be rendered or the image or ports cannot be resolved. A
/// decoration failure also fails the call. Its changes to the template are
/// not rolled back, so the caller must not use anything built from it.
///
/// Pods are created in parallel. Safe startup ordering is left to the
/// reconciler.
#[instrument(skip(resource, renderer, decorator), fields(datacenter = %resource.name_any()))]
pub fn generate_statefulset(
    resource: &DseDatacenter,
    rack_name: &str,
    replicas: i32,
    renderer: &impl ConfigRenderer,
    decorator: &impl SecurityDecorator,
) -> Result<StatefulSet> {
    let rack = LabelSet::rack(resource, rack_name);
    let name = statefulset_name(resource, rack_name);

    let config_data = renderer.render(resource)?;
    let storage_claim = resource.spec.storage_claim.as_ref();

    let mut template = generate_pod_template(resource, rack_name, &rack, config_data)?;
    decorator.decorate(resource, &mut template)?;

    debug!(
        statefulset = %name,
        replicas,
        persistent = storage_claim.is_some(),
        "Generated StatefulSet"
    );

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: resource.namespace(),
            labels: Some(rack.managed().into()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: Some(client_service_name(resource)),
            selector: LabelSelector {
                match_labels: Some(rack.to_map()),
                ..Default::default()
            },
            pod_management_policy: Some("Parallel".to_string()),
            template,
            volume_claim_templates: storage_claim
                .map(|claim| vec![generate_pvc_template(claim, &rack)]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Generate the pod template, before security decoration.
fn generate_pod_template(
    resource: &DseDatacenter,
    rack_name: &str,
    rack: &LabelSet,
    config_data: String,
) -> Result<PodTemplateSpec> {
    // The node state label is handed off to the DSE process; it is only
    // ever set here, at creation.
    let pod_labels = rack
        .managed()
        .with(NODE_STATE_LABEL, NODE_STATE_READY_TO_START);

    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels.into()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            affinity: Some(affinity(
                &resource.zone_for_rack(rack_name),
                resource.spec.allow_multiple_nodes_per_worker,
            )),
            security_context: Some(generate_pod_security_context()),
            volumes: Some(generate_volumes()),
            init_containers: Some(vec![generate_config_init_container(
                resource,
                config_data,
            )]),
            service_account_name: Some(resource.service_account()),
            containers: vec![generate_dse_container(resource)?, generate_logger_container()],
            ..Default::default()
        }),
    })
}

/// Generate pod security context.
fn generate_pod_security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(DSE_USER_ID),
        run_as_group: Some(DSE_USER_ID),
        fs_group: Some(DSE_USER_ID),
        ..Default::default()
    }
}

/// Generate the shared volumes for the pod.
fn generate_volumes() -> Vec<Volume> {
    [CONFIG_VOLUME, LOGS_VOLUME]
        .into_iter()
        .map(|name| Volume {
            name: name.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        })
        .collect()
}

fn volume_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        ..Default::default()
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn field_env_var(name: &str, field_path: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path,
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the init container that expands the rendered config.
///
/// The whole configuration travels in one environment variable, so it is
/// bounded by the platform's environment size limit.
fn generate_config_init_container(resource: &DseDatacenter, config_data: String) -> Container {
    Container {
        name: "dse-config-init".to_string(),
        image: Some(resource.config_builder_image()),
        volume_mounts: Some(vec![volume_mount(CONFIG_VOLUME, CONFIG_PATH)]),
        env: Some(vec![
            env_var("CONFIG_FILE_DATA", config_data),
            field_env_var("POD_IP", "status.podIP".to_string()),
            field_env_var("RACK_NAME", format!("metadata.labels['{}']", RACK_LABEL)),
            env_var("DSE_VERSION", resource.spec.dse_version.as_str()),
        ]),
        ..Default::default()
    }
}

/// Generate the main DSE container.
fn generate_dse_container(resource: &DseDatacenter) -> Result<Container> {
    let mut volume_mounts = vec![
        volume_mount(CONFIG_VOLUME, CONFIG_PATH),
        volume_mount(LOGS_VOLUME, LOGS_PATH),
    ];
    if resource.spec.storage_claim.is_some() {
        volume_mounts.push(volume_mount(DATA_VOLUME, DATA_PATH));
    }

    Ok(Container {
        name: DSE_CONTAINER_NAME.to_string(),
        image: Some(resource.server_image()?),
        resources: Some(generate_resource_requirements(resource)),
        env: Some(vec![
            env_var("DS_LICENSE", "accept"),
            env_var("DSE_AUTO_CONF_OFF", "all"),
            env_var("USE_MGMT_API", "true"),
            env_var("DSE_MGMT_EXPLICIT_START", "true"),
        ]),
        ports: Some(resource.container_ports()?),
        liveness_probe: Some(generate_liveness_probe()),
        readiness_probe: Some(generate_readiness_probe()),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    })
}

/// Generate the sidecar streaming the DSE system log to stdout.
fn generate_logger_container() -> Container {
    Container {
        name: "dse-system-logger".to_string(),
        image: Some(LOGGER_IMAGE.to_string()),
        args: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            format!("tail -n+1 -F {}/system.log", LOGS_PATH),
        ]),
        volume_mounts: Some(vec![volume_mount(LOGS_VOLUME, LOGS_PATH)]),
        ..Default::default()
    }
}

/// Generate resource requirements from the spec.
fn generate_resource_requirements(resource: &DseDatacenter) -> ResourceRequirements {
    let resources = &resource.spec.resources;
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };

    ResourceRequirements {
        limits: Some(quantities(&resources.limits.cpu, &resources.limits.memory)),
        requests: Some(quantities(
            &resources.requests.cpu,
            &resources.requests.memory,
        )),
        ..Default::default()
    }
}

fn http_probe(path: &str, initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            port: IntOrString::Int(MGMT_API_PORT),
            path: Some(path.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

/// Generate liveness probe.
fn generate_liveness_probe() -> Probe {
    http_probe(LIVENESS_PATH, 15, 15)
}

/// Generate readiness probe.
///
/// Starts later than liveness so slow startups do not flap.
fn generate_readiness_probe() -> Probe {
    http_probe(READINESS_PATH, 20, 10)
}

/// Generate PVC template for the data volume.
fn generate_pvc_template(claim: &StorageClaimSpec, rack: &LabelSet) -> PersistentVolumeClaim {
    if let Some(mode) = claim
        .access_mode
        .as_deref()
        .filter(|m| *m != SINGLE_WRITER_ACCESS_MODE)
    {
        warn!(
            requested = mode,
            used = SINGLE_WRITER_ACCESS_MODE,
            "Ignoring storage claim access mode"
        );
    }

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            labels: Some(rack.managed().into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![SINGLE_WRITER_ACCESS_MODE.to_string()]),
            storage_class_name: claim.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(claim.size.clone()),
                )])),
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
    use crate::controller::error::Error;
    use crate::crd::{DseDatacenterSpec, Rack};
    use crate::resources::config::JsonConfigRenderer;
    use crate::resources::labels::{
        CLUSTER_LABEL, DATACENTER_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    };
    use crate::resources::security::NoSecurity;

    fn test_resource(storage_claim: Option<StorageClaimSpec>) -> DseDatacenter {
        DseDatacenter {
            metadata: ObjectMeta {
                name: Some("dc1".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: DseDatacenterSpec {
                dse_cluster_name: "cluster1".to_string(),
                size: 3,
                racks: vec![Rack {
                    name: "rack1".to_string(),
                    zone: "zoneA".to_string(),
                }],
                storage_claim,
                ..Default::default()
            },
        }
    }

    fn ten_gi() -> Option<StorageClaimSpec> {
        Some(StorageClaimSpec {
            size: "10Gi".to_string(),
            access_mode: Some("ReadWriteOnce".to_string()),
            storage_class_name: Some("standard".to_string()),
        })
    }

    fn generate(resource: &DseDatacenter) -> StatefulSet {
        generate_statefulset(resource, "rack1", 3, &JsonConfigRenderer, &NoSecurity).unwrap()
    }

    fn pod_spec(sts: &StatefulSet) -> &PodSpec {
        sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    fn container<'a>(sts: &'a StatefulSet, name: &str) -> &'a Container {
        pod_spec(sts)
            .containers
            .iter()
            .find(|c| c.name == name)
            .unwrap()
    }

    #[test]
    fn test_generate_statefulset() {
        let sts = generate(&test_resource(ten_gi()));

        assert_eq!(sts.metadata.name, Some("cluster1-dc1-rack1-sts".to_string()));
        assert_eq!(sts.metadata.namespace, Some("default".to_string()));

        let spec = sts.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, Some("cluster1-dc1-service".to_string()));
        assert_eq!(spec.pod_management_policy, Some("Parallel".to_string()));
    }

    #[test]
    fn test_generate_statefulset_labels() {
        let sts = generate(&test_resource(None));

        let labels = sts.metadata.labels.clone().unwrap();
        assert_eq!(labels.get(RACK_LABEL), Some(&"rack1".to_string()));
        assert_eq!(
            labels.get(MANAGED_BY_LABEL),
            Some(&MANAGED_BY_VALUE.to_string())
        );

        let selector = sts.spec.as_ref().unwrap().selector.match_labels.clone().unwrap();
        assert_eq!(selector.len(), 3);
        assert_eq!(selector.get(CLUSTER_LABEL), Some(&"cluster1".to_string()));
        assert_eq!(selector.get(DATACENTER_LABEL), Some(&"dc1".to_string()));
        assert!(!selector.contains_key(MANAGED_BY_LABEL));
    }

    #[test]
    fn test_pod_labels_start_ready_to_start() {
        let sts = generate(&test_resource(None));
        let template = &sts.spec.as_ref().unwrap().template;
        let labels = template.metadata.as_ref().unwrap().labels.as_ref().unwrap();

        assert_eq!(
            labels.get(NODE_STATE_LABEL),
            Some(&NODE_STATE_READY_TO_START.to_string())
        );
        assert_eq!(labels.get(RACK_LABEL), Some(&"rack1".to_string()));
        assert_eq!(
            labels.get(MANAGED_BY_LABEL),
            Some(&MANAGED_BY_VALUE.to_string())
        );

        // Pod labels must satisfy the selector
        let selector = sts.spec.as_ref().unwrap().selector.match_labels.as_ref().unwrap();
        assert!(selector.iter().all(|(k, v)| labels.get(k) == Some(v)));
    }

    #[test]
    fn test_pvc_template() {
        let sts = generate(&test_resource(ten_gi()));
        let templates = sts.spec.as_ref().unwrap().volume_claim_templates.clone().unwrap();
        assert_eq!(templates.len(), 1);

        let pvc = &templates[0];
        assert_eq!(pvc.metadata.name, Some(DATA_VOLUME.to_string()));
        let spec = pvc.spec.as_ref().unwrap();
        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(spec.storage_class_name, Some("standard".to_string()));
        let requests = spec.resources.as_ref().unwrap().requests.as_ref().unwrap();
        assert_eq!(
            requests.get("storage"),
            Some(&Quantity("10Gi".to_string()))
        );

        let mounts = container(&sts, DSE_CONTAINER_NAME)
            .volume_mounts
            .as_ref()
            .unwrap();
        assert!(
            mounts
                .iter()
                .any(|m| m.name == DATA_VOLUME && m.mount_path == DATA_PATH)
        );
    }

    #[test]
    fn test_access_mode_forced_to_single_writer() {
        let claim = Some(StorageClaimSpec {
            access_mode: Some("ReadWriteMany".to_string()),
            ..Default::default()
        });
        let sts = generate(&test_resource(claim));
        let pvc = &sts.spec.as_ref().unwrap().volume_claim_templates.as_ref().unwrap()[0];
        assert_eq!(
            pvc.spec.as_ref().unwrap().access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
    }

    #[test]
    fn test_no_storage_claim_is_ephemeral() {
        let sts = generate(&test_resource(None));
        assert!(sts.spec.as_ref().unwrap().volume_claim_templates.is_none());

        let mounts = container(&sts, DSE_CONTAINER_NAME)
            .volume_mounts
            .as_ref()
            .unwrap();
        assert!(!mounts.iter().any(|m| m.name == DATA_VOLUME));
    }

    #[test]
    fn test_affinity_for_rack() {
        let sts = generate(&test_resource(None));
        let affinity = pod_spec(&sts).affinity.as_ref().unwrap();
        let node = affinity.node_affinity.as_ref().unwrap();
        let requirement = &node
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms[0]
            .match_expressions
            .as_ref()
            .unwrap()[0];
        assert_eq!(requirement.values, Some(vec!["zoneA".to_string()]));
        assert!(affinity.pod_anti_affinity.is_some());
    }

    #[test]
    fn test_unknown_rack_has_no_zone() {
        let resource = test_resource(None);
        let sts =
            generate_statefulset(&resource, "rack9", 1, &JsonConfigRenderer, &NoSecurity).unwrap();
        let affinity = pod_spec(&sts).affinity.as_ref().unwrap();
        assert!(affinity.node_affinity.is_none());
        assert_eq!(sts.metadata.name, Some("cluster1-dc1-rack9-sts".to_string()));
    }

    #[test]
    fn test_pod_security_context() {
        let sts = generate(&test_resource(None));
        let ctx = pod_spec(&sts).security_context.as_ref().unwrap();
        assert_eq!(ctx.run_as_user, Some(DSE_USER_ID));
        assert_eq!(ctx.run_as_group, Some(DSE_USER_ID));
        assert_eq!(ctx.fs_group, Some(DSE_USER_ID));
        assert_eq!(ctx.run_as_non_root, Some(true));
    }

    #[test]
    fn test_init_container_receives_config() {
        let resource = test_resource(None);
        let sts = generate(&resource);
        let init = &pod_spec(&sts).init_containers.as_ref().unwrap()[0];

        assert_eq!(init.name, "dse-config-init");
        let env = init.env.as_ref().unwrap();
        let config = env.iter().find(|e| e.name == "CONFIG_FILE_DATA").unwrap();
        assert_eq!(
            config.value,
            Some(JsonConfigRenderer.render(&resource).unwrap())
        );
        let rack = env.iter().find(|e| e.name == "RACK_NAME").unwrap();
        assert_eq!(
            rack.value_from
                .as_ref()
                .unwrap()
                .field_ref
                .as_ref()
                .unwrap()
                .field_path,
            "metadata.labels['com.datastax.dse.rack']"
        );
    }

    #[test]
    fn test_dse_container_probes() {
        let sts = generate(&test_resource(None));
        let dse = container(&sts, DSE_CONTAINER_NAME);

        let liveness = dse.liveness_probe.as_ref().unwrap();
        assert_eq!(liveness.initial_delay_seconds, Some(15));
        assert_eq!(liveness.period_seconds, Some(15));
        let live_get = liveness.http_get.as_ref().unwrap();
        assert_eq!(live_get.port, IntOrString::Int(8080));
        assert_eq!(live_get.path, Some(LIVENESS_PATH.to_string()));

        let readiness = dse.readiness_probe.as_ref().unwrap();
        assert_eq!(readiness.initial_delay_seconds, Some(20));
        assert_eq!(readiness.period_seconds, Some(10));
        let ready_get = readiness.http_get.as_ref().unwrap();
        assert_eq!(ready_get.port, IntOrString::Int(8080));
        assert_eq!(ready_get.path, Some(READINESS_PATH.to_string()));
    }

    #[test]
    fn test_dse_container_env() {
        let sts = generate(&test_resource(None));
        let env = container(&sts, DSE_CONTAINER_NAME).env.clone().unwrap();
        let value = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(value("DS_LICENSE"), Some("accept".to_string()));
        assert_eq!(value("DSE_AUTO_CONF_OFF"), Some("all".to_string()));
        assert_eq!(value("DSE_MGMT_EXPLICIT_START"), Some("true".to_string()));
    }

    #[test]
    fn test_logger_sidecar_has_no_probes() {
        let sts = generate(&test_resource(None));
        let logger = container(&sts, "dse-system-logger");
        assert!(logger.liveness_probe.is_none());
        assert!(logger.readiness_probe.is_none());
        assert_eq!(logger.image, Some(LOGGER_IMAGE.to_string()));
    }

    #[test]
    fn test_unsupported_version_fails() {
        let mut resource = test_resource(None);
        resource.spec.dse_version = "4.0.0".to_string();
        let result =
            generate_statefulset(&resource, "rack1", 3, &JsonConfigRenderer, &NoSecurity);
        assert!(matches!(result, Err(Error::UnsupportedVersion(_))));
    }

    struct FailingRenderer;

    impl ConfigRenderer for FailingRenderer {
        fn render(&self, _resource: &DseDatacenter) -> Result<String> {
            Err(Error::ConfigRender("boom".to_string()))
        }
    }

    #[test]
    fn test_render_failure_aborts() {
        let result =
            generate_statefulset(&test_resource(None), "rack1", 3, &FailingRenderer, &NoSecurity);
        assert!(matches!(result, Err(Error::ConfigRender(_))));
    }

    struct FailingDecorator;

    impl SecurityDecorator for FailingDecorator {
        fn decorate(&self, _resource: &DseDatacenter, _template: &mut PodTemplateSpec) -> Result<()> {
            Err(Error::Validation("no certs".to_string()))
        }
    }

    #[test]
    fn test_decoration_failure_propagates() {
        let result = generate_statefulset(
            &test_resource(None),
            "rack1",
            3,
            &JsonConfigRenderer,
            &FailingDecorator,
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_statefulset_is_deterministic() {
        let resource = test_resource(ten_gi());
        assert_eq!(generate(&resource), generate(&resource));
    }
}
