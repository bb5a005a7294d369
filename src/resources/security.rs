//! Management API transport security.
//!
//! A [`SecurityDecorator`] runs on the fully assembled pod template and adds
//! TLS material for the management API. Decoration mutates the template in
//! place and is not transactional: on error, whatever it already changed
//! stays changed and the template must be discarded.

use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};

use crate::controller::error::{Error, Result};
use crate::crd::DseDatacenter;

/// Name of the DSE server container
pub const DSE_CONTAINER_NAME: &str = "dse";

/// Volume holding the management API server certificate
const SERVER_CERTS_VOLUME: &str = "mgmt-api-server-certs";
/// Mount path of the management API server certificate
const SERVER_CERTS_PATH: &str = "/management-api-certs";

/// Adds transport security to a pod template.
pub trait SecurityDecorator {
    /// Mutate the pod template in place.
    fn decorate(&self, resource: &DseDatacenter, template: &mut PodTemplateSpec) -> Result<()>;
}

/// Leaves the template untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSecurity;

impl SecurityDecorator for NoSecurity {
    fn decorate(&self, _resource: &DseDatacenter, _template: &mut PodTemplateSpec) -> Result<()> {
        Ok(())
    }
}

/// Mounts manually provisioned TLS Secrets for the management API.
///
/// Does nothing unless `managementApiAuth.manual` is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManagementApiSecurity;

impl SecurityDecorator for ManagementApiSecurity {
    fn decorate(&self, resource: &DseDatacenter, template: &mut PodTemplateSpec) -> Result<()> {
        let Some(manual) = resource
            .spec
            .management_api_auth
            .as_ref()
            .and_then(|auth| auth.manual.as_ref())
        else {
            return Ok(());
        };

        if manual.server_secret_name.is_empty() {
            return Err(Error::Validation(
                "managementApiAuth.manual.serverSecretName must not be empty".to_string(),
            ));
        }
        if manual.client_secret_name.is_empty() {
            return Err(Error::Validation(
                "managementApiAuth.manual.clientSecretName must not be empty".to_string(),
            ));
        }

        let pod = template
            .spec
            .as_mut()
            .ok_or_else(|| Error::MissingField("pod template spec".to_string()))?;

        pod.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: SERVER_CERTS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(manual.server_secret_name.clone()),
                default_mode: Some(0o400),
                ..Default::default()
            }),
            ..Default::default()
        });

        let container = pod
            .containers
            .iter_mut()
            .find(|c| c.name == DSE_CONTAINER_NAME)
            .ok_or_else(|| Error::MissingField(format!("container {}", DSE_CONTAINER_NAME)))?;

        add_server_tls(container);
        Ok(())
    }
}

/// Point the management API at the mounted certificate and probe over HTTPS.
fn add_server_tls(container: &mut Container) {
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: SERVER_CERTS_VOLUME.to_string(),
            mount_path: SERVER_CERTS_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });

    let env = container.env.get_or_insert_with(Vec::new);
    for (name, file) in [
        ("MGMT_API_TLS_CA_CERT_FILE", "ca.crt"),
        ("MGMT_API_TLS_CERT_FILE", "tls.crt"),
        ("MGMT_API_TLS_KEY_FILE", "tls.key"),
    ] {
        env.push(EnvVar {
            name: name.to_string(),
            value: Some(format!("{}/{}", SERVER_CERTS_PATH, file)),
            ..Default::default()
        });
    }

    for probe in [
        container.liveness_probe.as_mut(),
        container.readiness_probe.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(http_get) = probe.http_get.as_mut() {
            http_get.scheme = Some("HTTPS".to_string());
        }
    }
}
