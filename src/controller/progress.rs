//! Operator progress label.
//!
//! The datacenter object carries a label recording whether the operator is
//! still rolling out changes (`Updating`) or has converged (`Ready`).
//! Transitions only write when the stored value differs, so repeated
//! reconciles of a converged datacenter never touch the API server.

use std::fmt;
use std::str::FromStr;

use kube::api::PostParams;
use kube::{Api, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::controller::error::{Error, Result};
use crate::crd::DseDatacenter;
use crate::resources::labels::PROGRESS_LABEL;

/// Rollout progress of a datacenter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgressState {
    /// Changes are being applied.
    Updating,
    /// Every synthesized resource matches the spec.
    Ready,
}

impl ProgressState {
    /// Label value for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressState::Updating => "Updating",
            ProgressState::Ready => "Ready",
        }
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Updating" => Ok(ProgressState::Updating),
            "Ready" => Ok(ProgressState::Ready),
            other => Err(Error::Validation(format!(
                "unknown progress state: {}",
                other
            ))),
        }
    }
}

/// Decide the label value to store and whether a write is needed.
///
/// A write is needed whenever the current value differs from the desired
/// one, including when the label is absent or holds an unknown value.
pub fn plan_transition(current: Option<&str>, desired: ProgressState) -> (String, bool) {
    let value = desired.as_str();
    (value.to_string(), current != Some(value))
}

/// Persists a whole DseDatacenter object.
pub trait PersistenceClient {
    /// Write the object and return the stored version.
    ///
    /// A stale `resourceVersion` fails with [`Error::Conflict`].
    fn update(
        &self,
        resource: &DseDatacenter,
    ) -> impl std::future::Future<Output = Result<DseDatacenter>> + Send;
}

impl<P: PersistenceClient + Sync> PersistenceClient for &P {
    async fn update(&self, resource: &DseDatacenter) -> Result<DseDatacenter> {
        (**self).update(resource).await
    }
}

/// Persists through the Kubernetes API with optimistic concurrency.
#[derive(Clone)]
pub struct KubePersistenceClient {
    api: Api<DseDatacenter>,
}

impl KubePersistenceClient {
    /// Create a client over a namespaced DseDatacenter API.
    pub fn new(api: Api<DseDatacenter>) -> Self {
        Self { api }
    }
}

impl PersistenceClient for KubePersistenceClient {
    async fn update(&self, resource: &DseDatacenter) -> Result<DseDatacenter> {
        let name = resource.name_any();
        self.api
            .replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| map_write_error(e, name))
    }
}

/// Classify a failed write. A 409 means the stored object moved on.
fn map_write_error(err: kube::Error, name: String) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 409 => Error::Conflict(name),
        other => Error::Kube(other),
    }
}

/// Moves a datacenter's progress label between states.
pub struct ProgressLabelTransitioner<P> {
    client: P,
}

impl<P: PersistenceClient> ProgressLabelTransitioner<P> {
    /// Create a transitioner writing through `client`.
    pub fn new(client: P) -> Self {
        Self { client }
    }

    /// Set the progress label to `desired`.
    ///
    /// Returns `false` without writing when the label already holds the
    /// value. Otherwise writes a copy carrying the new label and, on
    /// success, replaces `resource` with the stored object. On failure
    /// `resource` is left as it was.
    #[instrument(skip(self, resource), fields(datacenter = %resource.name_any()))]
    pub async fn transition(
        &self,
        resource: &mut DseDatacenter,
        desired: ProgressState,
    ) -> Result<bool> {
        let current = resource.labels().get(PROGRESS_LABEL).map(String::as_str);
        let (value, needs_write) = plan_transition(current, desired);
        if !needs_write {
            debug!(progress = %value, "Progress label unchanged, skipping write");
            return Ok(false);
        }

        let mut updated = resource.clone();
        updated
            .labels_mut()
            .insert(PROGRESS_LABEL.to_string(), value.clone());

        match self.client.update(&updated).await {
            Ok(stored) => {
                info!(progress = %value, "Updated progress label");
                *resource = stored;
                Ok(true)
            }
            Err(e) => {
                warn!(progress = %value, error = %e, "Failed to update progress label");
                Err(Error::ProgressLabel {
                    value,
                    source: Box::new(e),
                })
            }
        }
    }
}
