//! dse-operator library crate
//!
//! Synthesizes the Kubernetes objects backing a DSE datacenter (services,
//! per-rack StatefulSets, a PodDisruptionBudget) from a `DseDatacenter`
//! resource, and tracks the operator's rollout progress on that resource.
//!
//! Applying the synthesized objects is left to the embedding controller.

pub mod controller;
pub mod crd;
pub mod resources;

pub use controller::error::{Error, Result};
pub use controller::progress::{
    KubePersistenceClient, PersistenceClient, ProgressLabelTransitioner, ProgressState,
    plan_transition,
};
pub use crd::{DseDatacenter, DseDatacenterSpec};
