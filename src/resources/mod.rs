//! Resource generation module.
//!
//! Contains utilities for generating Kubernetes resources owned by DseDatacenter.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | StatefulSet | One per rack, stable pod identity for DSE nodes |
//! | Client Service | CQL and management API access |
//! | Seed Service | Seed discovery across the cluster (publishNotReadyAddresses) |
//! | All Pods Service | Per-pod DNS for every pod (publishNotReadyAddresses) |
//! | PodDisruptionBudget | One voluntary disruption at a time |

pub mod affinity;
pub mod common;
pub mod config;
pub mod labels;
pub mod pdb;
pub mod security;
pub mod services;
pub mod statefulset;

// Re-export commonly used items
pub use common::owner_reference;
pub use config::{ConfigRenderer, JsonConfigRenderer};
pub use labels::LabelSet;
pub use security::{ManagementApiSecurity, NoSecurity, SecurityDecorator};
