//! Custom Resource Definitions (CRDs) for dse-operator.
//!
//! - `DseDatacenter`: one rack-aware DSE datacenter within a named cluster

mod dse_datacenter;

pub use dse_datacenter::*;
