//! Controller-side pieces of the dse-operator.
//!
//! Holds the crate error type and the progress label transitioner, the only
//! part of the crate that talks to the API server.

pub mod error;
pub mod progress;
