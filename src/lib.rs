//! DGA domain triage: classify a domain, explain the verdict with additive
//! per-feature contributions, and turn positive findings into an
//! incident-response playbook.

pub mod detection;
pub mod prescription;
pub mod pipeline;
pub mod config;
pub mod report;

pub use pipeline::{Analysis, Pipeline};
