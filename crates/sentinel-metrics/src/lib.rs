// crates/sentinel-metrics/src/lib.rs
// ============================================================================
// Module: Sentinel Metrics Pipeline Library
// Description: Public API surface for the Sentinel metrics pipeline crate.
// Purpose: Expose the seven staged reducers and the pipeline orchestrator
// that fans them out per partition key.
// Dependencies: sentinel-core, every module in this crate
// ============================================================================

//! ## Overview
//! This crate implements the metrics pipeline (`spec.md` §4.9) as seven pure
//! `stage(in) -> out` reducers — [`operational`], [`project`],
//! [`department`], [`clevel`], [`delta`], [`finops`], [`kubernetes`] — plus
//! [`pipeline::run_pipeline`], which fans each stage out per partition key
//! on a bounded `tokio` task set with a barrier between stages.

pub mod clevel;
pub mod delta;
pub mod department;
pub mod finops;
pub mod kubernetes;
pub mod operational;
pub mod pipeline;
pub mod project;

pub use clevel::CLevelReport;
pub use clevel::compute_clevel;
pub use delta::DeltaReport;
pub use delta::compute_delta;
pub use delta::to_metric_record;
pub use department::DepartmentReport;
pub use department::RankedProject;
pub use department::compute_department;
pub use finops::compute_finops;
pub use kubernetes::compute_kubernetes;
pub use operational::MitreAttribution;
pub use operational::OperationalReport;
pub use operational::Overview;
pub use operational::ResourceTypeAggregate;
pub use operational::RuleAggregate;
pub use operational::StandardCoverage;
pub use operational::compute_operational;
pub use pipeline::PipelineInput;
pub use pipeline::PipelineOutput;
pub use pipeline::TenantInput;
pub use pipeline::run_pipeline;
pub use project::ProjectReport;
pub use project::compute_project;
