//! Application layer wiring report DTOs and pipeline services.

pub mod dtos;
pub mod services;

pub use dtos::{ConceptFailure, RunReport, RunSummary, TopicCoverage, UnitOutcome, UnitReport};
pub use services::PipelineService;
