//! Code analysis orchestration.
//!
//! ## Module Structure
//!
//! ```text
//! analysis/
//! ├── mod.rs           # Re-exports
//! ├── orchestrator.rs  # Cache lookup, per-type fan-out, caching of results
//! ├── aggregate.rs     # Per-type outcomes -> AnalysisResult
//! └── static_check.rs  # Local regex checks corroborating security findings
//! ```
//!
//! A request runs one task per analysis type. A failing type is reported in
//! `errors` and never fails the request as a whole.

mod aggregate;
mod orchestrator;
mod static_check;

#[cfg(test)]
pub(crate) mod __tests__;

pub use aggregate::{TypeOutcome, aggregate, overall_score};
pub use orchestrator::{AnalysisOrchestrator, AnalyzeError, TAG_ANALYSIS, file_tag, type_tag};
pub use static_check::{StaticChecker, corroborate, score_for};
