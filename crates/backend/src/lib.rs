//! Hook-triggered code analysis engine.
//!
//! Git lifecycle events run registered [`hooks::HookHandler`]s concurrently.
//! The built-in [`hooks::AnalysisHook`] sends changed files to an analysis
//! service through the [`analysis::AnalysisOrchestrator`], which caches
//! results in a two-tier [`cache::CacheService`].

pub mod analysis;
pub mod cache;
pub mod hooks;
pub mod metrics;

mod engine;
pub use engine::Engine;
