pub(crate) mod helpers;
mod orchestrator_flow;
