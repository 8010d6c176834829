//! opcage host library.
//!
//! Wires the instruction validator, the rewriter pipeline, the runtime
//! guard, and the execution engine into a sandbox host, plus the policy
//! document loader and the resolved-policy report. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod config;
pub mod engine;
pub mod guard;
pub mod host;
pub mod report;
pub mod rewrite;
pub mod validate;
