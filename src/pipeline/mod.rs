// src/pipeline/mod.rs

//! Scheduling pipeline: classification, ordering, and execution of sources.
//!
//! - `classify`: split a technology's sources into isolated and linked sets
//! - `topo_sort`: order a linked set, detecting cycles
//! - `run_linked_group`: execute one ordered group with chained extraction
//! - `plan_jobs` / `register_jobs`: turn a validated config into recurring jobs

pub mod classify;
pub mod extract;
pub mod group;
pub mod plan;
pub mod process;
pub mod topo;

pub use classify::{Classification, classify};
pub use extract::extract;
pub use group::{FanOutEntry, ResultStore, StoredResult, run_linked_group};
pub use plan::{JobKind, JobPlan, plan_jobs, register_jobs};
pub use process::{SourceContext, run_isolated_source};
pub use topo::topo_sort;
