//! Step orchestration for tabflow
//!
//! Runs a tree of named steps against one page and records a result tree:
//! - siblings run in order and the first failure stops the group
//! - a sequence-valued step fans its children out once per item
//! - every step kind implements execute and continue
//! - plans load from JSON or YAML documents

pub mod behavior;
pub mod errors;
pub mod executor;
pub mod loader;
pub mod types;

pub use errors::FlowError;
pub use executor::{check_plan, lint_plan, FlowEngine, FlowExecutor};
pub use loader::{DurationValue, PlanDocument, PlanLoader, StepConstructor, StepNode, StepRegistry};
pub use types::*;
