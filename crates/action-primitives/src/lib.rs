//! Action primitives for tabflow
//!
//! This crate implements the execute half of every built-in step kind:
//! - click, click-new-page, text, input+enter, sleep, screenshot, wait-dom-stable
//! - element collections with filters and conditional sibling checks
//! - frame switching and tab lifecycle
//! - built-in waiting (load, DOM settle) shared with the race resolver

pub mod errors;
pub mod filters;
mod locator;
mod primitives;
pub mod types;
mod waiting;

pub use errors::*;
pub use filters::ElementFilter;
pub use locator::*;
pub use primitives::*;
pub use types::*;
pub use waiting::*;
