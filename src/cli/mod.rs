pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod output;
pub mod run;
pub mod runtime;
pub mod validate;

pub use run::{cmd_run, RunArgs};
pub use validate::{cmd_validate, ValidateArgs};
