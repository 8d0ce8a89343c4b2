//! tabflow command line
//!
//! Exposes modules for integration testing

pub mod cli;
pub mod config;

pub use config::Config;
