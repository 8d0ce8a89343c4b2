//! Race resolver for tabflow
//!
//! Waits for whichever of several named candidate elements shows up first:
//! - success candidates end the race with their element
//! - failure candidates spend the retry budget and trigger a reload
//! - a deadline without any candidate reloads the page while retries remain
//! - every attempt after a reload gets a widened timeout

pub mod errors;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use types::*;
