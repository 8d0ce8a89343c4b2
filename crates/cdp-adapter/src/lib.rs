//! Page driver seam for tabflow.
//!
//! The step engine never talks to a browser directly. Everything it needs from a live
//! page (locating elements, clicking, typing, reloading, waiting for the DOM to settle)
//! goes through the [`PageDriver`] trait defined here. Two implementations ship with the
//! crate:
//!
//! - [`ChromiumDriver`]: drives Chromium over the DevTools Protocol via chromiumoxide.
//! - `stub::StubDriver` (feature `stub`): a scripted in-memory page used by tests.

pub mod config;
pub mod error;

mod chromium;
mod driver;
mod scripts;

#[cfg(any(test, feature = "stub"))]
pub mod stub;

pub use chromium::ChromiumDriver;
pub use config::CdpConfig;
pub use driver::{PageDriver, Scope, ScreenshotTarget, POLL_INTERVAL};
pub use error::{DriverError, DriverErrorKind};

pub use tabflow_core_types::{ElementHandle, ElementId, PageHandle, PageId};
