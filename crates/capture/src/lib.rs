//! sitesweep page capture
//!
//! Drives a page renderer through the snapshot protocol and scores the
//! drift between the `before` and `after` artifacts of a page.

pub mod compare;
pub mod error;
pub mod playwright;
pub mod renderer;
pub mod snapshot;

pub use compare::{compare, compare_page};
pub use error::{CaptureError, CaptureResult, CompareError};
pub use playwright::{PlaywrightConfig, PlaywrightRenderer};
pub use renderer::{PageRenderer, PageSession};
pub use snapshot::SnapshotCapture;
