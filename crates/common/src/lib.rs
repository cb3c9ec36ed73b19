//! sitesweep Common Library
//!
//! Shared data model, configuration and run progress for the sitesweep
//! workspace.

pub mod config;
pub mod error;
pub mod progress;
pub mod types;

// Re-export commonly used types
pub use config::{CaptureConfig, FleetConfig, RemoteConfig, SiteConfig, Thresholds};
pub use error::{Error, Result};
pub use progress::{ProgressStore, RunMode, RunProgress};
pub use types::*;

/// sitesweep version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
