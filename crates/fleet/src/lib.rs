//! sitesweep fleet runs
//!
//! The per-site regression pipeline, its CSV report and the orchestrator
//! that fans pipelines out over a fleet with resumable progress.

pub mod error;
pub mod fleet;
pub mod pipeline;
pub mod report;

pub use error::{SiteError, SiteResult};
pub use fleet::{Fleet, FleetReport, SiteFailure};
pub use pipeline::{PipelineContext, RunOptions, SiteOutcome, SitePipeline, SiteStage};
pub use report::{write_report, REPORT_FILE};
