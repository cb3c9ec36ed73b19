//! Error types for site pipelines and the fleet run

use thiserror::Error;

use sitesweep_capture::CaptureError;
use sitesweep_remote::RemoteError;

use crate::pipeline::SiteStage;

/// A fatal error that aborts one site's pipeline
#[derive(Error, Debug)]
pub enum SiteError {
    #[error("{stage}: capture of {url} failed: {source}")]
    Capture {
        stage: SiteStage,
        url: String,
        #[source]
        source: CaptureError,
    },

    #[error("{stage}: {source}")]
    Remote {
        stage: SiteStage,
        #[source]
        source: RemoteError,
    },

    #[error("{stage}: cannot write report: {source}")]
    Report {
        stage: SiteStage,
        #[source]
        source: csv::Error,
    },

    #[error("{stage}: IO error: {source}")]
    Io {
        stage: SiteStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Site could not be recorded as completed: {0}")]
    Progress(#[from] sitesweep_common::Error),

    #[error("Site task failed: {0}")]
    Task(String),
}

impl SiteError {
    /// Stage the pipeline was in when it aborted
    pub fn stage(&self) -> Option<SiteStage> {
        match self {
            SiteError::Capture { stage, .. }
            | SiteError::Remote { stage, .. }
            | SiteError::Report { stage, .. }
            | SiteError::Io { stage, .. } => Some(*stage),
            SiteError::Progress(_) | SiteError::Task(_) => None,
        }
    }
}

pub type SiteResult<T> = Result<T, SiteError>;
