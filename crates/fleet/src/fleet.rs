//! Fleet orchestrator
//!
//! Runs one pipeline per site that the progress store has not seen
//! complete. Sites run concurrently and in isolation: a site that fails
//! is reported and left for the next run, the others carry on.

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use sitesweep_common::{ProgressStore, Site};

use crate::error::{SiteError, SiteResult};
use crate::pipeline::{PipelineContext, SiteOutcome, SitePipeline};

/// A site whose pipeline aborted
#[derive(Debug)]
pub struct SiteFailure {
    pub key: String,
    pub error: SiteError,
}

/// Everything a fleet run produced
#[derive(Debug, Default)]
pub struct FleetReport {
    /// Sites completed by this run, in configuration order
    pub completed: Vec<SiteOutcome>,
    /// Sites skipped because an earlier run completed them
    pub already_completed: Vec<String>,
    pub failed: Vec<SiteFailure>,
    /// Whether the progress record was deleted
    pub progress_removed: bool,
}

impl FleetReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Comparison results of every site completed by this run
    pub fn results(&self) -> impl Iterator<Item = &sitesweep_common::ComparisonResult> {
        self.completed.iter().flat_map(|o| o.results.iter())
    }
}

pub struct Fleet {
    ctx: PipelineContext,
    store: Arc<ProgressStore>,
}

impl Fleet {
    pub fn new(ctx: PipelineContext, store: Arc<ProgressStore>) -> Self {
        Self { ctx, store }
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Process every remaining site of `sites` and finalize the run.
    ///
    /// Only an error of the progress record itself while finalizing is
    /// returned; site failures are collected in the report.
    pub async fn run(&self, sites: &[Site]) -> sitesweep_common::Result<FleetReport> {
        let completed = self.store.completed().await;
        let stale: Vec<&str> = completed
            .iter()
            .filter(|key| !sites.iter().any(|s| &s.key == *key))
            .map(String::as_str)
            .collect();
        if !stale.is_empty() {
            warn!(
                "Progress record lists sites that are not configured: {}",
                stale.join(", ")
            );
        }

        let mut report = FleetReport::default();
        let mut handles = Vec::new();

        for site in sites {
            if completed.contains(&site.key) {
                report.already_completed.push(site.key.clone());
                continue;
            }

            let ctx = self.ctx.clone();
            let store = self.store.clone();
            let site = site.clone();
            let span = info_span!("site", key = %site.key);
            let key = site.key.clone();
            let handle = tokio::spawn(
                async move { run_site(&ctx, &store, &site).await }.instrument(span),
            );
            handles.push((key, handle));
        }

        info!(
            "Processing {} site(s), {} already completed",
            handles.len(),
            report.already_completed.len()
        );

        for (key, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SiteError::Task(e.to_string())),
            };

            match result {
                Ok(outcome) => report.completed.push(outcome),
                Err(error) => {
                    match error.stage() {
                        Some(stage) => error!("Site {} aborted during {}: {}", key, stage, error),
                        None => error!("Site {} failed: {}", key, error),
                    }
                    report.failed.push(SiteFailure { key, error });
                }
            }
        }

        let keys: Vec<&str> = sites.iter().map(|s| s.key.as_str()).collect();
        report.progress_removed = self.store.finish(&keys).await?;

        if report.is_success() {
            info!("Finished processing all sites");
        } else {
            warn!("{} site(s) failed and can be resumed", report.failed.len());
        }
        Ok(report)
    }
}

/// Run one site and record it as completed. The site only counts as
/// finished once the progress record is on disk.
async fn run_site(
    ctx: &PipelineContext,
    store: &ProgressStore,
    site: &Site,
) -> SiteResult<SiteOutcome> {
    info!("Processing {}", site.domain);
    let run_folder: &Path = store.output_folder();

    let outcome = SitePipeline::new(ctx, site, run_folder).run().await?;
    store.mark_completed(&site.key).await?;

    info!("Done processing {}", site.domain);
    Ok(outcome)
}
