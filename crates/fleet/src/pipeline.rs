//! Site pipeline
//!
//! One site moves through
//! `BeforeCapture -> [Backup] -> Update -> CacheClear -> AfterCapture ->
//! Compare -> Record -> Done`. Backup only runs when requested; a dry run
//! jumps from capture (or backup) straight to `Record`. Captures fan out
//! over the site's pages and the stage advances once all of them finished.

use futures::future::{join_all, try_join_all};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use sitesweep_capture::{compare_page, SnapshotCapture};
use sitesweep_common::{ComparisonDescriptor, ComparisonResult, Page, Phase, Site};
use sitesweep_remote::{backup, clear_cache, update, CachePurger, RemoteExecutor};

use crate::error::{SiteError, SiteResult};
use crate::report::{write_report, REPORT_FILE};

/// Stages of one site's pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStage {
    BeforeCapture,
    Backup,
    Update,
    CacheClear,
    AfterCapture,
    Compare,
    Record,
    Done,
}

impl SiteStage {
    /// Stage that follows `self` under `options`; `None` after `Done`
    pub fn next(self, options: &RunOptions) -> Option<SiteStage> {
        use SiteStage::*;

        let after_backup = if options.dry_run { Record } else { Update };
        Some(match self {
            BeforeCapture if options.backup => Backup,
            BeforeCapture | Backup => after_backup,
            Update => CacheClear,
            CacheClear => AfterCapture,
            AfterCapture => Compare,
            Compare => Record,
            Record => Done,
            Done => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStage::BeforeCapture => "before capture",
            SiteStage::Backup => "backup",
            SiteStage::Update => "update",
            SiteStage::CacheClear => "cache clear",
            SiteStage::AfterCapture => "after capture",
            SiteStage::Compare => "compare",
            SiteStage::Record => "record",
            SiteStage::Done => "done",
        }
    }
}

impl fmt::Display for SiteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags that shape every site's pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Capture `before` only; no update, cache clear or comparison
    pub dry_run: bool,
    pub backup: bool,
    /// Leave the backup staging folder on the remote host
    pub keep_backup: bool,
}

/// Collaborators and settings shared by all site pipelines of a run
#[derive(Clone)]
pub struct PipelineContext {
    pub capture: SnapshotCapture,
    pub executor: Arc<dyn RemoteExecutor>,
    pub purger: Arc<dyn CachePurger>,
    pub descriptors: Vec<ComparisonDescriptor>,
    pub options: RunOptions,
    /// Caps renderer sessions open at once across all sites
    pub page_permits: Arc<Semaphore>,
}

/// What a finished pipeline produced
#[derive(Debug, Clone)]
pub struct SiteOutcome {
    pub key: String,
    pub results: Vec<ComparisonResult>,
    /// Stages visited, in order
    pub stages: Vec<SiteStage>,
    /// `None` for dry runs
    pub report: Option<PathBuf>,
}

impl SiteOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.results.iter().filter(|r| !r.pass)
    }
}

/// Runs one site through its stages
pub struct SitePipeline<'a> {
    ctx: &'a PipelineContext,
    site: &'a Site,
    site_folder: PathBuf,
    pages: Vec<Page>,
    results: Vec<ComparisonResult>,
    report: Option<PathBuf>,
}

impl<'a> SitePipeline<'a> {
    pub fn new(ctx: &'a PipelineContext, site: &'a Site, run_folder: &Path) -> Self {
        let site_folder = run_folder.join(&site.key);
        let pages = site
            .pages
            .iter()
            .map(|url| Page::new(&site_folder, url.as_str()))
            .collect();

        Self {
            ctx,
            site,
            site_folder,
            pages,
            results: Vec::new(),
            report: None,
        }
    }

    pub fn site_folder(&self) -> &Path {
        &self.site_folder
    }

    /// Drive the site to `Done` or to its first fatal error
    pub async fn run(mut self) -> SiteResult<SiteOutcome> {
        tokio::fs::create_dir_all(&self.site_folder)
            .await
            .map_err(|source| SiteError::Io {
                stage: SiteStage::BeforeCapture,
                source,
            })?;

        let mut stages = Vec::new();
        let mut stage = SiteStage::BeforeCapture;
        loop {
            info!("Stage: {}", stage);
            stages.push(stage);
            self.step(stage).await?;

            match stage.next(&self.ctx.options) {
                Some(next) => stage = next,
                None => break,
            }
        }

        Ok(SiteOutcome {
            key: self.site.key.clone(),
            results: self.results,
            stages,
            report: self.report,
        })
    }

    async fn step(&mut self, stage: SiteStage) -> SiteResult<()> {
        let remote = |source| SiteError::Remote { stage, source };
        let credentials = &self.site.credentials;

        match stage {
            SiteStage::BeforeCapture => self.capture_all(stage, Phase::Before).await,
            SiteStage::Backup => {
                let archive = backup(
                    self.ctx.executor.as_ref(),
                    credentials,
                    &self.site_folder,
                    self.ctx.options.keep_backup,
                )
                .await
                .map_err(remote)?;
                info!("Backup stored at {}", archive.display());
                Ok(())
            }
            SiteStage::Update => {
                update(self.ctx.executor.as_ref(), credentials, &self.site_folder)
                    .await
                    .map_err(remote)?;
                Ok(())
            }
            SiteStage::CacheClear => {
                match clear_cache(
                    self.ctx.purger.as_ref(),
                    self.ctx.executor.as_ref(),
                    credentials,
                    &self.site.domain,
                )
                .await
                {
                    Ok(flushed) if flushed.is_empty() => info!("No active cache plugins"),
                    Ok(flushed) => info!("Flushed cache plugins: {}", flushed.join(", ")),
                    Err(e) => warn!("Cache clear for {} failed: {}", self.site.domain, e),
                }
                Ok(())
            }
            SiteStage::AfterCapture => self.capture_all(stage, Phase::After).await,
            SiteStage::Compare => {
                self.results = self.compare_all().await;
                Ok(())
            }
            SiteStage::Record => self.record(stage).await,
            SiteStage::Done => Ok(()),
        }
    }

    /// Capture every page concurrently; the first failure drops the rest
    async fn capture_all(&self, stage: SiteStage, phase: Phase) -> SiteResult<()> {
        try_join_all(self.pages.iter().map(|page| async move {
            let _permit = self
                .ctx
                .page_permits
                .acquire()
                .await
                .map_err(|e| SiteError::Task(format!("Failed to acquire page permit: {}", e)))?;

            self.ctx
                .capture
                .capture(page, phase)
                .await
                .map_err(|source| SiteError::Capture {
                    stage,
                    url: page.url.clone(),
                    source,
                })
        }))
        .await?;
        Ok(())
    }

    /// Score every (page, comparator) pair. A comparator that cannot score
    /// a page yields an undefined result and the rest carry on.
    async fn compare_all(&self) -> Vec<ComparisonResult> {
        let site_key = self.site.key.as_str();
        let pairs = self
            .pages
            .iter()
            .flat_map(|page| self.ctx.descriptors.iter().map(move |d| (page, d)));

        join_all(pairs.map(|(page, descriptor)| async move {
            let result = match compare_page(page, descriptor.kind).await {
                Ok(raw) => ComparisonResult::scored(site_key, &page.url, descriptor, raw),
                Err(e) => {
                    warn!(
                        "{} comparison for {} could not be scored: {}",
                        descriptor.kind, page.url, e
                    );
                    ComparisonResult::undefined(site_key, &page.url, descriptor, e)
                }
            };

            if let Some(score) = result.score.filter(|_| !result.pass) {
                warn!(
                    "ALERT: {} comparison score {} for {} {} is below the threshold of {}%",
                    descriptor.kind, score, self.site.domain, page.url, descriptor.threshold
                );
            }
            result
        }))
        .await
    }

    async fn record(&mut self, stage: SiteStage) -> SiteResult<()> {
        if self.ctx.options.dry_run {
            info!("Dry run: nothing to record for {}", self.site.domain);
            return Ok(());
        }

        let path = self.site_folder.join(REPORT_FILE);
        let results = self.results.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_report(&target, &results))
            .await
            .map_err(|e| SiteError::Task(e.to_string()))?
            .map_err(|source| SiteError::Report { stage, source })?;

        info!("Wrote {} result(s) to {}", self.results.len(), path.display());
        self.report = Some(path);
        Ok(())
    }
}
