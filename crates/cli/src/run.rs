//! The fleet run behind the `sitesweep` command

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use sitesweep_capture::{PlaywrightConfig, PlaywrightRenderer, SnapshotCapture};
use sitesweep_common::{FleetConfig, ProgressStore};
use sitesweep_fleet::{Fleet, PipelineContext, RunOptions};
use sitesweep_remote::{HttpCachePurger, OpenSshExecutor, SiteValidator};

use crate::output::{print_error, print_info, print_summary};
use crate::Cli;

pub const EXIT_OK: i32 = 0;
/// Configuration or site validation failed; nothing was touched
pub const EXIT_INVALID: i32 = 1;
/// At least one site failed; the progress file is kept for resume
pub const EXIT_SITE_FAILED: i32 = 2;

pub fn run_options(cli: &Cli) -> RunOptions {
    RunOptions {
        dry_run: cli.dry_run,
        backup: cli.backup || cli.keep_backup,
        keep_backup: cli.keep_backup,
    }
}

/// Validate, run the fleet and print the summary. Returns the exit status.
pub async fn execute(cli: &Cli) -> anyhow::Result<i32> {
    let config = match FleetConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("Cannot load {}: {}", cli.config.display(), e));
            return Ok(EXIT_INVALID);
        }
    };

    let sites = config.sites();

    let executor = Arc::new(OpenSshExecutor::from_config(&config.remote));

    info!("Validating {} site(s)", sites.len());
    let validator = SiteValidator::new(executor.as_ref(), config.remote.connect_timeout())
        .context("Failed to build HTTP client")?;
    if let Err(e) = validator.validate_all(&sites).await {
        print_error(&e.to_string());
        return Ok(EXIT_INVALID);
    }

    let options = run_options(cli);
    if options.dry_run {
        print_info("Dry run: sites are captured but not updated");
    }

    let store = ProgressStore::open(&config.progress_file, &config.output, cli.fresh, options.dry_run)
        .await
        .with_context(|| format!("Failed to open {}", config.progress_file.display()))?;

    let renderer = PlaywrightRenderer::new(PlaywrightConfig::from(&config.capture));
    let purger = HttpCachePurger::new(config.remote.purge_timeout())
        .context("Failed to build cache purge client")?;

    let ctx = PipelineContext {
        capture: SnapshotCapture::new(Arc::new(renderer), config.capture.settle_delay()),
        executor,
        purger: Arc::new(purger),
        descriptors: config.thresholds.descriptors(),
        options,
        page_permits: Arc::new(Semaphore::new(config.capture.max_concurrent_pages.max(1))),
    };

    let fleet = Fleet::new(ctx, Arc::new(store));
    let report = fleet.run(&sites).await.context("Failed to finalize run progress")?;
    info!("Results are in {}", fleet.store().output_folder().display());

    print_summary(&report, cli.format);

    Ok(if report.is_success() {
        EXIT_OK
    } else {
        EXIT_SITE_FAILED
    })
}
