//! Snapshot capture: one page, one phase, three artifacts

use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use sitesweep_common::{ComparisonKind, Page, Phase};

use crate::error::CaptureResult;
use crate::renderer::{PageRenderer, PageSession};

/// Drives a renderer through the capture protocol
#[derive(Clone)]
pub struct SnapshotCapture {
    renderer: Arc<dyn PageRenderer>,
    settle_delay: Duration,
}

impl SnapshotCapture {
    pub fn new(renderer: Arc<dyn PageRenderer>, settle_delay: Duration) -> Self {
        Self {
            renderer,
            settle_delay,
        }
    }

    /// Capture screenshot, HTML and console log of `page` for `phase`.
    ///
    /// Writes exactly the three artifacts of this phase and leaves the other
    /// phase's files alone. Renderer errors are returned as-is; nothing is
    /// retried here.
    pub async fn capture(&self, page: &Page, phase: Phase) -> CaptureResult<()> {
        debug!("Capturing {} ({})", page.url, phase);
        fs::create_dir_all(&page.folder).await?;

        let mut session = self.renderer.open(&page.url).await?;
        let outcome = self.capture_with(session.as_mut(), page, phase).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close renderer for {}: {}", page.url, e);
        }

        outcome
    }

    async fn capture_with(
        &self,
        session: &mut dyn PageSession,
        page: &Page,
        phase: Phase,
    ) -> CaptureResult<()> {
        session.wait_until_loaded().await?;
        session.scroll_to_end().await?;
        tokio::time::sleep(self.settle_delay).await;

        let screenshot = session.screenshot().await?;
        fs::write(page.artifact_path(ComparisonKind::Visual, phase), screenshot).await?;

        let html = session.html().await?;
        fs::write(page.artifact_path(ComparisonKind::Html, phase), html).await?;

        let console = session.console_log().await?.join("\n");
        fs::write(page.artifact_path(ComparisonKind::Console, phase), console).await?;

        Ok(())
    }
}
