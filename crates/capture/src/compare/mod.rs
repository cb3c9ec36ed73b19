//! Before/after comparators
//!
//! Each comparator turns the two artifacts of one signal into a 0-100
//! similarity. A [`CompareError`] means the score is undefined for that
//! page and signal; it never affects the other comparators.

pub mod console;
pub mod html;
pub mod visual;

use std::path::Path;
use tokio::fs;

use sitesweep_common::{ComparisonKind, Page, Phase};

use crate::error::CompareError;

/// Score two artifacts of the same signal
pub fn compare(kind: ComparisonKind, before: &[u8], after: &[u8]) -> Result<f64, CompareError> {
    match kind {
        ComparisonKind::Visual => visual::compare(before, after),
        ComparisonKind::Html => html::compare(
            &String::from_utf8_lossy(before),
            &String::from_utf8_lossy(after),
        ),
        ComparisonKind::Console => console::compare(
            &String::from_utf8_lossy(before),
            &String::from_utf8_lossy(after),
        ),
    }
}

/// Read both phases of `kind` for `page` and score them.
///
/// Decoding and pixel work run on the blocking pool.
pub async fn compare_page(page: &Page, kind: ComparisonKind) -> Result<f64, CompareError> {
    let before = read_artifact(&page.artifact_path(kind, Phase::Before)).await?;
    let after = read_artifact(&page.artifact_path(kind, Phase::After)).await?;

    tokio::task::spawn_blocking(move || compare(kind, &before, &after))
        .await
        .map_err(|e| CompareError::Task(e.to_string()))?
}

async fn read_artifact(path: &Path) -> Result<Vec<u8>, CompareError> {
    fs::read(path).await.map_err(|source| CompareError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}
