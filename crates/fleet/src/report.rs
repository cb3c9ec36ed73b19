//! Per-site CSV report

use serde::Serialize;
use std::path::Path;

use sitesweep_common::ComparisonResult;

/// Report file name inside a site folder
pub const REPORT_FILE: &str = "results.csv";

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    site: &'a str,
    url: &'a str,
    comparison: &'a str,
    score: String,
    pass: &'static str,
}

impl<'a> From<&'a ComparisonResult> for ReportRow<'a> {
    fn from(result: &'a ComparisonResult) -> Self {
        Self {
            site: &result.site,
            url: &result.url,
            comparison: result.comparison.name(),
            score: result.score.map(|s| s.to_string()).unwrap_or_default(),
            pass: if result.pass { "YES" } else { "NO" },
        }
    }
}

/// Write `results` as CSV with a `site,url,comparison,score,pass` header.
///
/// Undefined scores are written as an empty cell.
pub fn write_report(path: &Path, results: &[ComparisonResult]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    if results.is_empty() {
        writer.write_record(["site", "url", "comparison", "score", "pass"])?;
    }
    for result in results {
        writer.serialize(ReportRow::from(result))?;
    }
    writer.flush()?;
    Ok(())
}
