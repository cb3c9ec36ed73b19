//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::error;

use sitesweep_common::ComparisonResult;
use sitesweep_fleet::FleetReport;

/// Output format of the run summary
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
    /// Rows that should stand out
    fn highlighted(&self) -> bool {
        false
    }
}

impl TableDisplay for ComparisonResult {
    fn headers() -> Vec<&'static str> {
        vec!["Site", "URL", "Comparison", "Score", "Threshold", "Pass"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.site.clone(),
            self.url.clone(),
            self.comparison.to_string(),
            self.score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "n/a".to_string()),
            format!("{}", self.threshold),
            if self.pass { "YES" } else { "NO" }.to_string(),
        ]
    }

    fn highlighted(&self) -> bool {
        !self.pass
    }
}

/// Render `items` as a table, failing rows in red
pub fn render_table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        let cells = item.row().into_iter().map(|value| {
            let cell = Cell::new(value);
            if item.highlighted() {
                cell.fg(Color::Red)
            } else {
                cell
            }
        });
        table.add_row(cells);
    }
    table
}

/// Comparison results as a pretty-printed JSON array
pub fn results_json(results: &[ComparisonResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}

/// Print the comparison results and failed sites of a run
pub fn print_summary(report: &FleetReport, format: OutputFormat) {
    let results: Vec<ComparisonResult> = report.results().cloned().collect();

    match format {
        OutputFormat::Table => {
            if results.is_empty() {
                print_info("No comparison results in this run.");
            } else {
                println!("{}", render_table(&results));
            }
        }
        OutputFormat::Json => match results_json(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize results: {}", e);
                print_error(&format!("Cannot print results as JSON: {}", e));
            }
        },
        OutputFormat::Plain => {
            for (i, result) in results.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                for (header, value) in ComparisonResult::headers().iter().zip(result.row()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }

    let below = results.iter().filter(|r| !r.pass).count();
    if below > 0 {
        print_warning(&format!("{} comparison(s) below threshold", below));
    }

    if !report.already_completed.is_empty() {
        print_info(&format!(
            "Skipped {} site(s) completed by an earlier run: {}",
            report.already_completed.len(),
            report.already_completed.join(", ")
        ));
    }

    for failure in &report.failed {
        print_error(&format!("Site {} failed: {}", failure.key, failure.error));
    }

    if report.is_success() {
        print_success(&format!(
            "Finished processing {} site(s)",
            report.completed.len()
        ));
    } else {
        print_warning("Re-run the same command to resume the failed sites");
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠️ ".yellow(), message.yellow());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
