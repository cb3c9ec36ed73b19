//! Console log drift as a line-set difference

use std::collections::HashSet;

use crate::error::CompareError;

/// Score `100 * (1 - |before △ after| / |before|)`.
///
/// Duplicate lines collapse. The score is normalised by the before set
/// only, so it is not symmetric: `{a, b}` against `{a}` is 50 while `{a}`
/// against `{a, b}` is 0. Scores below zero are clamped to 0, so a
/// threshold of 0 never fails. An empty
/// before log yields [`CompareError::EmptyBaseline`].
pub fn compare(before: &str, after: &str) -> Result<f64, CompareError> {
    let before: HashSet<&str> = before.lines().collect();
    let after: HashSet<&str> = after.lines().collect();

    if before.is_empty() {
        return Err(CompareError::EmptyBaseline);
    }

    let changed = before.symmetric_difference(&after).count();
    let score = 100.0 * (1.0 - changed as f64 / before.len() as f64);
    Ok(score.max(0.0))
}
