//! Line similarity of two rendered documents

use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::error::CompareError;

/// Score `100 * unchanged / total` over a line diff.
///
/// `total` counts every line of every diff segment (removed, added and
/// unchanged), so a replaced line counts twice. Two empty documents have
/// no lines to compare and yield [`CompareError::EmptyDocument`].
pub fn compare(before: &str, after: &str) -> Result<f64, CompareError> {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();

    let mut unchanged = 0usize;
    let mut total = 0usize;
    for op in capture_diff_slices(Algorithm::Myers, &old, &new) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                unchanged += old_range.len();
                total += old_range.len();
            }
            DiffTag::Delete => total += old_range.len(),
            DiffTag::Insert => total += new_range.len(),
            DiffTag::Replace => total += old_range.len() + new_range.len(),
        }
    }

    if total == 0 {
        return Err(CompareError::EmptyDocument);
    }

    Ok(100.0 * unchanged as f64 / total as f64)
}
