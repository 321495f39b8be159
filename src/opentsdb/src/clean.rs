//! Identifier sanitization for metric names and tag keys/values

use crate::error::CleanError;

/// Returns true if `c` may appear in an OpenTSDB metric, tag key or tag value
pub fn is_valid_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

/// Remove every character of `s` that OpenTSDB does not accept in metric
/// names and tags.
///
/// Letters and digits from any script are kept, as are `-`, `_`, `.` and `/`.
///
/// # Errors
/// [`CleanError::EmptyInput`] if `s` is empty, [`CleanError::EmptyResult`] if
/// nothing survives the filter.
pub fn clean(s: &str) -> Result<String, CleanError> {
    if s.is_empty() {
        return Err(CleanError::EmptyInput);
    }
    let cleaned: String = s.chars().filter(|c| is_valid_char(*c)).collect();
    if cleaned.is_empty() {
        return Err(CleanError::EmptyResult);
    }
    Ok(cleaned)
}
