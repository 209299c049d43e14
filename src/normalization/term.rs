//! Ingredient term normalization for cache keys and batch dedup.
//!
//! The normalized form is matching-only; results returned to callers always
//! carry the original string.

/// Lowercase the term and collapse every run of non-alphanumeric characters
/// into a single space, trimming the ends.
///
/// `"Whole Milk (2%)"` and `"whole   milk 2"` normalize identically.
pub fn normalize_term(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Trim a raw input term for dispatch. Terms of length <= 1 after trimming
/// carry no searchable signal and are dropped by the batch layer.
pub fn clean_term(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= 1 {
        return None;
    }
    Some(trimmed.to_string())
}
