//! OAuth scope normalization.

/// Default scope requested when none is configured. Some Kroger accounts are
/// only provisioned for `product.compact`, so this is the safe default.
pub const DEFAULT_SCOPE: &str = "product.compact";

/// Normalize a raw scope string: whitespace-join the scope tokens and fix the
/// recurring `campact` typo to `compact`, which otherwise yields an upstream
/// `invalid_scope` rejection.
pub fn normalize_scope(raw: &str) -> String {
    let trimmed = raw.trim();
    let source = if trimmed.is_empty() {
        DEFAULT_SCOPE
    } else {
        trimmed
    };
    source
        .split_whitespace()
        .map(|tok| tok.replace("campact", "compact"))
        .collect::<Vec<_>>()
        .join(" ")
}
