//! JSON utility functions shared across crates.

/// Strip a surrounding triple-backtick fence (optional `json` language tag)
/// from model output.
#[must_use]
pub fn strip_json_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return trimmed;
    };
    inner.strip_prefix("json").unwrap_or(inner).trim()
}
