//! Bracket trimming for encoded sequence values.

/// Strip surrounding whitespace and the outer `[`/`]` of an encoded array,
/// leaving its element list.
///
/// An empty array or `null` yields an empty span.
pub fn trim_brackets(encoded: &[u8]) -> &[u8] {
    let trimmed = encoded.trim_ascii();
    if trimmed == b"null" {
        return &[];
    }
    let trimmed = trimmed.strip_prefix(b"[").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(b"]").unwrap_or(trimmed);
    trimmed.trim_ascii()
}
