//! Field-name casing normalisation.
//!
//! Converts loosely cased input keys (`a_field`, `account_no_2`) into the
//! declared casing of record fields (`AField`, `AccountNo_2`).

/// Convert a snake/lower-cased name to the declared field casing.
///
/// A single leading `*` is kept verbatim. Every `_` directly followed by a
/// digit is doubled first, so that separator survives as one `_`. Then each
/// `_` is dropped unless the previous input char was `_` as well, and every
/// other char is upper-cased after the start, an `_` or a digit, lower-cased
/// otherwise. The look-back always sees the original char.
pub fn camel_case(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let (prefix, text) = match text.strip_prefix('*') {
        Some(rest) => ("*", rest),
        None => ("", text),
    };

    let mut expanded = String::with_capacity(text.len() + 4);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        expanded.push(c);
        if c == '_' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            expanded.push('_');
        }
    }

    let mut out = String::with_capacity(prefix.len() + expanded.len());
    out.push_str(prefix);
    let mut last: Option<char> = None;
    for c in expanded.chars() {
        if c == '_' {
            if last == Some('_') {
                out.push('_');
            }
        } else if matches!(last, None | Some('_')) || last.is_some_and(|l| l.is_ascii_digit()) {
            out.push(c.to_uppercase().next().unwrap_or(c));
        } else {
            out.push(c.to_lowercase().next().unwrap_or(c));
        }
        last = Some(c);
    }
    out
}

/// True when the first char of `key` is a lower-case letter.
pub fn starts_lowercase(key: &str) -> bool {
    key.chars().next().is_some_and(char::is_lowercase)
}
