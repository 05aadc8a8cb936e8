//! Helpers for normalizing upload names and counting usage.

/// Sanitize an uploaded filename into a blob-store-safe form.
///
/// Takes the final path component, keeps ASCII alphanumerics and `._-`,
/// maps whitespace to underscores, and drops everything else. Falls back to
/// `document.pdf` when nothing survives.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let mut sanitized = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            sanitized.push(c);
        } else if c.is_whitespace() {
            sanitized.push('_');
        }
    }

    let trimmed = sanitized.trim_matches(['.', '_']).to_string();
    if trimmed.is_empty() {
        "document.pdf".to_string()
    } else {
        trimmed
    }
}

/// Whitespace-delimited word count used as the session usage proxy.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
