/// Truncate a string to at most `max_bytes` bytes without splitting a multi-byte
/// character. Returns the original string if it already fits.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Lossy, bounded rendering of a vendor response body for errors and logs.
pub fn body_preview(body: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    let cut = safe_truncate(trimmed, max_bytes);
    if cut.len() < trimmed.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}
