/// Keeps at most `max_chars` characters of `value`, appending `...` when cut.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    truncate_with_marker(value, max_chars, max_chars, "...")
}

/// Returns `value` untouched while it fits in `limit` characters; otherwise keeps
/// the first `keep` characters followed by `marker`.
pub fn truncate_with_marker(value: &str, limit: usize, keep: usize, marker: &str) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let mut truncated = value.chars().take(keep).collect::<String>();
    truncated.push_str(marker);
    truncated
}
