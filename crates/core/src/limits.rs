//! Size limits for stored log records
//!
//! Records are bounded so that a single runaway message cannot blow up the
//! persistent queue. Text fields are cut at character (not byte) boundaries.

/// Maximum characters kept from a record's topic
pub const MAX_TOPIC_CHARS: usize = 256;

/// Maximum characters kept from a record's message body
pub const MAX_MESSAGE_CHARS: usize = 50_000;

/// Maximum characters kept from each session-context field
pub const MAX_CONTEXT_FIELD_CHARS: usize = 256;

/// Appended to a message body that was cut at [`MAX_MESSAGE_CHARS`]
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Maximum nesting of throwable causes and suppressed throwables
pub const MAX_THROWABLE_DEPTH: usize = 50;

/// Cut `value` to at most `max_chars` characters.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}

/// Cut a message body, appending [`TRUNCATION_MARKER`] when anything was dropped.
pub fn truncate_message(value: &str) -> String {
    match value.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            cut.push_str(&value[..byte_idx]);
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        None => value.to_string(),
    }
}
