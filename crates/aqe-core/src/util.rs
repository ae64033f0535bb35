//! String helpers

/// Shorten an error message to at most `max_chars` characters, appending an
/// ellipsis when anything was cut.
///
/// Cuts on character boundaries, so multi-byte UTF-8 never panics.
///
/// # Example
/// ```
/// use aqe_core::util::truncate_message;
///
/// assert_eq!(truncate_message("connection refused", 10), "connection...");
/// assert_eq!(truncate_message("ok", 10), "ok");
/// ```
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

/// Lowercase hex rendering of a digest.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
