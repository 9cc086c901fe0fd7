//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Derive the websocket URL of the live feed from the HTTP server URL.
pub fn feed_url_from_server(server_url: &str) -> Option<String> {
    let server_url = server_url.trim().trim_end_matches('/');
    if let Some(rest) = server_url.strip_prefix("https://") {
        Some(format!("wss://{rest}"))
    } else {
        server_url
            .strip_prefix("http://")
            .map(|rest| format!("ws://{rest}"))
    }
}
