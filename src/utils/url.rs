//! URL utilities for building backend endpoints
//!
//! Session and server identifiers are user-influenced, so they are appended
//! as percent-encoded path segments rather than formatted into a string.

use reqwest::Url;

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use toolchat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000"), "http://localhost:8000");
/// assert_eq!(normalize_base_url("http://localhost:8000///"), "http://localhost:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Append path segments to a base URL, encoding each one
///
/// # Examples
///
/// ```
/// use toolchat::utils::url::endpoint_url;
///
/// let url = endpoint_url("http://localhost:8000/", &["api", "chat", "abc", "message"]).unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8000/api/chat/abc/message");
/// ```
pub fn endpoint_url(base_url: &str, segments: &[&str]) -> Result<Url, String> {
    let normalized = normalize_base_url(base_url.trim());
    let mut url = Url::parse(&normalized).map_err(|err| format!("{normalized} ({err})"))?;
    url.path_segments_mut()
        .map_err(|_| format!("{normalized} (cannot be used as a base)"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_base_path_prefix() {
        let url = endpoint_url("https://chat.example.com/backend/", &["api", "sessions"]).unwrap();
        assert_eq!(url.as_str(), "https://chat.example.com/backend/api/sessions");
    }

    #[test]
    fn encodes_reserved_characters_in_segments() {
        let url = endpoint_url("http://localhost:8000", &["servers", "a/b c", "tools"]).unwrap();
        assert_eq!(url.path(), "/servers/a%2Fb%20c/tools");
    }

    #[test]
    fn rejects_unparseable_base() {
        assert!(endpoint_url("not a url", &["api"]).is_err());
        assert!(endpoint_url("mailto:someone@example.com", &["api"]).is_err());
    }
}
