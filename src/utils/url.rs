//! Endpoint URL construction.
//!
//! Base URLs come from the command line, the environment or the config file
//! and are joined with endpoint paths without producing double slashes.

use url::Url;

/// Strip trailing slashes from a base URL.
///
/// # Examples
///
/// ```
/// use causette::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000/api/"), "http://localhost:8000/api");
/// assert_eq!(normalize_base_url("  http://localhost:8000/api//  "), "http://localhost:8000/api");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path.
///
/// # Examples
///
/// ```
/// use causette::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8000/api/", "/chat/completions"),
///     "http://localhost:8000/api/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Whether a base URL is usable at all: it parses, uses an http(s) scheme
/// and names a host.
pub fn is_http_url(base_url: &str) -> bool {
    Url::parse(&normalize_base_url(base_url))
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}
