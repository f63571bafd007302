//! Input validation helpers.

use url::Url;

use crate::CoreError;

pub const URL_REQUIRED: &str = "URL is required";
pub const URL_INVALID: &str = "Invalid URL";

/// Upper bound on stored URL length.
pub const MAX_URL_LEN: usize = 2048;

/// Validate an original URL: non-empty, absolute http/https with a host.
/// Returns the trimmed URL as it will be stored.
pub fn validate_original_url(s: &str) -> Result<&str, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(URL_REQUIRED.into()));
    }
    // Stored verbatim and echoed as a Location header
    if trimmed.len() > MAX_URL_LEN || trimmed.chars().any(char::is_control) {
        return Err(CoreError::InvalidInput(URL_INVALID.into()));
    }
    let parsed = Url::parse(trimmed).map_err(|_| CoreError::InvalidInput(URL_INVALID.into()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(CoreError::InvalidInput(URL_INVALID.into()));
    }
    Ok(trimmed)
}
