//! Shared HTTP utilities for the URL shortener workspace.
//!
//! Provides the JSON error body shape, base URL normalization and timestamp
//! formatting used by the api-server.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

pub const MSG_URL_REQUIRED: &str = "URL is required";
pub const MSG_NOT_FOUND: &str = "Not found";
pub const MSG_SHORT_URL_NOT_FOUND: &str = "Short URL not found";
pub const MSG_SERVER_ERROR: &str = "Server error";
pub const MSG_UNAVAILABLE: &str = "Service unavailable";

/// Create an error JSON body.
///
/// Returns: `{"error": "<message>"}`
pub fn json_err(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

// ============================================================================
// URL Building
// ============================================================================

/// Normalize a configured base URL: trims whitespace and trailing slashes.
pub fn normalize_base_url(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (millisecond precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 string to SystemTime.
///
/// Returns an error if the string is not a valid RFC3339 timestamp.
pub fn rfc3339_to_system_time(s: &str) -> Result<SystemTime, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(s)?;
    Ok(dt.with_timezone(&Utc).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_json_err() {
        assert_eq!(
            json_err(MSG_URL_REQUIRED),
            serde_json::json!({"error": "URL is required"})
        );
        assert_eq!(json_err(MSG_NOT_FOUND), serde_json::json!({"error": "Not found"}));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://localhost:5000"), "http://localhost:5000");
        assert_eq!(normalize_base_url("https://sho.rt/"), "https://sho.rt");
        assert_eq!(normalize_base_url(" https://sho.rt// "), "https://sho.rt");
    }

    #[test]
    fn test_rfc3339_millis() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let s = system_time_to_rfc3339(t);
        assert_eq!(s, "2023-11-14T22:13:20.123Z");
        assert_eq!(rfc3339_to_system_time(&s).unwrap(), t);
    }

    #[test]
    fn test_rfc3339_rejects_garbage() {
        assert!(rfc3339_to_system_time("yesterday").is_err());
    }
}
