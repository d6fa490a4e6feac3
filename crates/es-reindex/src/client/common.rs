//! Helpers shared by the HTTP client: client construction, URL building and
//! mapping of cluster error replies.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a configured HTTP client with timeout.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the TLS backend cannot be initialised.
pub fn create_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(Error::from)
}

/// Validates a cluster base URL.
pub fn validate_url(url: &str) -> Result<()> {
    let has_valid_scheme = ["http://", "https://"].iter().any(|s| url.starts_with(s));

    if !has_valid_scheme {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 || !url.contains("://") {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Joins a base URL and a path, tolerating slashes on either side.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Extracts the most useful reason from a cluster error body.
///
/// Prefers `error.root_cause[0].reason`, then `error.reason`, then a plain
/// string `error`, and falls back to the raw body.
pub fn error_reason(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let error = &json["error"];

    error["root_cause"][0]["reason"]
        .as_str()
        .or_else(|| error["reason"].as_str())
        .or_else(|| error.as_str())
        .map_or_else(|| body.trim().to_string(), str::to_string)
}

/// Handles HTTP error responses and returns appropriate errors.
pub fn handle_http_error(status_code: u16, body: &str, endpoint: &str) -> Error {
    match status_code {
        401 | 403 => Error::Authentication(format!(
            "{} rejected credentials: {}",
            endpoint,
            error_reason(body)
        )),
        _ => Error::Status {
            status: status_code,
            reason: error_reason(body),
        },
    }
}

/// Handles HTTP error responses of a search request, where the index and
/// query are under the caller's control.
pub fn handle_search_error(status_code: u16, body: &str, endpoint: &str, index: &str) -> Error {
    match status_code {
        404 => Error::IndexNotFound(index.to_string()),
        400 => Error::Query(error_reason(body)),
        _ => handle_http_error(status_code, body, endpoint),
    }
}
