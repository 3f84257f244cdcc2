//! Shared response handling for the provider adapters.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::RequestError;

/// Classify the status, read the body, and decode JSON.
///
/// 401/403 and 429 map to their own error categories so the caller can
/// surface them; everything else non-success becomes a generic request
/// failure carrying a truncated body excerpt.
pub(crate) async fn read_json<T: DeserializeOwned>(
    res: reqwest::Response,
    what: &str,
) -> Result<T, RequestError> {
    let status = res.status();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(RequestError::ApiUnauthorized);
        }
        StatusCode::TOO_MANY_REQUESTS => return Err(RequestError::ApiLimitReached),
        _ => {}
    }

    let body = res.text().await?;

    if !status.is_success() {
        return Err(RequestError::WeatherRequest(format!(
            "{what} request failed with status {status}: {}",
            truncate_body(&body),
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        RequestError::WeatherRequest(format!("Failed to parse {what} JSON: {e}"))
    })
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }

    // Back off to a char boundary; byte 200 may fall inside a multi-byte
    // character (provider error bodies are often French).
    let mut cut = MAX;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}
