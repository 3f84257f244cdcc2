use thiserror::Error;

/// Failure categories surfaced to callers of the provider adapters.
///
/// Every provider maps its HTTP and decoding failures onto this fixed set, so
/// the front-end only ever has to distinguish these cases.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The provider needs an API key or token and none is configured.
    /// Detected before any network call is made.
    #[error("API key or token required but not configured")]
    ApiKeyMissing,

    /// The provider answered 429.
    #[error("API request limit reached")]
    ApiLimitReached,

    /// The provider answered 401 or 403.
    #[error("API rejected the credentials")]
    ApiUnauthorized,

    /// Any other weather request failure: transport error, unexpected
    /// status, or a response body that did not decode.
    #[error("weather request failed: {0}")]
    WeatherRequest(String),

    /// Geocoding lookup failed, including the no-results case.
    #[error("location lookup failed: {0}")]
    LocationSearch(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        RequestError::WeatherRequest(err.to_string())
    }
}

impl RequestError {
    /// Collapse generic request failures into the location-lookup category.
    /// Rate-limit and authorization failures keep their own category.
    pub(crate) fn for_location(self) -> Self {
        match self {
            RequestError::WeatherRequest(msg) => RequestError::LocationSearch(msg),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_failure_becomes_location_failure() {
        let err = RequestError::WeatherRequest("boom".into()).for_location();
        assert!(matches!(err, RequestError::LocationSearch(msg) if msg == "boom"));
    }

    #[test]
    fn rate_limit_keeps_its_category_for_location_lookups() {
        let err = RequestError::ApiLimitReached.for_location();
        assert!(matches!(err, RequestError::ApiLimitReached));
    }
}
