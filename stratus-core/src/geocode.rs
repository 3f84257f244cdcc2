//! Forward geocoding through the Open-Meteo geocoding API.
//!
//! Every provider resolves location queries here; no API key is required.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::RequestError;
use crate::http::read_json;
use crate::model::Location;
use crate::provider::ProviderId;

const GEOCODING_BASE_URL: &str = "https://geocoding-api.open-meteo.com";
const RESULT_COUNT: u32 = 20;

#[derive(Debug, Clone)]
pub struct GeocodingClient {
    http: Client,
    base_url: String,
}

impl Default for GeocodingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeocodingClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: GEOCODING_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Search locations by name. Empty results count as a lookup failure,
    /// matching how the UI surfaces "location not found".
    pub async fn search(
        &self,
        query: &str,
        language: &str,
        provider: ProviderId,
    ) -> Result<Vec<Location>, RequestError> {
        debug!("geocoding '{query}' (language {language}) for {provider}");

        let count = RESULT_COUNT.to_string();
        let res = self
            .http
            .get(format!("{}/v1/search", self.base_url))
            .query(&[
                ("name", query),
                ("count", count.as_str()),
                ("language", language),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| RequestError::LocationSearch(e.to_string()))?;

        let parsed: GeocodingResponse = read_json(res, "Open-Meteo geocoding")
            .await
            .map_err(RequestError::for_location)?;

        let results = parsed.results.unwrap_or_default();
        if results.is_empty() {
            return Err(RequestError::LocationSearch(format!(
                "no geocoding results for '{query}'"
            )));
        }

        Ok(results.into_iter().map(|r| r.into_location(provider)).collect())
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    country_code: Option<String>,
    timezone: Option<String>,
    postcodes: Option<Vec<String>>,
}

impl GeocodingResult {
    fn into_location(self, provider: ProviderId) -> Location {
        let country_code = self.country_code.map(|c| c.to_ascii_uppercase());

        // French department number, taken from the postcode. It is what
        // the Meteo-France warning domain and the Atmo AuRA gate use.
        let province_code = match country_code.as_deref() {
            Some("FR") => self
                .postcodes
                .as_ref()
                .and_then(|p| p.first())
                .and_then(|p| department_from_postcode(p)),
            _ => None,
        };

        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone.unwrap_or_else(|| "UTC".to_string()),
            city: self.name,
            country_code,
            province_code,
            provider,
            weather: None,
        }
    }
}

/// Department code from a French postcode. Usually the first two digits;
/// Corsica still uses "20xxx" postcodes even though its departments split
/// into 2A (south, 200xx/201xx) and 2B (north, 202xx and up).
fn department_from_postcode(postcode: &str) -> Option<String> {
    let prefix = postcode.get(..2)?;
    if prefix != "20" {
        return Some(prefix.to_string());
    }

    match postcode.get(2..3) {
        Some("0" | "1") => Some("2A".to_string()),
        Some(_) => Some("2B".to_string()),
        None => None,
    }
}
