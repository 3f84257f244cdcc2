use crate::{
    Settings,
    error::RequestError,
    model::{Location, Weather},
    provider::{
        meteo_france::MeteoFranceProvider, open_meteo::OpenMeteoProvider,
        open_weather::OpenWeatherProvider,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug};

pub mod meteo_france;
pub mod open_meteo;
pub mod open_weather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    MeteoFrance,
    OpenWeather,
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::MeteoFrance => "meteofrance",
            ProviderId::OpenWeather => "openweather",
            ProviderId::OpenMeteo => "openmeteo",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::MeteoFrance, ProviderId::OpenWeather, ProviderId::OpenMeteo]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "meteofrance" => Ok(ProviderId::MeteoFrance),
            "openweather" => Ok(ProviderId::OpenWeather),
            "openmeteo" => Ok(ProviderId::OpenMeteo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: meteofrance, openweather, openmeteo."
            )),
        }
    }
}

/// A weather/geocoding provider adapter.
///
/// `weather` fans out the provider's independent HTTP calls for one
/// location and joins them into a single [`Weather`] bundle. `search` and
/// `reverse` resolve locations; providers without a reverse-geocoding API
/// echo the input location back.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    /// Whether credentials are present. `weather` must report
    /// [`RequestError::ApiKeyMissing`] without any network traffic when
    /// this is false.
    fn is_configured(&self) -> bool;

    async fn weather(&self, location: &Location) -> Result<Weather, RequestError>;

    async fn search(&self, query: &str) -> Result<Vec<Location>, RequestError>;

    async fn reverse(&self, location: &Location) -> Result<Vec<Location>, RequestError>;
}

/// Construct a provider from settings and an explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    settings: &Settings,
) -> Result<Box<dyn WeatherProvider>, RequestError> {
    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::MeteoFrance => Box::new(MeteoFranceProvider::from_settings(settings)),
        ProviderId::OpenWeather => Box::new(OpenWeatherProvider::from_settings(settings)),
        ProviderId::OpenMeteo => Box::new(OpenMeteoProvider::new(settings.language.clone())),
    };

    if !boxed.is_configured() {
        return Err(RequestError::ApiKeyMissing);
    }

    Ok(boxed)
}
