use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::RequestError,
    geocode::GeocodingClient,
    http::read_json,
    model::{
        AirQuality, Current, DailyForecast, HourlyForecast, Location, Weather, WeatherCondition,
    },
    provider::{ProviderId, WeatherProvider},
};

const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";

const HOURLY_VARIABLES: &str = "temperature_2m,precipitation,weathercode,windspeed_10m";
const DAILY_VARIABLES: &str =
    "temperature_2m_max,temperature_2m_min,weathercode,precipitation_sum,sunrise,sunset";

/// Open-Meteo adapter. No credentials needed, so `is_configured` is
/// always true and the whole bundle comes from a single forecast call.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    language: String,
    base_url: String,
    geocoding: GeocodingClient,
}

impl OpenMeteoProvider {
    pub fn new(language: String) -> Self {
        Self {
            http: Client::new(),
            language,
            base_url: OPEN_METEO_BASE_URL.to_string(),
            geocoding: GeocodingClient::new(),
        }
    }

    #[cfg(test)]
    fn with_base_url(base_url: &str) -> Self {
        let mut provider = Self::new("en".to_string());
        provider.base_url = base_url.to_string();
        provider
    }

    async fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<OmForecastResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", HOURLY_VARIABLES.to_string()),
                ("daily", DAILY_VARIABLES.to_string()),
                ("current_weather", "true".to_string()),
                ("forecast_days", "7".to_string()),
                ("timezone", "auto".to_string()),
                ("wind_speed_unit", "ms".to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Open-Meteo forecast").await
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn weather(&self, location: &Location) -> Result<Weather, RequestError> {
        debug!("requesting Open-Meteo weather for {}, {}", location.latitude, location.longitude);

        let forecast = self.fetch_forecast(location.latitude, location.longitude).await?;
        convert(forecast)
    }

    async fn search(&self, query: &str) -> Result<Vec<Location>, RequestError> {
        self.geocoding.search(query, &self.language, ProviderId::OpenMeteo).await
    }

    // No reverse-geocoding API; the input location comes back unchanged.
    async fn reverse(&self, location: &Location) -> Result<Vec<Location>, RequestError> {
        Ok(vec![location.clone()])
    }
}

// Timestamps come back as local wall-clock strings ("2024-03-27T10:00");
// treated as UTC since the bundle is self-consistent.
fn parse_time(time: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M").ok().map(|dt| dt.and_utc())
}

fn convert(forecast: OmForecastResult) -> Result<Weather, RequestError> {
    let observed = forecast.current_weather.ok_or_else(|| {
        RequestError::WeatherRequest("forecast response carried no current block".to_string())
    })?;

    let condition = WeatherCondition::from_wmo_code(observed.weathercode.unwrap_or_default());
    let current = Current {
        temperature_c: observed.temperature,
        feels_like_c: None,
        condition,
        description: condition.description().to_string(),
        humidity_pct: None,
        wind_speed_mps: observed.windspeed,
        wind_direction_deg: observed.winddirection,
        pressure_hpa: None,
        uv_index: None,
    };

    let mut daily = Vec::new();
    if let Some(block) = forecast.daily {
        for (i, date) in block.time.iter().enumerate() {
            let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else { continue };
            let condition = pick(&block.weathercode, i)
                .map(WeatherCondition::from_wmo_code)
                .unwrap_or_default();
            daily.push(DailyForecast {
                date,
                high_c: pick(&block.temperature_max, i),
                low_c: pick(&block.temperature_min, i),
                condition,
                description: Some(condition.description().to_string()),
                precipitation_mm: pick(&block.precipitation_sum, i),
                sunrise: pick(&block.sunrise, i).as_deref().and_then(parse_time),
                sunset: pick(&block.sunset, i).as_deref().and_then(parse_time),
                moon_phase: None,
            });
        }
    }

    let mut hourly = Vec::new();
    if let Some(block) = forecast.hourly {
        for (i, time) in block.time.iter().enumerate() {
            let Some(time) = parse_time(time) else { continue };
            let condition = pick(&block.weathercode, i)
                .map(WeatherCondition::from_wmo_code)
                .unwrap_or_default();
            hourly.push(HourlyForecast {
                time,
                temperature_c: pick(&block.temperature, i),
                condition,
                precipitation_mm: pick(&block.precipitation, i),
                wind_speed_mps: pick(&block.windspeed, i),
            });
        }
    }

    Ok(Weather {
        current,
        daily,
        hourly,
        minutely: Vec::new(),
        alerts: Vec::new(),
        air_quality: AirQuality::default(),
        fetched_at: Utc::now(),
    })
}

/// Safe positional lookup into an optional column of the response.
fn pick<T: Clone>(column: &Option<Vec<Option<T>>>, index: usize) -> Option<T> {
    column.as_ref().and_then(|v| v.get(index)).and_then(Clone::clone)
}

#[derive(Debug, Deserialize)]
struct OmForecastResult {
    current_weather: Option<OmCurrentWeather>,
    hourly: Option<OmHourlyBlock>,
    daily: Option<OmDailyBlock>,
}

#[derive(Debug, Deserialize)]
struct OmCurrentWeather {
    temperature: f64,
    windspeed: Option<f64>,
    winddirection: Option<f64>,
    weathercode: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OmHourlyBlock {
    time: Vec<String>,
    #[serde(rename = "temperature_2m")]
    temperature: Option<Vec<Option<f64>>>,
    precipitation: Option<Vec<Option<f64>>>,
    weathercode: Option<Vec<Option<i64>>>,
    #[serde(rename = "windspeed_10m")]
    windspeed: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct OmDailyBlock {
    time: Vec<String>,
    #[serde(rename = "temperature_2m_max")]
    temperature_max: Option<Vec<Option<f64>>>,
    #[serde(rename = "temperature_2m_min")]
    temperature_min: Option<Vec<Option<f64>>>,
    weathercode: Option<Vec<Option<i64>>>,
    precipitation_sum: Option<Vec<Option<f64>>>,
    sunrise: Option<Vec<Option<String>>>,
    sunset: Option<Vec<Option<String>>>,
}
