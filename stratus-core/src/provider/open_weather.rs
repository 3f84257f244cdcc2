use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    config::Settings,
    error::RequestError,
    geocode::GeocodingClient,
    http::read_json,
    model::{
        AirQuality, Alert, Current, DailyForecast, HourlyForecast, Location, MinutelyForecast,
        Weather, WeatherCondition,
    },
    provider::{ProviderId, WeatherProvider},
};

const OPEN_WEATHER_BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeather adapter.
///
/// One weather request fans out two HTTP calls: the One Call bundle is
/// mandatory, the air-pollution call is optional and falls back to an
/// empty placeholder when it fails.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    http: Client,
    api_key: String,
    one_call_version: String,
    language: String,
    base_url: String,
    geocoding: GeocodingClient,
}

impl OpenWeatherProvider {
    pub fn from_settings(settings: &Settings) -> Self {
        let config = settings.open_weather();
        Self::new(
            config.map(|c| c.api_key.clone()).unwrap_or_default(),
            config.map_or_else(|| "2.5".to_string(), |c| c.one_call_version.clone()),
            settings.language.clone(),
        )
    }

    pub fn new(api_key: String, one_call_version: String, language: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            one_call_version,
            language,
            base_url: OPEN_WEATHER_BASE_URL.to_string(),
            geocoding: GeocodingClient::new(),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: &str, base_url: &str) -> Self {
        let mut provider = Self::new(api_key.to_string(), "2.5".to_string(), "en".to_string());
        provider.base_url = base_url.to_string();
        provider
    }

    async fn fetch_one_call(&self, lat: f64, lon: f64) -> Result<OwOneCallResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/data/{}/onecall", self.base_url, self.one_call_version))
            .query(&[
                ("appid", self.api_key.clone()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("units", "metric".to_string()),
                ("lang", self.language.clone()),
            ])
            .send()
            .await?;

        read_json(res, "OpenWeather One Call").await
    }

    async fn fetch_air_pollution(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<OwAirPollutionResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/data/2.5/air_pollution", self.base_url))
            .query(&[
                ("appid", self.api_key.clone()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "OpenWeather air pollution").await
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn weather(&self, location: &Location) -> Result<Weather, RequestError> {
        if !self.is_configured() {
            return Err(RequestError::ApiKeyMissing);
        }

        let lat = location.latitude;
        let lon = location.longitude;
        debug!("requesting OpenWeather weather for {lat}, {lon}");

        let air = async {
            match self.fetch_air_pollution(lat, lon).await {
                Ok(result) => result,
                Err(err) => {
                    warn!("air pollution request failed, substituting empty result: {err}");
                    OwAirPollutionResult::default()
                }
            }
        };

        let (one_call, air) = tokio::join!(self.fetch_one_call(lat, lon), air);

        convert(one_call?, air)
    }

    async fn search(&self, query: &str) -> Result<Vec<Location>, RequestError> {
        self.geocoding.search(query, &self.language, ProviderId::OpenWeather).await
    }

    // There is no reverse-geocoding endpoint on the free plan, so the
    // input location comes back unchanged.
    async fn reverse(&self, location: &Location) -> Result<Vec<Location>, RequestError> {
        Ok(vec![location.clone()])
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn convert(one_call: OwOneCallResult, air: OwAirPollutionResult) -> Result<Weather, RequestError> {
    let observed = one_call.current.ok_or_else(|| {
        RequestError::WeatherRequest("One Call response carried no current block".to_string())
    })?;

    let condition = observed
        .weather
        .first()
        .map(|w| WeatherCondition::from_open_weather_id(w.id))
        .unwrap_or_default();
    let description = observed
        .weather
        .into_iter()
        .next()
        .map_or_else(|| condition.description().to_string(), |w| w.description);

    let current = Current {
        temperature_c: observed.temp,
        feels_like_c: observed.feels_like,
        condition,
        description,
        humidity_pct: observed.humidity,
        wind_speed_mps: observed.wind_speed,
        wind_direction_deg: observed.wind_deg,
        pressure_hpa: observed.pressure,
        uv_index: observed.uvi,
    };

    let daily: Vec<DailyForecast> = one_call
        .daily
        .unwrap_or_default()
        .into_iter()
        .filter_map(|day| {
            let date = timestamp(day.dt)?.date_naive();
            let condition = day
                .weather
                .first()
                .map(|w| WeatherCondition::from_open_weather_id(w.id))
                .unwrap_or_default();
            let description = day.weather.into_iter().next().map(|w| w.description);
            Some(DailyForecast {
                date,
                high_c: day.temp.as_ref().and_then(|t| t.max),
                low_c: day.temp.as_ref().and_then(|t| t.min),
                condition,
                description,
                precipitation_mm: day.rain,
                sunrise: day.sunrise.and_then(timestamp),
                sunset: day.sunset.and_then(timestamp),
                moon_phase: None,
            })
        })
        .collect();

    let hourly: Vec<HourlyForecast> = one_call
        .hourly
        .unwrap_or_default()
        .into_iter()
        .filter_map(|hour| {
            let time = timestamp(hour.dt)?;
            let condition = hour
                .weather
                .first()
                .map(|w| WeatherCondition::from_open_weather_id(w.id))
                .unwrap_or_default();
            Some(HourlyForecast {
                time,
                temperature_c: hour.temp,
                condition,
                precipitation_mm: hour.rain.and_then(|r| r.one_hour),
                wind_speed_mps: hour.wind_speed,
            })
        })
        .collect();

    let minutely: Vec<MinutelyForecast> = one_call
        .minutely
        .unwrap_or_default()
        .into_iter()
        .filter_map(|minute| {
            let time = timestamp(minute.dt)?;
            let precipitation = minute.precipitation.unwrap_or_default();
            Some(MinutelyForecast {
                time,
                intensity: if precipitation > 0.0 { 2 } else { 1 },
                description: None,
            })
        })
        .collect();

    let alerts: Vec<Alert> = one_call
        .alerts
        .unwrap_or_default()
        .into_iter()
        .map(|alert| Alert {
            phenomenon: alert.event,
            severity: None,
            description: alert.description,
        })
        .collect();

    Ok(Weather {
        current,
        daily,
        hourly,
        minutely,
        alerts,
        air_quality: air_quality_from_pollution(air),
        fetched_at: Utc::now(),
    })
}

fn air_quality_from_pollution(air: OwAirPollutionResult) -> AirQuality {
    let Some(entry) = air.list.unwrap_or_default().into_iter().next() else {
        return AirQuality::default();
    };

    let components = entry.components.unwrap_or_default();
    AirQuality {
        pm25: components.pm2_5,
        pm10: components.pm10,
        o3: components.o3,
        no2: components.no2,
        so2: components.so2,
        co: components.co,
        index: entry.main.and_then(|m| m.aqi),
    }
}

#[derive(Debug, Deserialize)]
struct OwOneCallResult {
    current: Option<OwCurrent>,
    minutely: Option<Vec<OwMinutely>>,
    hourly: Option<Vec<OwHourly>>,
    daily: Option<Vec<OwDaily>>,
    alerts: Option<Vec<OwAlert>>,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    temp: f64,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    uvi: Option<f64>,
    wind_speed: Option<f64>,
    wind_deg: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeatherCode>,
}

#[derive(Debug, Deserialize)]
struct OwWeatherCode {
    id: i64,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwMinutely {
    dt: i64,
    precipitation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwHourly {
    dt: i64,
    temp: Option<f64>,
    wind_speed: Option<f64>,
    rain: Option<OwRainVolume>,
    #[serde(default)]
    weather: Vec<OwWeatherCode>,
}

#[derive(Debug, Deserialize)]
struct OwRainVolume {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    temp: Option<OwDailyTemp>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    rain: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeatherCode>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwAlert {
    event: String,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwAirPollutionResult {
    list: Option<Vec<OwAirEntry>>,
}

#[derive(Debug, Deserialize)]
struct OwAirEntry {
    main: Option<OwAirIndex>,
    components: Option<OwAirComponents>,
}

#[derive(Debug, Deserialize)]
struct OwAirIndex {
    aqi: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwAirComponents {
    co: Option<f64>,
    no2: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn one_call_body() -> serde_json::Value {
        serde_json::json!({
            "current": {
                "dt": 1711530000,
                "temp": 16.4,
                "feels_like": 15.9,
                "humidity": 62.0,
                "pressure": 1016.0,
                "uvi": 3.1,
                "wind_speed": 4.2,
                "wind_deg": 220.0,
                "weather": [{"id": 801, "description": "few clouds"}]
            },
            "minutely": [
                {"dt": 1711530000, "precipitation": 0.0},
                {"dt": 1711530060, "precipitation": 0.4}
            ],
            "hourly": [{
                "dt": 1711533600,
                "temp": 15.0,
                "wind_speed": 3.8,
                "rain": {"1h": 0.2},
                "weather": [{"id": 500, "description": "light rain"}]
            }],
            "daily": [{
                "dt": 1711533600,
                "temp": {"min": 8.0, "max": 17.0},
                "sunrise": 1711516800,
                "sunset": 1711562400,
                "rain": 1.2,
                "weather": [{"id": 802, "description": "scattered clouds"}]
            }],
            "alerts": [{"event": "Wind advisory", "description": "Gusts up to 90 km/h"}]
        })
    }

    #[tokio::test]
    async fn missing_api_key_issues_no_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/onecall"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = OpenWeatherProvider::with_base_url("", &server.uri());
        let loc = Location::new(51.5, -0.1, ProviderId::OpenWeather);

        let err = provider.weather(&loc).await.unwrap_err();
        assert!(matches!(err, RequestError::ApiKeyMissing));
    }

    #[tokio::test]
    async fn weather_joins_one_call_and_air_pollution() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/onecall"))
            .and(query_param("appid", "KEY"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "list": [{
                    "main": {"aqi": 2},
                    "components": {"co": 201.9, "no2": 8.4, "o3": 68.7, "so2": 1.1,
                                   "pm2_5": 6.0, "pm10": 9.8}
                }]
            })))
            .mount(&server)
            .await;

        let provider = OpenWeatherProvider::with_base_url("KEY", &server.uri());
        let loc = Location::new(51.5, -0.1, ProviderId::OpenWeather);

        let weather = provider.weather(&loc).await.unwrap();

        assert_eq!(weather.current.temperature_c, 16.4);
        assert_eq!(weather.current.condition, WeatherCondition::PartlyCloudy);
        assert_eq!(weather.daily.len(), 1);
        assert_eq!(weather.daily[0].high_c, Some(17.0));
        assert_eq!(weather.hourly.len(), 1);
        assert_eq!(weather.minutely.len(), 2);
        assert_eq!(weather.alerts.len(), 1);
        assert_eq!(weather.alerts[0].phenomenon, "Wind advisory");
        assert_eq!(weather.air_quality.index, Some(2));
        assert_eq!(weather.air_quality.pm25, Some(6.0));
    }

    #[tokio::test]
    async fn failing_air_pollution_degrades_to_placeholder() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/onecall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = OpenWeatherProvider::with_base_url("KEY", &server.uri());
        let loc = Location::new(51.5, -0.1, ProviderId::OpenWeather);

        let weather = provider.weather(&loc).await.unwrap();
        assert!(weather.air_quality.is_empty());
    }

    #[tokio::test]
    async fn failing_one_call_fails_the_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/onecall"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let provider = OpenWeatherProvider::with_base_url("KEY", &server.uri());
        let loc = Location::new(51.5, -0.1, ProviderId::OpenWeather);

        let err = provider.weather(&loc).await.unwrap_err();
        assert!(matches!(err, RequestError::WeatherRequest(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn unauthorized_and_rate_limit_map_to_their_categories() {
        for (status, expect_limit) in [(401u16, false), (429u16, true)] {
            let server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/data/2.5/onecall"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/air_pollution"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let provider = OpenWeatherProvider::with_base_url("KEY", &server.uri());
            let loc = Location::new(51.5, -0.1, ProviderId::OpenWeather);

            let err = provider.weather(&loc).await.unwrap_err();
            if expect_limit {
                assert!(matches!(err, RequestError::ApiLimitReached));
            } else {
                assert!(matches!(err, RequestError::ApiUnauthorized));
            }
        }
    }

    #[tokio::test]
    async fn reverse_echoes_the_input_location() {
        let provider = OpenWeatherProvider::new(
            "KEY".to_string(),
            "2.5".to_string(),
            "en".to_string(),
        );
        let mut loc = Location::new(51.5, -0.1, ProviderId::OpenWeather);
        loc.city = "London".into();

        let results = provider.reverse(&loc).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].city, "London");
    }
}
