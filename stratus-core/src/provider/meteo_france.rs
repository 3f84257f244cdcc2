use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::{MeteoFranceConfig, Settings},
    error::RequestError,
    geocode::GeocodingClient,
    http::read_json,
    model::{
        AirQuality, Alert, AlertSeverity, Current, DailyForecast, HourlyForecast, Location,
        MinutelyForecast, Weather, WeatherCondition,
    },
    provider::{ProviderId, WeatherProvider},
};

const MF_BASE_URL: &str = "https://webservice.meteofrance.com";
const ATMO_AURA_BASE_URL: &str = "https://api.atmo-aura.fr";

// The API rejects unknown user agents.
const MF_USER_AGENT: &str = "okhttp/4.9.2";

/// Departments covered by Atmo Auvergne-Rhone-Alpes.
const ATMO_AURA_DEPARTMENTS: &[&str] =
    &["01", "03", "07", "15", "26", "38", "42", "43", "63", "69", "73", "74"];

/// Meteo-France adapter.
///
/// One weather request fans out six HTTP calls: observation, forecast,
/// ephemeris and rain nowcast are mandatory; vigilance warnings and Atmo
/// AuRA air quality are optional extras gated on the location and fall
/// back to empty placeholders when they fail.
#[derive(Debug, Clone)]
pub struct MeteoFranceProvider {
    http: Client,
    token: Option<String>,
    jwt_key: Option<String>,
    atmo_aura_key: Option<String>,
    language: String,
    base_url: String,
    atmo_base_url: String,
    geocoding: GeocodingClient,
}

impl MeteoFranceProvider {
    pub fn from_settings(settings: &Settings) -> Self {
        let config = settings.meteo_france().cloned().unwrap_or_default();
        Self::new(config, settings.language.clone())
    }

    pub fn new(config: MeteoFranceConfig, language: String) -> Self {
        Self {
            http: Client::new(),
            token: config.token,
            jwt_key: config.jwt_key,
            atmo_aura_key: config.atmo_aura_key,
            language,
            base_url: MF_BASE_URL.to_string(),
            atmo_base_url: ATMO_AURA_BASE_URL.to_string(),
            geocoding: GeocodingClient::new(),
        }
    }

    #[cfg(test)]
    fn with_base_urls(config: MeteoFranceConfig, base_url: &str, atmo_base_url: &str) -> Self {
        let mut provider = Self::new(config, "en".to_string());
        provider.base_url = base_url.to_string();
        provider.atmo_base_url = atmo_base_url.to_string();
        provider
    }

    /// Resolve the access token: an explicitly configured token wins,
    /// otherwise one is signed from the configured JWT key.
    fn access_token(&self) -> Option<String> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Some(token.to_string());
        }

        let key = self.jwt_key.as_deref().filter(|k| !k.is_empty())?;
        match sign_token(key) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!("Meteo-France token signing failed: {err}");
                None
            }
        }
    }

    fn warning_domain(&self, location: &Location) -> Option<String> {
        if !location.is_france() {
            return None;
        }
        location.province_code.clone().filter(|p| !p.is_empty())
    }

    /// Atmo AuRA is only queried with a key, for French locations inside
    /// the Auvergne-Rhone-Alpes departments.
    fn atmo_query(&self, location: &Location) -> Option<(String, String)> {
        let key = self.atmo_aura_key.as_deref().filter(|k| !k.is_empty())?;
        if !location.is_france() {
            return None;
        }
        let department = location.province_code.as_deref()?;
        if !ATMO_AURA_DEPARTMENTS.contains(&department) {
            return None;
        }
        Some((key.to_string(), atmo_datetime(location)))
    }

    async fn fetch_current(
        &self,
        lat: f64,
        lon: f64,
        token: &str,
    ) -> Result<MfCurrentResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/v2/observation", self.base_url))
            .header(header::USER_AGENT, MF_USER_AGENT)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("lang", self.language.clone()),
                ("formatDate", "iso".to_string()),
                ("token", token.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Meteo-France observation").await
    }

    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        token: &str,
    ) -> Result<MfForecastResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/v2/forecast", self.base_url))
            .header(header::USER_AGENT, MF_USER_AGENT)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("formatDate", "iso".to_string()),
                ("token", token.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Meteo-France forecast").await
    }

    async fn fetch_ephemeris(
        &self,
        lat: f64,
        lon: f64,
        token: &str,
    ) -> Result<MfEphemerisResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/ephemeris", self.base_url))
            .header(header::USER_AGENT, MF_USER_AGENT)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                // English required to convert the moon phase
                ("lang", "en".to_string()),
                ("formatDate", "iso".to_string()),
                ("token", token.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Meteo-France ephemeris").await
    }

    async fn fetch_rain(
        &self,
        lat: f64,
        lon: f64,
        token: &str,
    ) -> Result<MfRainResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/v3/nowcast/rain", self.base_url))
            .header(header::USER_AGENT, MF_USER_AGENT)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("lang", self.language.clone()),
                ("formatDate", "iso".to_string()),
                ("token", token.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Meteo-France rain nowcast").await
    }

    async fn fetch_warnings(
        &self,
        domain: &str,
        token: &str,
    ) -> Result<MfWarningsResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/v3/warning/full", self.base_url))
            .header(header::USER_AGENT, MF_USER_AGENT)
            .query(&[
                ("domain", domain.to_string()),
                ("formatDate", "iso".to_string()),
                ("token", token.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Meteo-France warnings").await
    }

    async fn fetch_atmo(
        &self,
        api_key: &str,
        lat: f64,
        lon: f64,
        datetime: &str,
    ) -> Result<AtmoAuraPointResult, RequestError> {
        let res = self
            .http
            .get(format!("{}/air2go/v3/point", self.atmo_base_url))
            .query(&[
                ("api_token", api_key.to_string()),
                ("x", lon.to_string()),
                ("y", lat.to_string()),
                ("datetime_echeance", datetime.to_string()),
            ])
            .send()
            .await?;

        read_json(res, "Atmo AuRA point").await
    }
}

#[async_trait]
impl WeatherProvider for MeteoFranceProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MeteoFrance
    }

    fn is_configured(&self) -> bool {
        self.access_token().is_some()
    }

    async fn weather(&self, location: &Location) -> Result<Weather, RequestError> {
        let Some(token) = self.access_token() else {
            return Err(RequestError::ApiKeyMissing);
        };

        let lat = location.latitude;
        let lon = location.longitude;
        debug!("requesting Meteo-France weather for {lat}, {lon}");

        let warnings = async {
            match self.warning_domain(location) {
                Some(domain) => match self.fetch_warnings(&domain, &token).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("warnings request failed, substituting empty result: {err}");
                        MfWarningsResult::default()
                    }
                },
                None => MfWarningsResult::default(),
            }
        };

        let air = async {
            match self.atmo_query(location) {
                Some((key, datetime)) => match self.fetch_atmo(&key, lat, lon, &datetime).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("Atmo AuRA request failed, substituting empty result: {err}");
                        AtmoAuraPointResult::default()
                    }
                },
                None => AtmoAuraPointResult::default(),
            }
        };

        let (mandatory, warnings, air) = tokio::join!(
            async {
                tokio::try_join!(
                    self.fetch_current(lat, lon, &token),
                    self.fetch_forecast(lat, lon, &token),
                    self.fetch_ephemeris(lat, lon, &token),
                    self.fetch_rain(lat, lon, &token),
                )
            },
            warnings,
            air,
        );
        let (current, forecast, ephemeris, rain) = mandatory?;

        convert(current, forecast, ephemeris, rain, warnings, air)
    }

    async fn search(&self, query: &str) -> Result<Vec<Location>, RequestError> {
        self.geocoding.search(query, "fr", ProviderId::MeteoFrance).await
    }

    async fn reverse(&self, location: &Location) -> Result<Vec<Location>, RequestError> {
        let Some(token) = self.access_token() else {
            return Err(RequestError::ApiKeyMissing);
        };

        let forecast = self
            .fetch_forecast(location.latitude, location.longitude, &token)
            .await
            .map_err(RequestError::for_location)?;

        let props = forecast.properties.ok_or_else(|| {
            RequestError::LocationSearch("forecast response carried no position".to_string())
        })?;

        let (latitude, longitude) = forecast
            .geometry
            .and_then(|g| g.coordinates)
            .filter(|c| c.len() >= 2)
            .map_or((location.latitude, location.longitude), |c| (c[1], c[0]));

        let mut resolved = Location::new(latitude, longitude, ProviderId::MeteoFrance);
        if let Some(name) = props.name {
            resolved.city = name;
        }
        resolved.country_code = props.country.as_deref().and_then(country_code);
        resolved.province_code = props.french_department;
        if let Some(timezone) = props.timezone {
            resolved.timezone = timezone;
        }

        Ok(vec![resolved])
    }
}

#[derive(Serialize)]
struct TokenClaims {
    class: &'static str,
    iat: String,
    jti: String,
}

/// Sign a short-lived HS256 token the way the mobile clients do.
fn sign_token(key: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = TokenClaims {
        class: "mobile",
        iat: Utc::now().timestamp().to_string(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
}

/// Tomorrow at local midnight, because that window exposes both D-1 and
/// D+1 pollutant data.
fn atmo_datetime(location: &Location) -> String {
    let tz: chrono_tz::Tz = location.timezone.parse().unwrap_or(chrono_tz::UTC);
    let tomorrow = Utc::now().with_timezone(&tz).date_naive() + chrono::Duration::days(1);
    let midnight = tomorrow.and_time(NaiveTime::MIN);
    let local = midnight
        .and_local_timezone(tz)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight));

    local.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string()
}

fn country_code(country: &str) -> Option<String> {
    let code: String =
        country.chars().take_while(char::is_ascii_alphabetic).take(2).collect();
    if code.len() == 2 { Some(code.to_ascii_uppercase()) } else { None }
}

fn parse_iso(time: Option<&str>) -> Option<DateTime<Utc>> {
    time.and_then(|t| DateTime::parse_from_rfc3339(t).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn mf_phenomenon_name(id: i64) -> &'static str {
    match id {
        1 => "Wind",
        2 => "Rain-flood",
        3 => "Thunderstorms",
        4 => "Flood",
        5 => "Snow-ice",
        6 => "Heatwave",
        7 => "Extreme cold",
        8 => "Avalanche",
        9 => "Coastal event",
        _ => "Unknown",
    }
}

fn convert(
    current: MfCurrentResult,
    forecast: MfForecastResult,
    ephemeris: MfEphemerisResult,
    rain: MfRainResult,
    warnings: MfWarningsResult,
    atmo: AtmoAuraPointResult,
) -> Result<Weather, RequestError> {
    let observation = current
        .properties
        .and_then(|p| p.gridded)
        .ok_or_else(|| {
            RequestError::WeatherRequest("observation response carried no data".to_string())
        })?;

    let temperature_c = observation.temperature.ok_or_else(|| {
        RequestError::WeatherRequest("observation response carried no temperature".to_string())
    })?;

    let condition = observation
        .weather_icon
        .as_deref()
        .map(WeatherCondition::from_mf_icon)
        .unwrap_or_default();

    let current = Current {
        temperature_c,
        feels_like_c: None,
        condition,
        description: observation
            .weather_description
            .unwrap_or_else(|| condition.description().to_string()),
        humidity_pct: None,
        wind_speed_mps: observation.wind_speed,
        wind_direction_deg: observation.wind_direction,
        pressure_hpa: None,
        uv_index: None,
    };

    let moon_phase = ephemeris
        .properties
        .and_then(|p| p.ephemeris)
        .and_then(|e| e.moon_phase_description);

    let forecast_props = forecast.properties.unwrap_or_default();

    let mut daily: Vec<DailyForecast> = forecast_props
        .daily_forecast
        .unwrap_or_default()
        .into_iter()
        .filter_map(|day| {
            let date = parse_iso(day.time.as_deref())?.date_naive();
            let condition = day
                .daily_weather_icon
                .as_deref()
                .map(WeatherCondition::from_mf_icon)
                .unwrap_or_default();
            Some(DailyForecast {
                date,
                high_c: day.temperature_max,
                low_c: day.temperature_min,
                condition,
                description: day.daily_weather_description,
                precipitation_mm: day.total_precipitation_24h,
                sunrise: parse_iso(day.sunrise_time.as_deref()),
                sunset: parse_iso(day.sunset_time.as_deref()),
                moon_phase: None,
            })
        })
        .collect();

    // The ephemeris call only covers today.
    if let Some(first) = daily.first_mut() {
        first.moon_phase = moon_phase;
    }

    let hourly: Vec<HourlyForecast> = forecast_props
        .forecast
        .unwrap_or_default()
        .into_iter()
        .filter_map(|hour| {
            let time = parse_iso(hour.time.as_deref())?;
            let condition = hour
                .weather_icon
                .as_deref()
                .map(WeatherCondition::from_mf_icon)
                .unwrap_or_default();
            Some(HourlyForecast {
                time,
                temperature_c: hour.temperature,
                condition,
                precipitation_mm: hour.rain_1h,
                wind_speed_mps: hour.wind_speed,
            })
        })
        .collect();

    let minutely: Vec<MinutelyForecast> = rain
        .properties
        .and_then(|p| p.forecast)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|step| {
            let time = parse_iso(step.time.as_deref())?;
            Some(MinutelyForecast {
                time,
                intensity: step.rain_intensity.unwrap_or(1),
                description: step.rain_intensity_description,
            })
        })
        .collect();

    let alerts: Vec<Alert> = warnings
        .phenomenons_items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let color = item.phenomenon_max_color_id?;
            // Green means nothing to report.
            if color < 2 {
                return None;
            }
            Some(Alert {
                phenomenon: mf_phenomenon_name(item.phenomenon_id.unwrap_or_default())
                    .to_string(),
                severity: AlertSeverity::from_mf_color(color),
                description: None,
            })
        })
        .collect();

    Ok(Weather {
        current,
        daily,
        hourly,
        minutely,
        alerts,
        air_quality: air_quality_from_atmo(atmo),
        fetched_at: Utc::now(),
    })
}

fn air_quality_from_atmo(atmo: AtmoAuraPointResult) -> AirQuality {
    let mut aq = AirQuality::default();

    for polluant in atmo.polluants.unwrap_or_default() {
        let concentration = polluant
            .horaires
            .unwrap_or_default()
            .into_iter()
            .find_map(|h| h.concentration);
        let Some(value) = concentration else { continue };

        match polluant.polluant.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("PM2.5" | "PM2_5" | "PM25") => aq.pm25 = Some(value),
            Some("PM10") => aq.pm10 = Some(value),
            Some("O3") => aq.o3 = Some(value),
            Some("NO2") => aq.no2 = Some(value),
            Some("SO2") => aq.so2 = Some(value),
            Some("CO") => aq.co = Some(value),
            _ => {}
        }
    }

    aq
}

#[derive(Debug, Deserialize)]
struct MfCurrentResult {
    properties: Option<MfCurrentProperties>,
}

#[derive(Debug, Deserialize)]
struct MfCurrentProperties {
    gridded: Option<MfObservation>,
}

#[derive(Debug, Deserialize)]
struct MfObservation {
    #[serde(rename = "T")]
    temperature: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
    weather_icon: Option<String>,
    weather_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MfForecastResult {
    geometry: Option<MfGeometry>,
    properties: Option<MfForecastProperties>,
}

#[derive(Debug, Deserialize)]
struct MfGeometry {
    coordinates: Option<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct MfForecastProperties {
    name: Option<String>,
    country: Option<String>,
    french_department: Option<String>,
    timezone: Option<String>,
    daily_forecast: Option<Vec<MfDailyForecast>>,
    forecast: Option<Vec<MfHourlyForecast>>,
}

#[derive(Debug, Deserialize)]
struct MfDailyForecast {
    time: Option<String>,
    #[serde(rename = "T_min")]
    temperature_min: Option<f64>,
    #[serde(rename = "T_max")]
    temperature_max: Option<f64>,
    daily_weather_icon: Option<String>,
    daily_weather_description: Option<String>,
    sunrise_time: Option<String>,
    sunset_time: Option<String>,
    total_precipitation_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MfHourlyForecast {
    time: Option<String>,
    #[serde(rename = "T")]
    temperature: Option<f64>,
    weather_icon: Option<String>,
    wind_speed: Option<f64>,
    rain_1h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MfEphemerisResult {
    properties: Option<MfEphemerisProperties>,
}

#[derive(Debug, Deserialize)]
struct MfEphemerisProperties {
    ephemeris: Option<MfEphemeris>,
}

#[derive(Debug, Deserialize)]
struct MfEphemeris {
    moon_phase_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MfRainResult {
    properties: Option<MfRainProperties>,
}

#[derive(Debug, Deserialize)]
struct MfRainProperties {
    forecast: Option<Vec<MfRainStep>>,
}

#[derive(Debug, Deserialize)]
struct MfRainStep {
    time: Option<String>,
    rain_intensity: Option<u8>,
    rain_intensity_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MfWarningsResult {
    phenomenons_items: Option<Vec<MfWarningPhenomenon>>,
}

#[derive(Debug, Deserialize)]
struct MfWarningPhenomenon {
    phenomenon_id: Option<i64>,
    phenomenon_max_color_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct AtmoAuraPointResult {
    polluants: Option<Vec<AtmoAuraPolluant>>,
}

#[derive(Debug, Deserialize)]
struct AtmoAuraPolluant {
    polluant: Option<String>,
    horaires: Option<Vec<AtmoAuraHoraire>>,
}

#[derive(Debug, Deserialize)]
struct AtmoAuraHoraire {
    concentration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn configured(server: &MockServer) -> MeteoFranceProvider {
        MeteoFranceProvider::with_base_urls(
            MeteoFranceConfig { token: Some("t0ken".into()), ..MeteoFranceConfig::default() },
            &server.uri(),
            &server.uri(),
        )
    }

    fn lyon() -> Location {
        let mut loc = Location::new(45.76, 4.84, ProviderId::MeteoFrance);
        loc.timezone = "Europe/Paris".into();
        loc.country_code = Some("FR".into());
        loc.province_code = Some("69".into());
        loc
    }

    async fn mount_mandatory(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v2/observation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": {"gridded": {
                    "T": 12.5,
                    "wind_speed": 3.0,
                    "wind_direction": 120.0,
                    "weather_icon": "p2j",
                    "weather_description": "Ciel voile"
                }}
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "geometry": {"coordinates": [4.84, 45.76]},
                "properties": {
                    "name": "Lyon",
                    "country": "FR - France",
                    "french_department": "69",
                    "timezone": "Europe/Paris",
                    "daily_forecast": [{
                        "time": "2024-03-27T00:00:00+01:00",
                        "T_min": 4.0,
                        "T_max": 14.0,
                        "daily_weather_icon": "p12j",
                        "daily_weather_description": "Pluie",
                        "sunrise_time": "2024-03-27T06:20:00+01:00",
                        "sunset_time": "2024-03-27T19:05:00+01:00",
                        "total_precipitation_24h": 6.5
                    }],
                    "forecast": [{
                        "time": "2024-03-27T10:00:00+01:00",
                        "T": 9.0,
                        "weather_icon": "p3j",
                        "wind_speed": 4.0,
                        "rain_1h": 0.2
                    }]
                }
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/ephemeris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": {"ephemeris": {"moon_phase_description": "Full moon"}}
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v3/nowcast/rain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": {"forecast": [
                    {"time": "2024-03-27T10:00:00+01:00", "rain_intensity": 1,
                     "rain_intensity_description": "Temps sec"},
                    {"time": "2024-03-27T10:10:00+01:00", "rain_intensity": 3,
                     "rain_intensity_description": "Pluie moderee"}
                ]}
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn signed_token_has_three_segments() {
        let token = sign_token("secret-signing-key").expect("signing succeeds");
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn unconfigured_provider_produces_no_token() {
        let provider =
            MeteoFranceProvider::new(MeteoFranceConfig::default(), "en".to_string());
        assert!(!provider.is_configured());
    }

    #[test]
    fn explicit_token_wins_over_jwt_key() {
        let provider = MeteoFranceProvider::new(
            MeteoFranceConfig {
                token: Some("explicit".into()),
                jwt_key: Some("key".into()),
                atmo_aura_key: None,
            },
            "en".to_string(),
        );
        assert_eq!(provider.access_token().as_deref(), Some("explicit"));
    }

    #[test]
    fn country_code_from_mf_country_field() {
        assert_eq!(country_code("FR - France"), Some("FR".to_string()));
        assert_eq!(country_code("de"), Some("DE".to_string()));
        assert_eq!(country_code("1"), None);
    }

    #[tokio::test]
    async fn missing_credentials_issue_no_requests() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/observation"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = MeteoFranceProvider::with_base_urls(
            MeteoFranceConfig::default(),
            &server.uri(),
            &server.uri(),
        );

        let err = provider.weather(&lyon()).await.unwrap_err();
        assert!(matches!(err, RequestError::ApiKeyMissing));
    }

    #[tokio::test]
    async fn weather_joins_all_responses() {
        let server = MockServer::start().await;
        mount_mandatory(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/warning/full"))
            .and(query_param("domain", "69"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "phenomenons_items": [
                    {"phenomenon_id": 3, "phenomenon_max_color_id": 3},
                    {"phenomenon_id": 1, "phenomenon_max_color_id": 1}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/air2go/v3/point"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "polluants": [
                    {"polluant": "pm2.5", "horaires": [{"concentration": 8.1}]},
                    {"polluant": "o3", "horaires": [{"concentration": 61.0}]}
                ]
            })))
            .mount(&server)
            .await;

        let mut provider = configured(&server);
        provider.atmo_aura_key = Some("atmo-key".into());

        let weather = provider.weather(&lyon()).await.unwrap();

        assert_eq!(weather.current.temperature_c, 12.5);
        assert_eq!(weather.current.condition, WeatherCondition::PartlyCloudy);
        assert_eq!(weather.daily.len(), 1);
        assert_eq!(weather.daily[0].moon_phase.as_deref(), Some("Full moon"));
        assert_eq!(weather.hourly.len(), 1);
        assert_eq!(weather.minutely.len(), 2);
        assert_eq!(weather.minutely[1].intensity, 3);

        // Green phenomenons are dropped, orange ones kept.
        assert_eq!(weather.alerts.len(), 1);
        assert_eq!(weather.alerts[0].phenomenon, "Thunderstorms");
        assert_eq!(weather.alerts[0].severity, Some(AlertSeverity::Orange));

        assert_eq!(weather.air_quality.pm25, Some(8.1));
        assert_eq!(weather.air_quality.o3, Some(61.0));
    }

    #[tokio::test]
    async fn failing_optional_calls_degrade_to_placeholders() {
        let server = MockServer::start().await;
        mount_mandatory(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/warning/full"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/air2go/v3/point"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut provider = configured(&server);
        provider.atmo_aura_key = Some("atmo-key".into());

        let weather = provider.weather(&lyon()).await.unwrap();

        assert!(weather.alerts.is_empty());
        assert!(weather.air_quality.is_empty());
    }

    #[tokio::test]
    async fn optional_calls_are_skipped_outside_france() {
        let server = MockServer::start().await;
        mount_mandatory(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/warning/full"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/air2go/v3/point"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut provider = configured(&server);
        provider.atmo_aura_key = Some("atmo-key".into());

        let mut berlin = Location::new(52.52, 13.40, ProviderId::MeteoFrance);
        berlin.country_code = Some("DE".into());
        berlin.province_code = Some("11".into());

        let weather = provider.weather(&berlin).await.unwrap();
        assert!(weather.alerts.is_empty());
        assert!(weather.air_quality.is_empty());
    }

    #[tokio::test]
    async fn atmo_is_skipped_outside_the_covered_departments() {
        let server = MockServer::start().await;
        mount_mandatory(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/warning/full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/air2go/v3/point"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut provider = configured(&server);
        provider.atmo_aura_key = Some("atmo-key".into());

        // Paris is French but not in Auvergne-Rhone-Alpes.
        let mut paris = lyon();
        paris.province_code = Some("75".into());

        let weather = provider.weather(&paris).await.unwrap();
        assert!(weather.air_quality.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_api_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/observation"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        for endpoint in ["/v2/forecast", "/ephemeris", "/v3/nowcast/rain"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
                .mount(&server)
                .await;
        }

        let provider = configured(&server);
        let mut loc = lyon();
        loc.country_code = None;
        loc.province_code = None;

        let err = provider.weather(&loc).await.unwrap_err();
        assert!(matches!(err, RequestError::ApiUnauthorized));
    }

    #[tokio::test]
    async fn rate_limit_maps_to_api_limit_reached() {
        let server = MockServer::start().await;

        for endpoint in ["/v2/observation", "/v2/forecast", "/ephemeris", "/v3/nowcast/rain"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(429))
                .mount(&server)
                .await;
        }

        let provider = configured(&server);
        let mut loc = lyon();
        loc.country_code = None;
        loc.province_code = None;

        let err = provider.weather(&loc).await.unwrap_err();
        assert!(matches!(err, RequestError::ApiLimitReached));
    }

    #[tokio::test]
    async fn reverse_geocoding_reads_the_forecast_position() {
        let server = MockServer::start().await;
        mount_mandatory(&server).await;

        let provider = configured(&server);
        let results = provider.reverse(&lyon()).await.unwrap();

        assert_eq!(results.len(), 1);
        let loc = &results[0];
        assert_eq!(loc.city, "Lyon");
        assert_eq!(loc.country_code.as_deref(), Some("FR"));
        assert_eq!(loc.province_code.as_deref(), Some("69"));
        assert_eq!(loc.timezone, "Europe/Paris");
    }
}
