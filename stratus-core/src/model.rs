use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;

/// A place the user asked about, optionally carrying the weather fetched
/// for it. Geocoding produces bare locations; a successful weather request
/// attaches the converted bundle via [`Location::with_weather`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name, e.g. "Europe/Paris". Falls back to "UTC".
    pub timezone: String,
    pub city: String,
    /// ISO 3166-1 alpha-2, upper case, when known.
    pub country_code: Option<String>,
    /// Second-level administrative code; the French department number
    /// for FR locations. Drives the Meteo-France warning domain.
    pub province_code: Option<String>,
    pub provider: ProviderId,
    pub weather: Option<Weather>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, provider: ProviderId) -> Self {
        Self {
            latitude,
            longitude,
            timezone: "UTC".to_string(),
            city: format!("{latitude:.4}, {longitude:.4}"),
            country_code: None,
            province_code: None,
            provider,
            weather: None,
        }
    }

    #[must_use]
    pub fn with_weather(mut self, weather: Weather) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn is_france(&self) -> bool {
        self.country_code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case("FR"))
    }
}

/// Complete weather bundle for one location, joined from the provider's
/// mandatory and optional sub-requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weather {
    pub current: Current,
    pub daily: Vec<DailyForecast>,
    pub hourly: Vec<HourlyForecast>,
    /// Short-term precipitation nowcast, when the provider has one.
    pub minutely: Vec<MinutelyForecast>,
    /// Active weather warnings. Empty when the optional warnings request
    /// failed or was not applicable.
    pub alerts: Vec<Alert>,
    /// Empty (all `None`) when the optional air-quality request failed or
    /// was not applicable.
    pub air_quality: AirQuality,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Current {
    pub temperature_c: f64,
    pub feels_like_c: Option<f64>,
    pub condition: WeatherCondition,
    pub description: String,
    pub humidity_pct: Option<f64>,
    pub wind_speed_mps: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub uv_index: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub high_c: Option<f64>,
    pub low_c: Option<f64>,
    pub condition: WeatherCondition,
    pub description: Option<String>,
    pub precipitation_mm: Option<f64>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub moon_phase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub condition: WeatherCondition,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_mps: Option<f64>,
}

/// One step of a rain nowcast (Meteo-France covers the next hour).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinutelyForecast {
    pub time: DateTime<Utc>,
    /// Provider intensity scale; for Meteo-France 1 (dry) to 4 (heavy).
    pub intensity: u8,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub phenomenon: String,
    pub severity: Option<AlertSeverity>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertSeverity {
    /// Meteo-France vigilance color ids (1 = green .. 4 = red).
    pub fn from_mf_color(color: i64) -> Option<Self> {
        match color {
            1 => Some(Self::Green),
            2 => Some(Self::Yellow),
            3 => Some(Self::Orange),
            4 => Some(Self::Red),
            _ => None,
        }
    }
}

/// Pollutant concentrations in µg/m³ plus the provider's aggregate index.
/// All-`None` is the placeholder used when the air-quality sub-request
/// failed or was skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirQuality {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub index: Option<i64>,
}

impl AirQuality {
    pub fn is_empty(&self) -> bool {
        self.pm25.is_none()
            && self.pm10.is_none()
            && self.o3.is_none()
            && self.no2.is_none()
            && self.so2.is_none()
            && self.co.is_none()
            && self.index.is_none()
    }
}

/// Condition categories shared across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Map an Open-Meteo WMO weather code.
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i64) -> Self {
        match code {
            0 => Self::Clear,
            1..=2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 | 66 | 67 => Self::Sleet,
            61 | 63 | 80 => Self::Rain,
            65 | 81 | 82 => Self::HeavyRain,
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Clear,
        }
    }

    /// Map an OpenWeather condition id (group 2xx thunderstorm, 3xx
    /// drizzle, 5xx rain, 6xx snow, 7xx atmosphere, 80x clouds).
    pub fn from_open_weather_id(id: i64) -> Self {
        match id {
            200..=299 => Self::Thunderstorm,
            300..=499 => Self::Drizzle,
            500 | 520 => Self::Drizzle,
            501 | 521 => Self::Rain,
            502..=504 | 522 | 531 => Self::HeavyRain,
            511 => Self::Sleet,
            611..=616 => Self::Sleet,
            600..=699 => Self::Snow,
            700..=799 => Self::Fog,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear,
        }
    }

    /// Map a Meteo-France pictogram id ("p12j", "p3n", ...). The trailing
    /// day/night marker is ignored.
    pub fn from_mf_icon(icon: &str) -> Self {
        let digits: String = icon.chars().filter(char::is_ascii_digit).collect();
        match digits.parse::<i64>() {
            Ok(1) => Self::Clear,
            Ok(2) => Self::PartlyCloudy,
            Ok(3..=5) => Self::Cloudy,
            Ok(6..=8) => Self::Fog,
            Ok(9..=11) => Self::Drizzle,
            Ok(12..=15) => Self::Rain,
            Ok(16) => Self::HeavyRain,
            Ok(17..=21) => Self::Snow,
            Ok(22 | 23) => Self::Sleet,
            Ok(24..=30) => Self::Thunderstorm,
            _ => Self::Cloudy,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}
