//! Core library for `stratus`.
//!
//! This crate is the data-access layer of the weather app:
//! - Configuration & credentials handling
//! - Abstraction over weather/geocoding providers
//! - Shared domain models and the request error taxonomy
//!
//! Each provider adapter fans out the provider's independent HTTP calls
//! for a location, joins them once all complete, and converts the result
//! into the shared [`model::Weather`] bundle. Optional sub-requests
//! (warnings, air quality) degrade to empty placeholders instead of
//! failing the whole request.

pub mod config;
pub mod error;
pub mod geocode;
mod http;
pub mod model;
pub mod provider;

pub use config::{MeteoFranceConfig, OpenWeatherConfig, Settings};
pub use error::RequestError;
pub use geocode::GeocodingClient;
pub use model::{Location, Weather};
pub use provider::{ProviderId, WeatherProvider, provider_from_config};
