use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::Text;

use stratus_core::{
    MeteoFranceConfig, ProviderId, Settings, WeatherProvider, provider_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "stratus", version, about = "Weather CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "meteofrance".
        provider: String,
    },

    /// Show current weather and forecast for a location.
    Show {
        /// Location name to look up.
        query: String,

        /// Provider to use instead of the configured default.
        #[arg(long)]
        provider: Option<String>,
    },

    /// Search locations by name.
    Search {
        /// Location name to look up.
        query: String,

        /// Provider to use instead of the configured default.
        #[arg(long)]
        provider: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show { query, provider } => show(&query, provider.as_deref()).await,
            Command::Search { query, provider } => search(&query, provider.as_deref()).await,
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut settings = Settings::load()?;

    match id {
        ProviderId::OpenWeather => {
            let api_key = Text::new("OpenWeather API key:").prompt()?;
            let version = Text::new("One Call version:").with_default("2.5").prompt()?;
            settings.upsert_open_weather(api_key, Some(version));
        }
        ProviderId::MeteoFrance => {
            let token = Text::new("Meteo-France token (leave empty to sign one):").prompt()?;
            let jwt_key = Text::new("Meteo-France JWT signing key:").prompt()?;
            let atmo_aura_key = Text::new("Atmo AuRA API key (optional):").prompt()?;
            settings.upsert_meteo_france(MeteoFranceConfig {
                token: non_empty(token),
                jwt_key: non_empty(jwt_key),
                atmo_aura_key: non_empty(atmo_aura_key),
            });
        }
        ProviderId::OpenMeteo => {
            // Nothing to configure, just make it the default.
            settings.set_default_provider(ProviderId::OpenMeteo);
        }
    }

    settings.save()?;
    let path = Settings::config_file_path()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

fn resolve(settings: &Settings, provider: Option<&str>) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let id = match provider {
        Some(name) => ProviderId::try_from(name)?,
        None => settings.default_provider_id()?,
    };

    provider_from_config(id, settings)
        .with_context(|| format!("Could not build provider '{id}'"))
}

async fn show(query: &str, provider: Option<&str>) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let provider = resolve(&settings, provider)?;

    let locations = provider.search(query).await?;
    let location = locations.into_iter().next().context("No location found")?;

    let weather = provider.weather(&location).await?;
    let location = location.with_weather(weather);

    println!(
        "{} ({}, via {})",
        location.city,
        location.country_code.as_deref().unwrap_or("??"),
        provider.id()
    );

    let Some(weather) = &location.weather else {
        return Ok(());
    };
    println!(
        "  Now: {:.1}°C, {} (wind {:.1} m/s)",
        weather.current.temperature_c,
        weather.current.description,
        weather.current.wind_speed_mps.unwrap_or(0.0),
    );

    for day in weather.daily.iter().take(5) {
        println!(
            "  {}: {:.0}°C / {:.0}°C, {}",
            day.date,
            day.low_c.unwrap_or(f64::NAN),
            day.high_c.unwrap_or(f64::NAN),
            day.description.as_deref().unwrap_or(day.condition.description()),
        );
    }

    for alert in &weather.alerts {
        match alert.severity {
            Some(severity) => println!("  ! {} ({severity:?})", alert.phenomenon),
            None => println!("  ! {}", alert.phenomenon),
        }
    }

    if !weather.air_quality.is_empty() {
        let aq = &weather.air_quality;
        println!(
            "  Air quality: PM2.5 {} µg/m³, PM10 {} µg/m³, O3 {} µg/m³",
            fmt_opt(aq.pm25),
            fmt_opt(aq.pm10),
            fmt_opt(aq.o3),
        );
    }

    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

async fn search(query: &str, provider: Option<&str>) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let provider = resolve(&settings, provider)?;

    let locations = provider.search(query).await?;
    for loc in locations {
        println!(
            "{} ({}) at {:.4}, {:.4} [{}]",
            loc.city,
            loc.country_code.as_deref().unwrap_or("??"),
            loc.latitude,
            loc.longitude,
            loc.timezone,
        );
    }

    Ok(())
}
