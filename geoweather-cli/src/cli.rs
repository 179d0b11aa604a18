use anyhow::Context;
use clap::{Parser, Subcommand};
use geoweather_core::{
    AcquisitionEngine, Config, Coordinate, KvStore, LineSource, MemoryStore, PresentationState,
    WeatherSession, engine_from_config, engine_with_store,
};
use inquire::{Password, PasswordDisplayMode, Text};
use std::sync::Arc;
use tokio::io::BufReader;

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "geoweather", version, about = "Weather for your live location")]
pub struct Cli {
    /// Keep the cache in memory only instead of the on-disk cache directory.
    #[arg(long, global = true)]
    pub no_persist: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key and cache settings.
    Configure,

    /// Show weather for one coordinate.
    Show {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Follow positions from stdin (`<lat>,<lon>` per line, or `denied`) and
    /// print the weather each time it changes.
    Watch,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { lat, lon } => {
                let engine = build_engine(self.no_persist)?;
                show(&engine, Coordinate::new(lat, lon)).await;
                Ok(())
            }
            Command::Watch => {
                let engine = build_engine(self.no_persist)?;
                watch(Arc::new(engine)).await
            }
        }
    }
}

fn build_engine(no_persist: bool) -> anyhow::Result<AcquisitionEngine> {
    let config = Config::load()?;
    config.report_issues();

    if no_persist {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        return Ok(engine_with_store(&config, store)?);
    }

    engine_from_config(&config).context("Failed to set up the weather cache")
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut config = Config::load_from(&path)?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    config.set_api_key(api_key.trim().to_string());

    let current = config.cache.key_decimals.map(|n| n.to_string()).unwrap_or_default();
    let decimals = Text::new("Cache key precision in decimal places (blank = exact coordinates):")
        .with_initial_value(&current)
        .prompt()?;
    config.cache.key_decimals = parse_decimals(&decimals)?;

    config.save()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}

fn parse_decimals(input: &str) -> anyhow::Result<Option<u8>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let n: u8 = input
        .parse()
        .with_context(|| format!("'{input}' is not a whole number between 0 and 255"))?;
    Ok(Some(n))
}

async fn show(engine: &AcquisitionEngine, coordinate: Coordinate) {
    let state = match engine.resolve_weather(coordinate).await {
        Ok(snapshot) => PresentationState::Ready(snapshot),
        Err(e) => {
            tracing::warn!(error = %e, "weather lookup failed");
            PresentationState::Failed(e.kind())
        }
    };
    println!("{}", render::state(&state));
}

async fn watch(engine: Arc<AcquisitionEngine>) -> anyhow::Result<()> {
    let source = LineSource::new(BufReader::new(tokio::io::stdin()));
    let mut session = WeatherSession::start(engine, source);
    let mut rx = session.subscribe();

    println!("{}", render::state(&rx.borrow_and_update()));

    {
        let mut finished = std::pin::pin!(session.finished());
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("{}", render::state(&rx.borrow_and_update()));
                }
                _ = tokio::signal::ctrl_c() => break,
                _ = &mut finished => break,
            }
        }
    }

    if rx.has_changed().unwrap_or(false) {
        println!("{}", render::state(&rx.borrow_and_update()));
    }

    session.stop();
    Ok(())
}
