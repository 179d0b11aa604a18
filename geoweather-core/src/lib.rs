//! Core library for the `geoweather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - A TTL cache over a durable key-value store
//! - The weather fetcher abstraction and its OpenWeather implementation
//! - The cache-then-fetch acquisition engine
//! - The location watcher and the presentation state machine it drives
//!
//! It is used by `geoweather-cli`, but can also be embedded by any other front end.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod provider;
pub mod session;
pub mod state;
pub mod watcher;

pub use cache::{CacheStore, FileStore, KvStore, MemoryStore};
pub use config::{CacheConfig, Config, ConfigIssue};
pub use engine::{AcquisitionEngine, CachePolicy};
pub use error::{ErrorKind, WeatherError};
pub use model::{CacheEntry, ConditionCode, Coordinate, WeatherSnapshot, cache_key};
pub use provider::{OpenWeatherFetcher, WeatherFetcher, fetcher_from_config};
pub use session::WeatherSession;
pub use state::{PresentationMachine, PresentationState, RequestTicket};
pub use watcher::{
    ChannelSource, LineSource, LocationWatcher, PositionEvent, PositionSender, PositionSource,
    WatchHandle,
};

use std::sync::Arc;

/// Build an engine from configuration, backed by the on-disk cache.
pub fn engine_from_config(config: &Config) -> anyhow::Result<AcquisitionEngine> {
    let dir = config.cache_dir()?;
    Ok(engine_with_store(config, Arc::new(FileStore::new(dir)))?)
}

/// Build an engine from configuration over an explicit store.
pub fn engine_with_store(
    config: &Config,
    store: Arc<dyn KvStore>,
) -> Result<AcquisitionEngine, WeatherError> {
    let fetcher: Arc<dyn WeatherFetcher> = Arc::from(fetcher_from_config(config)?);
    Ok(AcquisitionEngine::new(fetcher, CacheStore::new(store), config.cache_policy()))
}
