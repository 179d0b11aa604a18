use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::{Config, WeatherError, model::Coordinate, model::WeatherSnapshot};

pub mod openweather;

pub use openweather::OpenWeatherFetcher;

/// One remote weather lookup by coordinates. Implementations do not retry.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, coordinate: Coordinate) -> Result<WeatherSnapshot, WeatherError>;
}

/// Construct the fetcher described by `config`.
///
/// A missing API key is not an error here: it is reported once at startup by
/// [`Config::report_issues`], and requests then fail at the remote end.
pub fn fetcher_from_config(config: &Config) -> Result<Box<dyn WeatherFetcher>, WeatherError> {
    let fetcher = OpenWeatherFetcher::builder(config.api_key_or_empty())
        .endpoint(&config.endpoint)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;

    Ok(Box::new(fetcher))
}
