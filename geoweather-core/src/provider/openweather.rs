use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::WeatherError,
    model::{ConditionCode, Coordinate, WeatherSnapshot},
};

use super::WeatherFetcher;

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Current-weather lookup against the OpenWeather `weather` endpoint, in metric units.
#[derive(Clone)]
pub struct OpenWeatherFetcher {
    api_key: String,
    endpoint: String,
    http: Client,
}

impl std::fmt::Debug for OpenWeatherFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherFetcher")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "<missing>" } else { "<redacted>" })
            .finish()
    }
}

#[derive(Debug)]
pub struct OpenWeatherFetcherBuilder {
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenWeatherFetcherBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OpenWeatherFetcher, WeatherError> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| WeatherError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(OpenWeatherFetcher {
            api_key: self.api_key,
            endpoint: self.endpoint,
            http,
        })
    }
}

impl OpenWeatherFetcher {
    pub fn builder(api_key: impl Into<String>) -> OpenWeatherFetcherBuilder {
        OpenWeatherFetcherBuilder {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
    pressure: f64,
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    sys: OwSys,
    visibility: f64,
}

impl TryFrom<OwCurrentResponse> for WeatherSnapshot {
    type Error = WeatherError;

    fn try_from(parsed: OwCurrentResponse) -> Result<Self, Self::Error> {
        let weather = parsed
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::Parse("OpenWeather response contained no weather entry".into()))?;

        Ok(WeatherSnapshot {
            temperature: parsed.main.temp,
            feels_like: parsed.main.feels_like,
            humidity: parsed.main.humidity,
            pressure: parsed.main.pressure,
            temp_min: parsed.main.temp_min,
            temp_max: parsed.main.temp_max,
            wind_speed: parsed.wind.speed,
            wind_direction: parsed.wind.deg,
            condition: ConditionCode::from_main(&weather.main),
            description: weather.description,
            icon: weather.icon,
            sunrise_at: unix_to_utc(parsed.sys.sunrise)?,
            sunset_at: unix_to_utc(parsed.sys.sunset)?,
            location_name: parsed.name,
            visibility: parsed.visibility,
        })
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherFetcher {
    async fn fetch(&self, coordinate: Coordinate) -> Result<WeatherSnapshot, WeatherError> {
        let lat = coordinate.latitude.to_string();
        let lon = coordinate.longitude.to_string();

        tracing::info!(lat = %lat, lon = %lon, "requesting current weather");

        let res = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Network(format!("Failed to send request to OpenWeather: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| WeatherError::Network(format!("Failed to read OpenWeather response body: {e}")))?;

        if !status.is_success() {
            return Err(WeatherError::Network(format!(
                "OpenWeather request failed with status {}: {}",
                status,
                truncate_body(&body),
            )));
        }

        parse_current(&body)
    }
}

fn parse_current(body: &str) -> Result<WeatherSnapshot, WeatherError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)
        .map_err(|e| WeatherError::Parse(format!("Failed to parse OpenWeather JSON: {e}")))?;

    WeatherSnapshot::try_from(parsed)
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, WeatherError> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| WeatherError::Parse(format!("timestamp {ts} out of range")))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BERLIN: &str = r#"{
        "coord": {"lon": 13.405, "lat": 52.52},
        "weather": [{"id": 802, "main": "Clouds", "description": "scattered clouds", "icon": "03d"}],
        "main": {"temp": 18.4, "feels_like": 17.9, "temp_min": 16.1, "temp_max": 19.8, "pressure": 1016, "humidity": 60},
        "visibility": 10000,
        "wind": {"speed": 4.12, "deg": 250},
        "dt": 1718200000,
        "sys": {"country": "DE", "sunrise": 1718161200, "sunset": 1718221800},
        "name": "Berlin"
    }"#;

    #[test]
    fn parses_current_response() {
        let snapshot = parse_current(BERLIN).expect("valid response");

        assert_eq!(snapshot.location_name, "Berlin");
        assert_eq!(snapshot.temperature, 18.4);
        assert_eq!(snapshot.humidity, 60.0);
        assert_eq!(snapshot.pressure, 1016.0);
        assert_eq!(snapshot.wind_direction, 250.0);
        assert_eq!(snapshot.condition, ConditionCode::Clouds);
        assert_eq!(snapshot.icon, "03d");
        assert_eq!(snapshot.visibility, 10_000.0);
        assert_eq!(snapshot.sunrise_at.timestamp(), 1_718_161_200);
        assert_eq!(snapshot.sunset_at.timestamp(), 1_718_221_800);
    }

    #[test]
    fn missing_field_is_parse_error() {
        let body = BERLIN.replace(r#""visibility": 10000,"#, "");
        let err = parse_current(&body).unwrap_err();
        assert!(matches!(err, WeatherError::Parse(_)));
    }

    #[test]
    fn empty_weather_array_is_parse_error() {
        let body = BERLIN.replace(
            r#"[{"id": 802, "main": "Clouds", "description": "scattered clouds", "icon": "03d"}]"#,
            "[]",
        );
        let err = parse_current(&body).unwrap_err();
        assert!(err.to_string().contains("no weather entry"));
    }

    #[test]
    fn html_body_is_parse_error() {
        let err = parse_current("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, WeatherError::Parse(_)));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(150);
        let out = truncate_body(&long);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let fetcher = OpenWeatherFetcher::builder("SECRET").build().expect("client builds");
        let dbg = format!("{fetcher:?}");
        assert!(!dbg.contains("SECRET"));
        assert!(dbg.contains(DEFAULT_ENDPOINT));
    }
}
