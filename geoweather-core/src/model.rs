use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A single position reading in floating-point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Coarse weather category, parsed from the upstream `weather[0].main` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionCode {
    Clear,
    Clouds,
    Rain,
    Snow,
    Thunderstorm,
    Fog,
    Other,
}

impl ConditionCode {
    pub fn from_main(main: &str) -> Self {
        match main.trim().to_lowercase().as_str() {
            "clear" => Self::Clear,
            "clouds" => Self::Clouds,
            "rain" => Self::Rain,
            "snow" => Self::Snow,
            "thunderstorm" => Self::Thunderstorm,
            "mist" | "fog" => Self::Fog,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Fog => "Fog",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully-resolved weather reading. Temperatures in °C, wind in m/s,
/// pressure in hPa, visibility in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub condition: ConditionCode,
    pub description: String,
    pub icon: String,
    pub sunrise_at: DateTime<Utc>,
    pub sunset_at: DateTime<Utc>,
    pub location_name: String,
    pub visibility: f64,
}

impl WeatherSnapshot {
    /// Temperature rounded to the nearest whole degree, as displayed.
    pub fn rounded_temperature(&self) -> i64 {
        self.temperature.round() as i64
    }

    pub fn rounded_feels_like(&self) -> i64 {
        self.feels_like.round() as i64
    }
}

/// A snapshot as persisted by the cache, together with the moment it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub captured_at: DateTime<Utc>,
    pub payload: WeatherSnapshot,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, captured_at: DateTime<Utc>, payload: WeatherSnapshot) -> Self {
        Self {
            key: key.into(),
            captured_at,
            payload,
        }
    }

    /// Usable iff `now - captured_at < ttl`. Expired entries are never deleted,
    /// only ignored.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now.signed_duration_since(self.captured_at) < ttl
    }
}

/// Derive the cache key for a coordinate.
///
/// With `decimals == None` both values are formatted verbatim, so any change in
/// the reading is a different key. With `Some(n)` both are rounded to `n`
/// decimal places first, which lets nearby readings share an entry.
pub fn cache_key(coordinate: Coordinate, decimals: Option<u8>) -> String {
    match decimals {
        None => format!("weather_{}_{}", coordinate.latitude, coordinate.longitude),
        Some(n) => {
            let n = usize::from(n);
            format!(
                "weather_{:.*}_{:.*}",
                n,
                round_to(coordinate.latitude, n),
                n,
                round_to(coordinate.longitude, n),
            )
        }
    }
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    // `+ 0.0` folds -0.0 into 0.0 so both sides of zero share a bucket.
    (value * factor).round() / factor + 0.0
}
