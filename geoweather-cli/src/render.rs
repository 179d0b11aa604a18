use chrono::{DateTime, Local, Utc};
use geoweather_core::{ErrorKind, PresentationState, WeatherSnapshot};

pub fn state(state: &PresentationState) -> String {
    match state {
        PresentationState::Loading => loading(),
        PresentationState::Ready(snapshot) => ready(snapshot),
        PresentationState::Failed(kind) => failed(*kind),
    }
}

fn loading() -> String {
    "Loading weather data...\n\
     If prompted, please allow location access for accurate weather data."
        .to_string()
}

fn failed(kind: ErrorKind) -> String {
    format!("Oops! Something went wrong\n{}\n{}", kind.user_message(), ErrorKind::HINT)
}

fn ready(s: &WeatherSnapshot) -> String {
    format!(
        "{name}\n\
         {temp}°C  {condition}, {description}\n\
         Feels like: {feels}°C   Min/Max: {min}°C / {max}°C\n\
         Humidity: {humidity}%   Pressure: {pressure} hPa\n\
         Wind: {wind} m/s from {deg}°   Visibility: {visibility} km\n\
         Sunrise: {sunrise}   Sunset: {sunset}",
        name = s.location_name,
        temp = s.rounded_temperature(),
        condition = s.condition,
        description = s.description,
        feels = s.rounded_feels_like(),
        min = s.temp_min.round(),
        max = s.temp_max.round(),
        humidity = s.humidity,
        pressure = s.pressure,
        wind = s.wind_speed,
        deg = s.wind_direction,
        visibility = s.visibility / 1000.0,
        sunrise = format_time(s.sunrise_at),
        sunset = format_time(s.sunset_at),
    )
}

/// Local wall-clock time as `HH:MM`.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoweather_core::ConditionCode;

    fn snapshot() -> WeatherSnapshot {
        WeatherSnapshot {
            temperature: 18.4,
            feels_like: 17.6,
            humidity: 60.0,
            pressure: 1012.0,
            temp_min: 16.0,
            temp_max: 20.1,
            wind_speed: 2.5,
            wind_direction: 180.0,
            condition: ConditionCode::Clouds,
            description: "scattered clouds".into(),
            icon: "03d".into(),
            sunrise_at: DateTime::from_timestamp(1_718_161_200, 0).unwrap_or_default(),
            sunset_at: DateTime::from_timestamp(1_718_221_800, 0).unwrap_or_default(),
            location_name: "Berlin".into(),
            visibility: 10_000.0,
        }
    }

    #[test]
    fn ready_shows_rounded_temperature() {
        let out = state(&PresentationState::Ready(snapshot()));
        assert!(out.starts_with("Berlin\n18°C  Clouds, scattered clouds"));
        assert!(out.contains("Feels like: 18°C"));
        assert!(out.contains("Humidity: 60%"));
        assert!(out.contains("Visibility: 10 km"));
    }

    #[test]
    fn failures_share_hint() {
        let denied = state(&PresentationState::Failed(ErrorKind::PermissionDenied));
        let network = state(&PresentationState::Failed(ErrorKind::Network));

        assert!(denied.contains("Unable to retrieve your location"));
        assert!(network.contains("Error fetching weather data"));
        assert!(denied.ends_with(ErrorKind::HINT));
        assert!(network.ends_with(ErrorKind::HINT));
    }

    #[test]
    fn time_is_hours_and_minutes() {
        let out = format_time(snapshot().sunrise_at);
        assert_eq!(out.len(), 5);
        assert_eq!(&out[2..3], ":");
    }
}
