//! Error taxonomy shared by the fetcher, engine, watcher and state machine.

use serde::{Deserialize, Serialize};

/// Failure of a resolve or of the location subscription.
///
/// Cache faults never appear here: the cache absorbs them and reports a miss.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeatherError {
    #[error("Location unavailable: {0}")]
    PermissionDenied(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl WeatherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WeatherError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            WeatherError::Network(_) => ErrorKind::Network,
            WeatherError::Parse(_) => ErrorKind::Parse,
        }
    }
}

/// Payload-free failure category carried by the presentation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    Network,
    Parse,
}

impl ErrorKind {
    /// Message shown to the user. Only location failures are told apart from
    /// everything else.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "Unable to retrieve your location",
            ErrorKind::Network | ErrorKind::Parse => "Error fetching weather data",
        }
    }

    /// Static hint shown under every failure message.
    pub const HINT: &'static str =
        "Please check your internet connection and location settings, then try again.";
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_message())
    }
}
