use crate::provider::ProviderId;
use thiserror::Error;

/// Error taxonomy surfaced to callers of the aggregation facade.
///
/// The categories matter more than the messages: a configuration problem must
/// route the user to settings, while lookup and transient failures are
/// per-city and must never abort a bulk refresh.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// No provider selected, or the selected provider is missing credentials.
    /// Never retried automatically.
    #[error("{0}")]
    Configuration(String),

    /// The provider could not resolve the requested city or coordinates.
    #[error("{provider}: location lookup failed: {message}")]
    Lookup { provider: ProviderId, message: String },

    /// Any other failure of a mandatory provider call (HTTP, network, non-2xx).
    /// The message embeds the provider's own error text when available.
    #[error("{provider}: request failed: {message}")]
    Transient { provider: ProviderId, message: String },

    /// The provider answered but the payload did not match its wire contract.
    #[error("{provider}: unexpected response: {message}")]
    Decode { provider: ProviderId, message: String },

    /// Backing-store failure while loading or persisting the cache.
    #[error("cache store error: {0}")]
    Cache(String),
}

impl WeatherError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn lookup(provider: ProviderId, message: impl ToString) -> Self {
        Self::Lookup { provider, message: message.to_string() }
    }

    pub fn transient(provider: ProviderId, message: impl ToString) -> Self {
        Self::Transient { provider, message: message.to_string() }
    }

    pub fn decode(provider: ProviderId, message: impl ToString) -> Self {
        Self::Decode { provider, message: message.to_string() }
    }

    /// True for errors the UI should answer with "go configure settings".
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_provider_and_detail() {
        let err = WeatherError::lookup(ProviderId::QWeather, "code 404");
        assert_eq!(err.to_string(), "qweather: location lookup failed: code 404");

        let err = WeatherError::transient(ProviderId::OpenWeather, "status 500: oops");
        assert!(err.to_string().starts_with("openweather:"));
    }

    #[test]
    fn configuration_errors_are_distinguishable() {
        let err = WeatherError::configuration("no provider selected");
        assert!(err.is_configuration());
        assert!(!WeatherError::lookup(ProviderId::WeatherApi, "x").is_configuration());
    }
}
