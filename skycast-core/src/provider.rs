use crate::config::Settings;
use crate::error::WeatherError;
use crate::model::{CitySearchResult, Coordinates, WeatherSnapshot};
use crate::provider::{
    custom::CustomProvider, openweather::OpenWeatherProvider, qweather::QWeatherProvider,
    weatherapi::WeatherApiProvider,
};
use crate::timefmt::TimeFormat;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

pub mod custom;
pub mod openweather;
pub mod qweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
    QWeather,
    Custom,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::QWeather => "qweather",
            ProviderId::Custom => "custom",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi, ProviderId::QWeather, ProviderId::Custom]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            "qweather" => Ok(ProviderId::QWeather),
            "custom" => Ok(ProviderId::Custom),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi, qweather, custom."
            )),
        }
    }
}

/// One weather fetch as the adapters see it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// City name; providers resolve it themselves when no coordinates are given.
    pub city: String,
    pub lang: String,
    /// When present, adapters query by coordinates and only use `city` as a
    /// display fallback.
    pub coords: Option<Coordinates>,
    /// Display format baked into the snapshot's time strings.
    pub time_format: TimeFormat,
}

/// A weather data source. The mandatory current-conditions call failing is an
/// error; forecast, air-quality and astronomy sub-requests are best-effort
/// and degrade to absent fields.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherSnapshot, WeatherError>;

    /// City lookup, reused for autocomplete and for key verification.
    async fn search(&self, query: &str, lang: &str)
    -> Result<Vec<CitySearchResult>, WeatherError>;
}

/// Construct an adapter for `id` from settings, sharing the given HTTP client.
pub fn provider_from_settings(
    id: ProviderId,
    settings: &Settings,
    http: &Client,
) -> Result<Box<dyn WeatherProvider>, WeatherError> {
    let require_key = || {
        settings.api_key(id).map(str::to_owned).ok_or_else(|| {
            WeatherError::configuration(format!(
                "No API key configured for provider '{id}'. Add one in settings before fetching."
            ))
        })
    };

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Box::new(OpenWeatherProvider::new(require_key()?, http.clone())),
        ProviderId::WeatherApi => Box::new(WeatherApiProvider::new(require_key()?, http.clone())),
        ProviderId::QWeather => Box::new(QWeatherProvider::new(
            require_key()?,
            settings.qweather_host.as_deref(),
            http.clone(),
        )),
        ProviderId::Custom => {
            let url = settings.custom_url.clone().ok_or_else(|| {
                WeatherError::configuration(
                    "Custom provider selected but no endpoint URL is configured.",
                )
            })?;
            let key = settings.api_key(ProviderId::Custom).unwrap_or_default().to_owned();
            Box::new(CustomProvider::new(url, key, http.clone()))
        }
    };

    Ok(boxed)
}

/// GET `url` with `query`, expecting a 2xx JSON body. Non-2xx responses map
/// 400/404 onto lookup failures (the provider answered "no such place") and
/// everything else onto transient failures, embedding the provider's own
/// error text for diagnosis.
pub(crate) async fn request_json<T, Q>(
    http: &Client,
    provider: ProviderId,
    url: &str,
    query: &Q,
) -> Result<T, WeatherError>
where
    T: DeserializeOwned,
    Q: Serialize + ?Sized,
{
    let res = http
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| WeatherError::transient(provider, e))?;

    let status = res.status();
    let body = res.text().await.map_err(|e| WeatherError::transient(provider, e))?;

    if !status.is_success() {
        let message = format!("status {status}: {}", truncate_body(&body));
        return Err(match status.as_u16() {
            400 | 404 => WeatherError::lookup(provider, message),
            _ => WeatherError::transient(provider, message),
        });
    }

    serde_json::from_str(&body).map_err(|e| WeatherError::decode(provider, e))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = body.char_indices().take_while(|(i, _)| *i < MAX).map(|(i, c)| i + c.len_utf8());
        let end = cut.last().unwrap_or(0);
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

/// Round a temperature to the nearest whole °C, the unit every snapshot uses.
pub(crate) fn round_temp(celsius: f64) -> i32 {
    celsius.round() as i32
}

/// km/h to m/s, the conversion WeatherAPI and QWeather wind speeds need.
pub(crate) fn kmh_to_ms(kmh: f64) -> f64 {
    kmh / 3.6
}
