use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::WeatherError;
use crate::model::{CitySearchResult, WeatherSnapshot};
use crate::provider::{FetchRequest, ProviderId, WeatherProvider, request_json};

/// Fields a custom endpoint must populate; anything else is optional.
const REQUIRED_FIELDS: &[&str] = &["city", "temperature", "hourlyForecast", "dailyForecast"];

/// A user-supplied endpoint that already speaks the unified snapshot shape.
/// One GET with `{city, key, lang}` query params; no structural transform is
/// applied beyond checking the mandatory fields are present.
#[derive(Debug, Clone)]
pub struct CustomProvider {
    url: String,
    api_key: String,
    http: Client,
}

impl CustomProvider {
    pub fn new(url: String, api_key: String, http: Client) -> Self {
        Self { url, api_key, http }
    }
}

#[async_trait]
impl WeatherProvider for CustomProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Custom
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherSnapshot, WeatherError> {
        let params = [
            ("city", request.city.clone()),
            ("key", self.api_key.clone()),
            ("lang", request.lang.clone()),
        ];
        let payload: Value =
            request_json(&self.http, ProviderId::Custom, &self.url, &params).await?;

        validate_shape(&payload)?;

        let mut snapshot: WeatherSnapshot = serde_json::from_value(payload)
            .map_err(|e| WeatherError::decode(ProviderId::Custom, e))?;
        snapshot.source = ProviderId::Custom.to_string();
        Ok(snapshot)
    }

    /// No generic search protocol exists for arbitrary endpoints.
    async fn search(
        &self,
        _query: &str,
        _lang: &str,
    ) -> Result<Vec<CitySearchResult>, WeatherError> {
        Ok(Vec::new())
    }
}

fn validate_shape(payload: &Value) -> Result<(), WeatherError> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .filter(|field| payload.get(**field).is_none())
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WeatherError::decode(
            ProviderId::Custom,
            format!("response is missing required fields: {}", missing.join(", ")),
        ))
    }
}
