//! The aggregation facade the UI talks to.
//!
//! Resolves which provider serves a request, consults the cache, dispatches
//! to the adapter on a miss and writes the result back. Bulk refresh fans
//! out through the bounded executor so one slow or failing city never stalls
//! or poisons the rest of the dashboard.

use anyhow::Context;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::Settings;
use crate::error::WeatherError;
use crate::limit::{self, DEFAULT_CONCURRENCY};
use crate::model::{CitySearchResult, Coordinates, TrackedLocation, WeatherSnapshot};
use crate::provider::{FetchRequest, ProviderId, provider_from_settings};

/// Well-known probe query for key verification: succeeds on any provider and
/// any language as long as the credentials work.
const VERIFY_QUERY: &str = "Beijing";

pub struct WeatherService {
    settings: Settings,
    cache: CacheManager,
    http: Client,
}

impl WeatherService {
    /// The cache is constructed by the embedder and passed in, so tests and
    /// multiple service instances can share (or isolate) backing stores.
    pub fn new(settings: Settings, cache: CacheManager) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { settings, cache, http })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Effective provider: explicit override (per-call or per-location, the
    /// caller merges those) > global default > custom when an endpoint URL is
    /// configured. Nothing selected is a configuration error, so the UI can
    /// route the user to settings instead of showing a generic failure.
    fn resolve_source(&self, preferred: Option<ProviderId>) -> Result<ProviderId, WeatherError> {
        if let Some(id) = preferred {
            return Ok(id);
        }
        if let Some(id) = self
            .settings
            .default_source()
            .map_err(|e| WeatherError::configuration(e.to_string()))?
        {
            return Ok(id);
        }
        if self.settings.custom_url.is_some() {
            return Ok(ProviderId::Custom);
        }
        Err(WeatherError::configuration(
            "No weather provider selected. Choose a provider in settings.",
        ))
    }

    /// Fetch the current snapshot for a city, consulting the cache first.
    pub async fn get_weather(
        &self,
        city: &str,
        preferred: Option<ProviderId>,
        lang: &str,
        coords: Option<Coordinates>,
    ) -> Result<WeatherSnapshot, WeatherError> {
        let id = self.resolve_source(preferred)?;
        let ttl = self.settings.cache_ttl();
        let time_format = self.settings.time_format;

        if let Some(cached) =
            self.cache.get(city, id.as_str(), lang, coords, ttl, time_format).await
        {
            debug!(city, source = %id, "serving cached snapshot");
            return Ok(cached);
        }

        let provider = provider_from_settings(id, &self.settings, &self.http)?;
        let request = FetchRequest {
            city: city.to_string(),
            lang: lang.to_string(),
            coords,
            time_format,
        };
        let snapshot = provider.fetch(&request).await?;

        self.cache.set(city, id.as_str(), lang, coords, time_format, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// City autocomplete via the active provider. Search is advisory, so an
    /// unconfigured provider yields an empty list rather than an error.
    pub async fn search_cities(
        &self,
        query: &str,
        lang: &str,
    ) -> Result<Vec<CitySearchResult>, WeatherError> {
        let id = match self.resolve_source(None) {
            Ok(id) => id,
            Err(e) if e.is_configuration() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let provider = match provider_from_settings(id, &self.settings, &self.http) {
            Ok(p) => p,
            Err(e) if e.is_configuration() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        provider.search(query, lang).await
    }

    /// Check that an API key works before it is saved: one probe search must
    /// return at least one hit. Deliberately conservative, not a health
    /// check. The custom source has no verification protocol and always
    /// passes.
    pub async fn verify_connection(
        &self,
        source: ProviderId,
        api_key: &str,
        lang: &str,
        host: Option<&str>,
    ) -> Result<bool, WeatherError> {
        if source == ProviderId::Custom {
            return Ok(true);
        }

        let mut settings = self.settings.clone();
        settings.api_keys.insert(source.as_str().to_string(), api_key.to_string());
        if let Some(host) = host {
            settings.qweather_host = Some(host.to_string());
        }

        let provider = provider_from_settings(source, &settings, &self.http)?;
        let hits = provider.search(VERIFY_QUERY, lang).await?;
        Ok(!hits.is_empty())
    }

    /// Refresh every tracked location with at most 5 fetches in flight.
    ///
    /// Returns one slot per location, in input order. A failed city falls
    /// back to its previous snapshot (or `None` when there is none) instead
    /// of failing the batch; `on_progress` fires per completion so a UI can
    /// fill in cities incrementally.
    pub async fn refresh_all<P>(
        &self,
        locations: &[TrackedLocation],
        previous: &HashMap<String, WeatherSnapshot>,
        lang: &str,
        on_progress: P,
    ) -> Vec<Option<WeatherSnapshot>>
    where
        P: FnMut(usize, &Option<WeatherSnapshot>),
    {
        limit::map_bounded(
            locations.to_vec(),
            DEFAULT_CONCURRENCY,
            |location| async move {
                let preferred = location
                    .source
                    .as_deref()
                    .and_then(|s| ProviderId::try_from(s).ok());
                match self.get_weather(&location.name, preferred, lang, location.coords()).await {
                    Ok(mut snapshot) => {
                        snapshot.source_override = location.source.clone();
                        Some(snapshot)
                    }
                    Err(e) => {
                        warn!(city = %location.name, error = %e, "refresh failed; keeping previous snapshot");
                        previous.get(&location.name).cloned()
                    }
                }
            },
            on_progress,
        )
        .await
    }
}
