//! TTL-aware snapshot cache with debounced persistence.
//!
//! Sits between the aggregation facade and the provider adapters. Entries
//! live in memory keyed by provider/language/location; the whole map is
//! mirrored into the key-value store behind a coalescing window so a bulk
//! refresh of many cities costs one write, not one per city.
//!
//! Consistency is deliberately relaxed: no lock is held across a fetch, so
//! two near-simultaneous misses on one key may both hit the provider and the
//! later write wins. Weather tolerates minutes of staleness, so that trade
//! is documented rather than "fixed".

use crate::error::WeatherError;
use crate::model::{Coordinates, WeatherSnapshot};
use crate::store::KvStore;
use crate::timefmt::TimeFormat;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Store key the serialized cache map lives under.
pub const CACHE_STORE_KEY: &str = "weather_cache";

/// Coalescing window for persistence writes.
const PERSIST_DEBOUNCE: Duration = Duration::from_secs(2);

/// One cached snapshot plus the context it was fetched under. A cached entry
/// is only served when its language, source and baked-in time format all
/// match the current request; a 12h/24h settings flip therefore forces a
/// re-fetch even inside the TTL window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: WeatherSnapshot,
    /// Epoch milliseconds at fetch time.
    pub timestamp: i64,
    pub lang: String,
    pub source: String,
    pub time_format: TimeFormat,
}

/// Compute the cache key for a request: coordinate-based when coordinates are
/// known, otherwise lowercased city name.
pub fn cache_key(source: &str, lang: &str, city: &str, coords: Option<Coordinates>) -> String {
    match coords {
        Some(c) => format!("{source}:{lang}:lat_{:.2}_lon_{:.2}", c.lat, c.lon),
        None => format!("{source}:{lang}:{}", city.to_lowercase()),
    }
}

/// Keyed, TTL-aware cache in front of the provider adapters.
///
/// Constructed explicitly over a [`KvStore`] and passed by reference to the
/// facade, so tests get isolation without global-state resets.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn KvStore>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Memoizes the initial load; concurrent callers share one in-flight read.
    loaded: OnceCell<()>,
    pending_flush: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_debounce(store, PERSIST_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<dyn KvStore>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                entries: Mutex::new(HashMap::new()),
                loaded: OnceCell::new(),
                pending_flush: Mutex::new(None),
                debounce,
            }),
        }
    }

    /// Look up a still-valid snapshot. A stale or format-mismatched entry is
    /// evicted as a side effect of the check.
    pub async fn get(
        &self,
        city: &str,
        source: &str,
        lang: &str,
        coords: Option<Coordinates>,
        ttl: Duration,
        time_format: TimeFormat,
    ) -> Option<WeatherSnapshot> {
        self.ensure_loaded().await;
        let key = cache_key(source, lang, city, coords);
        self.check(&key, Utc::now().timestamp_millis(), ttl, time_format).await
    }

    async fn check(
        &self,
        key: &str,
        now_ms: i64,
        ttl: Duration,
        time_format: TimeFormat,
    ) -> Option<WeatherSnapshot> {
        let mut entries = self.inner.entries.lock().await;
        let entry = entries.get(key)?;

        let age_ms = now_ms - entry.timestamp;
        if age_ms < ttl.as_millis() as i64 && entry.time_format == time_format {
            debug!(key, age_ms, "cache hit");
            return Some(entry.data.clone());
        }

        debug!(key, age_ms, "evicting stale or format-mismatched entry");
        entries.remove(key);
        None
    }

    /// Insert a fresh snapshot and schedule a coalesced persistence write.
    pub async fn set(
        &self,
        city: &str,
        source: &str,
        lang: &str,
        coords: Option<Coordinates>,
        time_format: TimeFormat,
        snapshot: WeatherSnapshot,
    ) {
        self.ensure_loaded().await;
        let key = cache_key(source, lang, city, coords);
        let entry = CacheEntry {
            data: snapshot,
            timestamp: Utc::now().timestamp_millis(),
            lang: lang.to_string(),
            source: source.to_string(),
            time_format,
        };

        self.inner.entries.lock().await.insert(key, entry);
        self.schedule_flush().await;
    }

    /// Persist immediately, draining any pending debounced write. Call on
    /// shutdown so the coalescing window cannot drop the last write.
    pub async fn flush(&self) -> Result<(), WeatherError> {
        if let Some(handle) = self.inner.pending_flush.lock().await.take() {
            handle.abort();
        }
        self.inner.persist_now().await
    }

    async fn ensure_loaded(&self) {
        let inner = &self.inner;
        inner
            .loaded
            .get_or_init(|| async {
                match inner.store.get(CACHE_STORE_KEY).await {
                    Ok(Some(value)) => {
                        match serde_json::from_value::<HashMap<String, CacheEntry>>(value) {
                            Ok(map) => {
                                debug!(entries = map.len(), "loaded weather cache");
                                *inner.entries.lock().await = map;
                            }
                            Err(e) => {
                                warn!(error = %e, "discarding unreadable weather cache");
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "cache load failed; starting empty"),
                }
            })
            .await;
    }

    /// Debounce: every call restarts the window, so a burst of sets inside it
    /// collapses into the single write that fires once the burst quiets down.
    async fn schedule_flush(&self) {
        let mut pending = self.inner.pending_flush.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if let Err(e) = inner.persist_now().await {
                warn!(error = %e, "debounced cache write failed");
            }
        }));
    }
}

impl Inner {
    async fn persist_now(&self) -> Result<(), WeatherError> {
        let serialized = {
            let entries = self.entries.lock().await;
            serde_json::to_value(&*entries).map_err(|e| WeatherError::Cache(e.to_string()))?
        };

        self.store
            .set(CACHE_STORE_KEY, serialized)
            .await
            .map_err(|e| WeatherError::Cache(e.to_string()))
    }
}
