use serde::{Deserialize, Serialize};

/// Decimal-degree coordinates, latitude first.
///
/// Note that QWeather's geo endpoints expect the opposite ("lon,lat") ordering
/// on the wire; the adapter does that flip itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One hourly forecast slot, covering roughly three hours.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HourlyEntry {
    /// Display time, already rendered in the configured 12h/24h format.
    pub time: String,
    /// Rounded °C.
    pub temperature: i32,
    pub condition: String,
    pub icon: String,
}

/// One daily forecast slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyEntry {
    /// Provider-local calendar date string.
    pub date: String,
    pub temp_min: i32,
    pub temp_max: i32,
    pub condition: String,
    pub icon: String,
}

/// Air quality block. The `aqi` scale is nominally 1-5; WeatherAPI's
/// us-epa-index (1-6) and QWeather's level (1-6) are passed through as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AirQuality {
    pub aqi: u8,
    pub pm25: f64,
    pub pm10: f64,
    pub o3: f64,
    pub no2: f64,
}

/// The unified weather record every adapter produces.
///
/// Serialized in camelCase: this is both the cache's persisted JSON shape and
/// the wire contract a custom endpoint must emit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherSnapshot {
    /// Resolved city name; may be localized by the provider.
    pub city: String,
    /// Rounded °C.
    pub temperature: i32,
    /// Free-text description in the requested language.
    pub condition: String,
    /// Relative humidity, percent.
    pub humidity: u8,
    /// Metres per second, converted from provider units where needed.
    pub wind_speed: f64,
    pub feels_like: i32,
    /// hPa.
    pub pressure: u32,
    /// Kilometres.
    pub visibility: f64,
    /// 0.0 when the provider has no UV data.
    pub uv_index: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunrise: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunset: Option<String>,
    /// Up to 8 entries spanning ~24h.
    pub hourly_forecast: Vec<HourlyEntry>,
    /// Typically 7-8 entries; WeatherAPI prepends yesterday when available.
    pub daily_forecast: Vec<DailyEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_quality: Option<AirQuality>,
    /// Provider identifier that produced this snapshot.
    pub source: String,
    /// Per-location pinned provider, if any; distinct from the global default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_override: Option<String>,
    /// Always populated from the provider's resolved location, even when the
    /// caller supplied only a city name. Enables coordinate-keyed caching.
    pub lat: f64,
    pub lon: f64,
}

/// A user-saved dashboard entry. The UI owns membership and ordering; the
/// aggregation layer only reads and enriches these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedLocation {
    pub name: String,
    /// Pinned provider for this location, overriding the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl TrackedLocation {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), source: None, lat: None, lon: None }
    }

    /// Coordinates, when both components are stored.
    pub fn coords(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        }
    }
}

/// A single autocomplete / lookup hit. Transient: produced by search,
/// consumed immediately by selection, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitySearchResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub lat: f64,
    pub lon: f64,
    /// Provider-specific location id (QWeather needs it for weather calls).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl CitySearchResult {
    /// "Name, Region, Country" with empty parts dropped.
    pub fn display_label(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if let Some(region) = self.region.as_ref().filter(|r| !r.is_empty()) {
            parts.push(region.clone());
        }
        if let Some(country) = self.country.as_ref().filter(|c| !c.is_empty()) {
            parts.push(country.clone());
        }
        parts.join(", ")
    }
}
