use async_trait::async_trait;
use chrono::{Days, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::WeatherError;
use crate::model::{AirQuality, CitySearchResult, DailyEntry, HourlyEntry, WeatherSnapshot};
use crate::provider::{
    FetchRequest, ProviderId, WeatherProvider, kmh_to_ms, request_json, round_temp,
};
use crate::timefmt::{self, TimeFormat};

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

const FORECAST_DAYS: &str = "7";

/// Sample every 3rd hour of day 0, up to 8 slots.
const HOURLY_STEP: usize = 3;
const HOURLY_SLOTS: usize = 8;

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self { api_key, http, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// WeatherAPI takes a combined "lat,lon" query when coordinates are known.
    fn location_query(request: &FetchRequest) -> String {
        match request.coords {
            Some(c) => format!("{},{}", c.lat, c.lon),
            None => request.city.clone(),
        }
    }

    async fn fetch_forecast(&self, request: &FetchRequest) -> Result<WaForecastResponse, WeatherError> {
        let url = format!("{}/forecast.json", self.base_url);
        let params = [
            ("key", self.api_key.clone()),
            ("q", Self::location_query(request)),
            ("days", FORECAST_DAYS.to_string()),
            ("aqi", "yes".to_string()),
            ("lang", request.lang.clone()),
        ];
        request_json(&self.http, ProviderId::WeatherApi, &url, &params).await
    }

    /// The only provider that back-fills a past day: yesterday's history is
    /// prepended to the daily forecast when the call succeeds.
    async fn fetch_yesterday(&self, request: &FetchRequest) -> Result<WaForecastResponse, WeatherError> {
        let yesterday = Utc::now()
            .date_naive()
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| WeatherError::decode(ProviderId::WeatherApi, "date underflow"))?;

        let url = format!("{}/history.json", self.base_url);
        let params = [
            ("key", self.api_key.clone()),
            ("q", Self::location_query(request)),
            ("dt", yesterday.format("%Y-%m-%d").to_string()),
            ("lang", request.lang.clone()),
        ];
        request_json(&self.http, ProviderId::WeatherApi, &url, &params).await
    }

    fn build_snapshot(
        &self,
        forecast: WaForecastResponse,
        yesterday: Option<WaForecastResponse>,
        time_format: TimeFormat,
    ) -> WeatherSnapshot {
        let current = forecast.current;
        let location = forecast.location;

        let mut daily: Vec<DailyEntry> =
            forecast.forecast.forecastday.iter().map(daily_entry).collect();
        if let Some(history) = yesterday
            && let Some(day) = history.forecast.forecastday.first()
        {
            daily.insert(0, daily_entry(day));
        }

        let today = forecast.forecast.forecastday.first();
        let hourly = today.map(|day| hourly_strip(&day.hour, time_format)).unwrap_or_default();

        let sunrise = today
            .and_then(|d| d.astro.as_ref())
            .and_then(|a| timefmt::reformat(&a.sunrise, time_format));
        let sunset = today
            .and_then(|d| d.astro.as_ref())
            .and_then(|a| timefmt::reformat(&a.sunset, time_format));

        // us-epa-index runs 1-6; it is reused as the unified AQI without
        // remapping, a documented approximation.
        let air_quality = current.air_quality.and_then(|aq| {
            aq.us_epa_index.map(|index| AirQuality {
                aqi: index,
                pm25: aq.pm2_5.unwrap_or_default(),
                pm10: aq.pm10.unwrap_or_default(),
                o3: aq.o3.unwrap_or_default(),
                no2: aq.no2.unwrap_or_default(),
            })
        });

        WeatherSnapshot {
            city: location.name,
            temperature: round_temp(current.temp_c),
            condition: current.condition.text,
            humidity: current.humidity,
            wind_speed: kmh_to_ms(current.wind_kph),
            feels_like: round_temp(current.feelslike_c),
            pressure: current.pressure_mb.round() as u32,
            visibility: current.vis_km,
            uv_index: current.uv.unwrap_or_default(),
            sunrise,
            sunset,
            hourly_forecast: hourly,
            daily_forecast: daily,
            air_quality,
            source: ProviderId::WeatherApi.to_string(),
            source_override: None,
            lat: location.lat,
            lon: location.lon,
        }
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherSnapshot, WeatherError> {
        let (forecast, yesterday) =
            tokio::join!(self.fetch_forecast(request), self.fetch_yesterday(request));
        let forecast = forecast?;

        let yesterday = match yesterday {
            Ok(history) => Some(history),
            Err(e) => {
                warn!(error = %e, "weatherapi history request failed; yesterday omitted");
                None
            }
        };

        Ok(self.build_snapshot(forecast, yesterday, request.time_format))
    }

    async fn search(
        &self,
        query: &str,
        lang: &str,
    ) -> Result<Vec<CitySearchResult>, WeatherError> {
        let url = format!("{}/search.json", self.base_url);
        let params = [
            ("key", self.api_key.clone()),
            ("q", query.to_string()),
            ("lang", lang.to_string()),
        ];
        let hits: Vec<WaSearchHit> =
            request_json(&self.http, ProviderId::WeatherApi, &url, &params).await?;

        Ok(hits
            .into_iter()
            .map(|hit| CitySearchResult {
                name: hit.name,
                region: hit.region.filter(|r| !r.is_empty()),
                country: hit.country.filter(|c| !c.is_empty()),
                lat: hit.lat,
                lon: hit.lon,
                id: hit.id.map(|id| id.to_string()),
            })
            .collect())
    }
}

fn daily_entry(day: &WaForecastDay) -> DailyEntry {
    DailyEntry {
        date: day.date.clone(),
        temp_min: round_temp(day.day.mintemp_c),
        temp_max: round_temp(day.day.maxtemp_c),
        condition: day.day.condition.text.clone(),
        icon: day.day.condition.icon.clone(),
    }
}

fn hourly_strip(hours: &[WaHour], time_format: TimeFormat) -> Vec<HourlyEntry> {
    hours
        .iter()
        .step_by(HOURLY_STEP)
        .take(HOURLY_SLOTS)
        .map(|hour| HourlyEntry {
            // "2024-03-01 05:00" -> "05:00", re-rendered per the display format.
            time: hour
                .time
                .split_whitespace()
                .last()
                .and_then(|hm| timefmt::reformat(hm, time_format))
                .unwrap_or_default(),
            temperature: round_temp(hour.temp_c),
            condition: hour.condition.text.clone(),
            icon: hour.condition.icon.clone(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WaAirQuality {
    #[serde(rename = "us-epa-index")]
    us_epa_index: Option<u8>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    o3: Option<f64>,
    no2: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    feelslike_c: f64,
    humidity: u8,
    wind_kph: f64,
    pressure_mb: f64,
    #[serde(default)]
    vis_km: f64,
    uv: Option<f64>,
    condition: WaCondition,
    air_quality: Option<WaAirQuality>,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaAstro {
    sunrise: String,
    sunset: String,
}

#[derive(Debug, Deserialize)]
struct WaHour {
    time: String,
    temp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date: String,
    day: WaDay,
    astro: Option<WaAstro>,
    #[serde(default)]
    hour: Vec<WaHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    location: WaLocation,
    current: WaCurrent,
    forecast: WaForecast,
}

#[derive(Debug, Deserialize)]
struct WaSearchHit {
    id: Option<i64>,
    name: String,
    region: Option<String>,
    country: Option<String>,
    lat: f64,
    lon: f64,
}
