use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::WeatherError;
use crate::model::{
    AirQuality, CitySearchResult, Coordinates, DailyEntry, HourlyEntry, WeatherSnapshot,
};
use crate::provider::{FetchRequest, ProviderId, WeatherProvider, request_json, round_temp};
use crate::timefmt::{self, TimeFormat};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// How many 3-hour forecast slots make up the ~24h hourly strip.
const HOURLY_SLOTS: usize = 8;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self { api_key, http, base_url: DEFAULT_BASE_URL.to_string() }
    }

    /// Point the adapter at a different deployment (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn location_params(&self, request: &FetchRequest) -> Vec<(&'static str, String)> {
        let mut params = match request.coords {
            Some(c) => vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())],
            None => vec![("q", request.city.clone())],
        };
        params.push(("appid", self.api_key.clone()));
        params.push(("units", "metric".to_string()));
        params.push(("lang", map_lang(&request.lang).to_string()));
        params
    }

    async fn fetch_current(&self, request: &FetchRequest) -> Result<OwCurrent, WeatherError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        request_json(&self.http, ProviderId::OpenWeather, &url, &self.location_params(request))
            .await
    }

    async fn fetch_forecast(&self, request: &FetchRequest) -> Result<OwForecast, WeatherError> {
        let url = format!("{}/data/2.5/forecast", self.base_url);
        request_json(&self.http, ProviderId::OpenWeather, &url, &self.location_params(request))
            .await
    }

    async fn fetch_air(&self, coords: Coordinates) -> Result<OwAirResponse, WeatherError> {
        let url = format!("{}/data/2.5/air_pollution", self.base_url);
        let params = [
            ("lat", coords.lat.to_string()),
            ("lon", coords.lon.to_string()),
            ("appid", self.api_key.clone()),
        ];
        request_json(&self.http, ProviderId::OpenWeather, &url, &params).await
    }

    fn build_snapshot(
        &self,
        current: OwCurrent,
        forecast: Option<OwForecast>,
        air: Option<OwAirResponse>,
        time_format: TimeFormat,
    ) -> WeatherSnapshot {
        let condition = current
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let (hourly, daily) = match &forecast {
            Some(f) => (hourly_strip(&f.list, time_format), group_daily(&f.list)),
            None => (Vec::new(), Vec::new()),
        };

        let air_quality = air.and_then(|a| a.list.into_iter().next()).map(|entry| AirQuality {
            aqi: entry.main.aqi,
            pm25: entry.components.pm2_5,
            pm10: entry.components.pm10,
            o3: entry.components.o3,
            no2: entry.components.no2,
        });

        let sunrise = current
            .sys
            .as_ref()
            .and_then(|s| s.sunrise)
            .and_then(|ts| format_epoch(ts, current.timezone, time_format));
        let sunset = current
            .sys
            .as_ref()
            .and_then(|s| s.sunset)
            .and_then(|ts| format_epoch(ts, current.timezone, time_format));

        WeatherSnapshot {
            city: current.name,
            temperature: round_temp(current.main.temp),
            condition,
            humidity: current.main.humidity,
            // Already m/s under units=metric.
            wind_speed: current.wind.speed,
            feels_like: round_temp(current.main.feels_like),
            pressure: current.main.pressure,
            visibility: current.visibility.map(|m| m / 1000.0).unwrap_or_default(),
            uv_index: 0.0,
            sunrise,
            sunset,
            hourly_forecast: hourly,
            daily_forecast: daily,
            air_quality,
            source: ProviderId::OpenWeather.to_string(),
            source_override: None,
            lat: current.coord.lat,
            lon: current.coord.lon,
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherSnapshot, WeatherError> {
        // Air pollution needs resolved coordinates. When the caller already
        // has them all three calls go out together; otherwise the air call
        // waits for the current-weather response to yield coordinates.
        if let Some(coords) = request.coords {
            let (current, forecast, air) = tokio::join!(
                self.fetch_current(request),
                self.fetch_forecast(request),
                self.fetch_air(coords),
            );
            let current = current?;
            Ok(self.build_snapshot(
                current,
                best_effort("forecast", forecast),
                best_effort("air quality", air),
                request.time_format,
            ))
        } else {
            let (current, forecast) =
                tokio::join!(self.fetch_current(request), self.fetch_forecast(request));
            let current = current?;
            let resolved = Coordinates { lat: current.coord.lat, lon: current.coord.lon };
            let air = best_effort("air quality", self.fetch_air(resolved).await);
            Ok(self.build_snapshot(
                current,
                best_effort("forecast", forecast),
                air,
                request.time_format,
            ))
        }
    }

    async fn search(
        &self,
        query: &str,
        _lang: &str,
    ) -> Result<Vec<CitySearchResult>, WeatherError> {
        let url = format!("{}/geo/1.0/direct", self.base_url);
        let params =
            [("q", query.to_string()), ("limit", "10".to_string()), ("appid", self.api_key.clone())];
        let hits: Vec<OwGeoHit> =
            request_json(&self.http, ProviderId::OpenWeather, &url, &params).await?;

        Ok(hits
            .into_iter()
            .map(|hit| CitySearchResult {
                name: hit.name,
                region: hit.state,
                country: hit.country,
                lat: hit.lat,
                lon: hit.lon,
                id: None,
            })
            .collect())
    }
}

/// OpenWeather wants `zh_cn` where the rest of the system says `zh`.
fn map_lang(lang: &str) -> &str {
    match lang {
        "zh" => "zh_cn",
        other => other,
    }
}

fn best_effort<T>(what: &str, result: Result<T, WeatherError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "openweather {what} request failed; field omitted");
            None
        }
    }
}

/// Local wall-clock time of a UTC timestamp shifted by the city's UTC offset.
fn format_epoch(ts: i64, offset_secs: i64, format: TimeFormat) -> Option<String> {
    use chrono::Timelike;
    let local = chrono::DateTime::from_timestamp(ts + offset_secs, 0)?;
    Some(timefmt::format_hm(local.hour(), local.minute(), format))
}

/// First 8 forecast entries verbatim; at 3-hour spacing that covers ~24h.
fn hourly_strip(entries: &[OwForecastEntry], time_format: TimeFormat) -> Vec<HourlyEntry> {
    entries
        .iter()
        .take(HOURLY_SLOTS)
        .map(|entry| HourlyEntry {
            time: entry
                .dt_txt
                .get(11..16)
                .and_then(|hm| timefmt::reformat(hm, time_format))
                .unwrap_or_default(),
            temperature: round_temp(entry.main.temp),
            condition: entry
                .weather
                .first()
                .map(|w| w.description.clone())
                .unwrap_or_default(),
            icon: entry.weather.first().map(|w| w.icon.clone()).unwrap_or_default(),
        })
        .collect()
}

/// Fold the 3-hourly list into per-calendar-day min/max entries, keyed by the
/// provider's local date string with `-` separators normalized to `/`.
fn group_daily(entries: &[OwForecastEntry]) -> Vec<DailyEntry> {
    let mut days: Vec<DailyEntry> = Vec::new();

    for entry in entries {
        let Some(date_part) = entry.dt_txt.get(..10) else {
            continue;
        };
        let date = date_part.replace('-', "/");
        let temp_min = round_temp(entry.main.temp_min);
        let temp_max = round_temp(entry.main.temp_max);

        match days.iter_mut().find(|d| d.date == date) {
            Some(day) => {
                day.temp_min = day.temp_min.min(temp_min);
                day.temp_max = day.temp_max.max(temp_max);
            }
            None => days.push(DailyEntry {
                date,
                temp_min,
                temp_max,
                condition: entry
                    .weather
                    .first()
                    .map(|w| w.description.clone())
                    .unwrap_or_default(),
                icon: entry.weather.first().map(|w| w.icon.clone()).unwrap_or_default(),
            }),
        }
    }

    days
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
    pressure: u32,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    name: String,
    coord: OwCoord,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    /// Metres.
    visibility: Option<f64>,
    sys: Option<OwSys>,
    /// Seconds east of UTC.
    #[serde(default)]
    timezone: i64,
}

#[derive(Debug, Deserialize)]
struct OwForecastMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt_txt: String,
    main: OwForecastMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecast {
    list: Vec<OwForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct OwAirMain {
    aqi: u8,
}

#[derive(Debug, Deserialize)]
struct OwAirComponents {
    #[serde(default)]
    pm2_5: f64,
    #[serde(default)]
    pm10: f64,
    #[serde(default)]
    o3: f64,
    #[serde(default)]
    no2: f64,
}

#[derive(Debug, Deserialize)]
struct OwAirEntry {
    main: OwAirMain,
    components: OwAirComponents,
}

#[derive(Debug, Deserialize)]
struct OwAirResponse {
    list: Vec<OwAirEntry>,
}

#[derive(Debug, Deserialize)]
struct OwGeoHit {
    name: String,
    lat: f64,
    lon: f64,
    country: Option<String>,
    state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dt_txt: &str, temp: f64, min: f64, max: f64) -> OwForecastEntry {
        OwForecastEntry {
            dt_txt: dt_txt.to_string(),
            main: OwForecastMain { temp, temp_min: min, temp_max: max },
            weather: vec![OwWeather { description: "light rain".into(), icon: "10d".into() }],
        }
    }

    #[test]
    fn daily_grouping_spans_calendar_days() {
        let entries = vec![
            entry("2024-03-01 06:00:00", 4.0, 3.0, 5.0),
            entry("2024-03-01 12:00:00", 9.0, 8.0, 10.0),
            entry("2024-03-01 18:00:00", 6.0, 5.0, 7.0),
            entry("2024-03-02 06:00:00", 2.0, 1.0, 3.0),
            entry("2024-03-02 12:00:00", 7.0, 6.0, 8.0),
        ];

        let days = group_daily(&entries);
        assert_eq!(days.len(), 2);

        assert_eq!(days[0].date, "2024/03/01");
        assert_eq!(days[0].temp_min, 3);
        assert_eq!(days[0].temp_max, 10);

        assert_eq!(days[1].date, "2024/03/02");
        assert_eq!(days[1].temp_min, 1);
        assert_eq!(days[1].temp_max, 8);
    }

    #[test]
    fn hourly_strip_takes_first_eight_entries() {
        let entries: Vec<OwForecastEntry> = (0..12)
            .map(|i| entry(&format!("2024-03-01 {:02}:00:00", i * 2), 5.0, 4.0, 6.0))
            .collect();

        let hourly = hourly_strip(&entries, TimeFormat::H24);
        assert_eq!(hourly.len(), 8);
        assert_eq!(hourly[0].time, "00:00");
        assert_eq!(hourly[7].time, "14:00");
        assert_eq!(hourly[0].condition, "light rain");
    }

    #[test]
    fn hourly_strip_honors_12h_format() {
        let entries = vec![entry("2024-03-01 15:00:00", 5.0, 4.0, 6.0)];
        let hourly = hourly_strip(&entries, TimeFormat::H12);
        assert_eq!(hourly[0].time, "3:00 PM");
    }

    #[test]
    fn lang_mapping_only_rewrites_chinese() {
        assert_eq!(map_lang("zh"), "zh_cn");
        assert_eq!(map_lang("en"), "en");
        assert_eq!(map_lang("de"), "de");
    }

    #[test]
    fn epoch_formatting_applies_utc_offset() {
        // 2024-03-01 06:30:00 UTC, +2h offset -> 08:30 local.
        let ts = 1709274600;
        assert_eq!(format_epoch(ts, 7200, TimeFormat::H24).as_deref(), Some("08:30"));
        assert_eq!(format_epoch(ts, 7200, TimeFormat::H12).as_deref(), Some("8:30 AM"));
    }
}
