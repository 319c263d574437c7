use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::WeatherError;
use crate::model::{AirQuality, CitySearchResult, DailyEntry, HourlyEntry, WeatherSnapshot};
use crate::provider::{
    FetchRequest, ProviderId, WeatherProvider, kmh_to_ms, request_json, round_temp,
};
use crate::timefmt::{self, TimeFormat};

const DEFAULT_HOST: &str = "devapi.qweather.com";

/// Sample every 3rd entry of the 24h array, up to 8 slots.
const HOURLY_STEP: usize = 3;
const HOURLY_SLOTS: usize = 8;

/// QWeather answers HTTP 200 and carries its real status in `code`.
const CODE_OK: &str = "200";
const CODE_NOT_FOUND: &str = "404";

#[derive(Debug, Clone)]
pub struct QWeatherProvider {
    api_key: String,
    http: Client,
    /// `https://{host}/v7`
    api_base: String,
    /// `https://{host}/geo/v2`
    geo_base: String,
}

impl QWeatherProvider {
    /// `host` may be a custom deployment mirror; protocol prefixes and a
    /// trailing slash are stripped before the bases are composed.
    pub fn new(api_key: String, host: Option<&str>, http: Client) -> Self {
        let host = normalize_host(host);
        Self {
            api_key,
            http,
            api_base: format!("https://{host}/v7"),
            geo_base: format!("https://{host}/geo/v2"),
        }
    }

    /// Point both bases at one test server, bypassing host composition.
    pub fn with_base_urls(mut self, api_base: impl Into<String>, geo_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.geo_base = geo_base.into();
        self
    }

    async fn lookup(&self, location: &str, lang: &str) -> Result<Vec<QwGeoHit>, WeatherError> {
        let url = format!("{}/city/lookup", self.geo_base);
        let params = [
            ("location", location.to_string()),
            ("key", self.api_key.clone()),
            ("lang", lang.to_string()),
        ];
        let res: QwGeoResponse =
            request_json(&self.http, ProviderId::QWeather, &url, &params).await?;

        match res.code.as_str() {
            CODE_OK => Ok(res.location.unwrap_or_default()),
            CODE_NOT_FOUND => Ok(Vec::new()),
            code => Err(WeatherError::lookup(
                ProviderId::QWeather,
                format!("geo lookup returned code {code}"),
            )),
        }
    }

    async fn fetch_now(&self, location: &str, lang: &str) -> Result<QwNow, WeatherError> {
        let res: QwNowResponse =
            self.weather_call("weather/now", location, lang, &[]).await?;
        check_code(&res.code, "weather/now")?;
        Ok(res.now)
    }

    async fn fetch_daily(&self, location: &str, lang: &str) -> Result<Vec<QwDaily>, WeatherError> {
        let res: QwDailyResponse =
            self.weather_call("weather/7d", location, lang, &[]).await?;
        check_code(&res.code, "weather/7d")?;
        Ok(res.daily)
    }

    async fn fetch_hourly(&self, location: &str, lang: &str) -> Result<Vec<QwHourly>, WeatherError> {
        let res: QwHourlyResponse =
            self.weather_call("weather/24h", location, lang, &[]).await?;
        check_code(&res.code, "weather/24h")?;
        Ok(res.hourly)
    }

    async fn fetch_air(&self, location: &str, lang: &str) -> Result<QwAirNow, WeatherError> {
        let res: QwAirResponse = self.weather_call("air/now", location, lang, &[]).await?;
        check_code(&res.code, "air/now")?;
        Ok(res.now)
    }

    async fn fetch_astronomy(&self, location: &str, lang: &str) -> Result<QwAstro, WeatherError> {
        let date = Utc::now().format("%Y%m%d").to_string();
        let res: QwAstro =
            self.weather_call("astronomy/sun", location, lang, &[("date", date)]).await?;
        check_code(&res.code, "astronomy/sun")?;
        Ok(res)
    }

    async fn weather_call<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        location: &str,
        lang: &str,
        extra: &[(&'static str, String)],
    ) -> Result<T, WeatherError> {
        let url = format!("{}/{path}", self.api_base);
        let mut params = vec![
            ("location", location.to_string()),
            ("key", self.api_key.clone()),
            ("lang", lang.to_string()),
        ];
        params.extend(extra.iter().cloned());
        request_json(&self.http, ProviderId::QWeather, &url, &params).await
    }

    #[allow(clippy::too_many_arguments)]
    fn build_snapshot(
        &self,
        hit: &QwGeoHit,
        now: QwNow,
        daily: Vec<QwDaily>,
        hourly: Vec<QwHourly>,
        air: Option<QwAirNow>,
        astro: Option<QwAstro>,
        fallback_coords: Option<crate::model::Coordinates>,
        time_format: TimeFormat,
    ) -> WeatherSnapshot {
        let (lat, lon) = match (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => (lat, lon),
            _ => fallback_coords.map(|c| (c.lat, c.lon)).unwrap_or_default(),
        };

        let uv_index = daily.first().and_then(|d| d.uv_index.as_deref()).map(num).unwrap_or_default();

        let air_quality = air.map(|a| AirQuality {
            // CN AQI level (1-6), passed through like WeatherAPI's EPA index.
            aqi: a.level.as_deref().map(num).unwrap_or_default() as u8,
            pm25: a.pm2p5.as_deref().map(num).unwrap_or_default(),
            pm10: a.pm10.as_deref().map(num).unwrap_or_default(),
            o3: a.o3.as_deref().map(num).unwrap_or_default(),
            no2: a.no2.as_deref().map(num).unwrap_or_default(),
        });

        let sunrise = astro
            .as_ref()
            .and_then(|a| a.sunrise.as_deref())
            .and_then(|s| timefmt::reformat(s, time_format));
        let sunset = astro
            .as_ref()
            .and_then(|a| a.sunset.as_deref())
            .and_then(|s| timefmt::reformat(s, time_format));

        WeatherSnapshot {
            city: hit.name.clone(),
            temperature: round_temp(num(&now.temp)),
            condition: now.text,
            humidity: num(&now.humidity) as u8,
            wind_speed: kmh_to_ms(num(&now.wind_speed)),
            feels_like: round_temp(num(&now.feels_like)),
            pressure: num(&now.pressure) as u32,
            visibility: num(&now.vis),
            uv_index,
            sunrise,
            sunset,
            hourly_forecast: hourly_strip(&hourly, time_format),
            daily_forecast: daily.iter().map(daily_entry).collect(),
            air_quality,
            source: ProviderId::QWeather.to_string(),
            source_override: None,
            lat,
            lon,
        }
    }
}

#[async_trait]
impl WeatherProvider for QWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::QWeather
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<WeatherSnapshot, WeatherError> {
        let lang = &request.lang;

        // With coordinates in hand the data endpoints accept them natively
        // (as "lon,lat"), so lookup and weather calls go out in parallel;
        // only the display name depends on the lookup. A name-only request
        // must resolve the location id first.
        let (hit, location, now, daily, hourly) = if let Some(coords) = request.coords {
            let location = format!("{},{}", coords.lon, coords.lat);
            let (hits, now, daily, hourly) = tokio::join!(
                self.lookup(&location, lang),
                self.fetch_now(&location, lang),
                self.fetch_daily(&location, lang),
                self.fetch_hourly(&location, lang),
            );
            let hit = hits?.into_iter().next().ok_or_else(|| {
                WeatherError::lookup(ProviderId::QWeather, format!("no location at {location}"))
            })?;
            (hit, location, now?, daily?, hourly?)
        } else {
            let hit =
                self.lookup(&request.city, lang).await?.into_iter().next().ok_or_else(|| {
                    WeatherError::lookup(
                        ProviderId::QWeather,
                        format!("city '{}' not found", request.city),
                    )
                })?;
            let location = hit.id.clone();
            let (now, daily, hourly) = tokio::join!(
                self.fetch_now(&location, lang),
                self.fetch_daily(&location, lang),
                self.fetch_hourly(&location, lang),
            );
            (hit, location, now?, daily?, hourly?)
        };

        // Settled semantics: a rejected optional call degrades to an absent
        // field, never an overall failure.
        let (air, astro) =
            tokio::join!(self.fetch_air(&location, lang), self.fetch_astronomy(&location, lang));
        let air = best_effort("air quality", air);
        let astro = best_effort("astronomy", astro);

        Ok(self.build_snapshot(
            &hit,
            now,
            daily,
            hourly,
            air,
            astro,
            request.coords,
            request.time_format,
        ))
    }

    async fn search(
        &self,
        query: &str,
        lang: &str,
    ) -> Result<Vec<CitySearchResult>, WeatherError> {
        let hits = self.lookup(query, lang).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let lat = hit.lat.parse().unwrap_or_default();
                let lon = hit.lon.parse().unwrap_or_default();
                CitySearchResult {
                    name: hit.name,
                    region: hit.adm2.or(hit.adm1).filter(|r| !r.is_empty()),
                    country: hit.country.filter(|c| !c.is_empty()),
                    lat,
                    lon,
                    id: Some(hit.id),
                }
            })
            .collect())
    }
}

/// "https://my.mirror.example/" -> "my.mirror.example"
fn normalize_host(host: Option<&str>) -> String {
    let raw = host.map(str::trim).filter(|h| !h.is_empty()).unwrap_or(DEFAULT_HOST);
    raw.trim_start_matches("https://").trim_start_matches("http://").trim_end_matches('/').to_string()
}

fn check_code(code: &str, what: &str) -> Result<(), WeatherError> {
    match code {
        CODE_OK => Ok(()),
        CODE_NOT_FOUND => {
            Err(WeatherError::lookup(ProviderId::QWeather, format!("{what} returned code 404")))
        }
        other => Err(WeatherError::transient(
            ProviderId::QWeather,
            format!("{what} returned code {other}"),
        )),
    }
}

/// QWeather serializes every number as a string.
fn num(s: &str) -> f64 {
    s.trim().parse().unwrap_or_default()
}

fn best_effort<T>(what: &str, result: Result<T, WeatherError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "qweather {what} request failed; field omitted");
            None
        }
    }
}

fn daily_entry(day: &QwDaily) -> DailyEntry {
    DailyEntry {
        date: day.fx_date.clone(),
        temp_min: round_temp(num(&day.temp_min)),
        temp_max: round_temp(num(&day.temp_max)),
        condition: day.text_day.clone(),
        icon: day.icon_day.clone(),
    }
}

fn hourly_strip(hours: &[QwHourly], time_format: TimeFormat) -> Vec<HourlyEntry> {
    hours
        .iter()
        .step_by(HOURLY_STEP)
        .take(HOURLY_SLOTS)
        .map(|hour| HourlyEntry {
            // "2024-03-01T16:00+08:00" -> "16:00", re-rendered per the format.
            time: hour
                .fx_time
                .get(11..16)
                .and_then(|hm| timefmt::reformat(hm, time_format))
                .unwrap_or_default(),
            temperature: round_temp(num(&hour.temp)),
            condition: hour.text.clone(),
            icon: hour.icon.clone(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct QwGeoResponse {
    code: String,
    location: Option<Vec<QwGeoHit>>,
}

#[derive(Debug, Clone, Deserialize)]
struct QwGeoHit {
    name: String,
    id: String,
    lat: String,
    lon: String,
    adm1: Option<String>,
    adm2: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QwNowResponse {
    code: String,
    now: QwNow,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct QwNow {
    temp: String,
    feels_like: String,
    humidity: String,
    wind_speed: String,
    pressure: String,
    vis: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct QwDailyResponse {
    code: String,
    #[serde(default)]
    daily: Vec<QwDaily>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct QwDaily {
    fx_date: String,
    temp_min: String,
    temp_max: String,
    text_day: String,
    icon_day: String,
    uv_index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QwHourlyResponse {
    code: String,
    #[serde(default)]
    hourly: Vec<QwHourly>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct QwHourly {
    fx_time: String,
    temp: String,
    text: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct QwAirResponse {
    code: String,
    now: QwAirNow,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct QwAirNow {
    level: Option<String>,
    pm2p5: Option<String>,
    pm10: Option<String>,
    o3: Option<String>,
    no2: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct QwAstro {
    code: String,
    sunrise: Option<String>,
    sunset: Option<String>,
}
