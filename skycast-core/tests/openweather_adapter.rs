//! Integration tests for the OpenWeatherMap adapter against a mock server.

use reqwest::Client;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skycast_core::provider::openweather::OpenWeatherProvider;
use skycast_core::provider::{FetchRequest, WeatherProvider};
use skycast_core::{TimeFormat, WeatherError};

fn request(city: &str) -> FetchRequest {
    FetchRequest {
        city: city.to_string(),
        lang: "en".to_string(),
        coords: None,
        time_format: TimeFormat::H24,
    }
}

fn current_body() -> Value {
    json!({
        "name": "Kyiv",
        "coord": {"lat": 50.45, "lon": 30.52},
        "weather": [{"description": "light rain", "icon": "10d"}],
        "main": {"temp": 7.6, "feels_like": 5.2, "humidity": 81, "pressure": 1013},
        "wind": {"speed": 3.4},
        "visibility": 10000,
        "sys": {"sunrise": 1709269200i64, "sunset": 1709308800i64},
        "timezone": 7200
    })
}

fn forecast_entry(dt_txt: &str, temp: f64, min: f64, max: f64) -> Value {
    json!({
        "dt_txt": dt_txt,
        "main": {"temp": temp, "temp_min": min, "temp_max": max},
        "weather": [{"description": "light rain", "icon": "10d"}]
    })
}

/// Nine 3-hourly entries spanning two calendar days.
fn forecast_body() -> Value {
    let list: Vec<Value> = vec![
        forecast_entry("2024-03-01 06:00:00", 4.0, 3.0, 5.0),
        forecast_entry("2024-03-01 09:00:00", 6.0, 5.0, 7.0),
        forecast_entry("2024-03-01 12:00:00", 9.0, 8.0, 10.0),
        forecast_entry("2024-03-01 15:00:00", 8.0, 7.0, 9.0),
        forecast_entry("2024-03-01 18:00:00", 6.0, 5.0, 7.0),
        forecast_entry("2024-03-01 21:00:00", 5.0, 4.0, 6.0),
        forecast_entry("2024-03-02 00:00:00", 3.0, 2.0, 4.0),
        forecast_entry("2024-03-02 03:00:00", 2.0, 1.0, 3.0),
        forecast_entry("2024-03-02 06:00:00", 2.5, 2.0, 3.0),
    ];
    json!({"list": list})
}

fn air_body() -> Value {
    json!({
        "list": [{
            "main": {"aqi": 2},
            "components": {"pm2_5": 12.3, "pm10": 20.1, "o3": 60.2, "no2": 14.8}
        }]
    })
}

async fn mount_defaults(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution"))
        .respond_with(ResponseTemplate::new(200).set_body_json(air_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn city_fetch_builds_the_full_snapshot() {
    let server = MockServer::start().await;
    mount_defaults(&server).await;

    let provider =
        OpenWeatherProvider::new("KEY".into(), Client::new()).with_base_url(server.uri());
    let snapshot = provider.fetch(&request("Kyiv")).await.unwrap();

    assert_eq!(snapshot.city, "Kyiv");
    assert_eq!(snapshot.source, "openweather");
    assert_eq!(snapshot.temperature, 8);
    assert_eq!(snapshot.feels_like, 5);
    assert_eq!(snapshot.humidity, 81);
    assert_eq!(snapshot.pressure, 1013);
    // Metric wind speed passes through untouched; visibility metres -> km.
    assert_eq!(snapshot.wind_speed, 3.4);
    assert_eq!(snapshot.visibility, 10.0);
    assert_eq!(snapshot.lat, 50.45);
    assert_eq!(snapshot.lon, 30.52);

    // Sunrise/sunset shifted by the city's +2h UTC offset.
    assert_eq!(snapshot.sunrise.as_deref(), Some("07:00"));
    assert_eq!(snapshot.sunset.as_deref(), Some("18:00"));

    // First 8 of 9 forecast entries form the hourly strip.
    assert_eq!(snapshot.hourly_forecast.len(), 8);
    assert_eq!(snapshot.hourly_forecast[0].time, "06:00");
    assert_eq!(snapshot.hourly_forecast[7].time, "03:00");

    // Two calendar days, min/max folded across each day's entries.
    assert_eq!(snapshot.daily_forecast.len(), 2);
    assert_eq!(snapshot.daily_forecast[0].date, "2024/03/01");
    assert_eq!(snapshot.daily_forecast[0].temp_min, 3);
    assert_eq!(snapshot.daily_forecast[0].temp_max, 10);
    assert_eq!(snapshot.daily_forecast[1].date, "2024/03/02");
    assert_eq!(snapshot.daily_forecast[1].temp_min, 1);
    assert_eq!(snapshot.daily_forecast[1].temp_max, 4);

    let air = snapshot.air_quality.unwrap();
    assert_eq!(air.aqi, 2);
    assert_eq!(air.pm25, 12.3);
}

#[tokio::test]
async fn forecast_failure_degrades_to_current_conditions_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution"))
        .respond_with(ResponseTemplate::new(200).set_body_json(air_body()))
        .mount(&server)
        .await;

    let provider =
        OpenWeatherProvider::new("KEY".into(), Client::new()).with_base_url(server.uri());
    let snapshot = provider.fetch(&request("Kyiv")).await.unwrap();

    assert_eq!(snapshot.temperature, 8);
    assert!(snapshot.hourly_forecast.is_empty());
    assert!(snapshot.daily_forecast.is_empty());
    // Other optional branches are independent of the failed one.
    assert!(snapshot.air_quality.is_some());
}

#[tokio::test]
async fn mandatory_call_failure_carries_the_provider_error_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"cod": 401, "message": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let provider =
        OpenWeatherProvider::new("BAD".into(), Client::new()).with_base_url(server.uri());
    let err = provider.fetch(&request("Kyiv")).await.unwrap_err();

    assert!(matches!(err, WeatherError::Transient { .. }));
    let message = err.to_string();
    assert!(message.starts_with("openweather:"), "got: {message}");
    assert!(message.contains("Invalid API key"), "got: {message}");
}

#[tokio::test]
async fn unknown_city_is_a_lookup_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"cod": "404", "message": "city not found"})),
        )
        .mount(&server)
        .await;

    let provider =
        OpenWeatherProvider::new("KEY".into(), Client::new()).with_base_url(server.uri());
    let err = provider.fetch(&request("Nowhereville")).await.unwrap_err();
    assert!(matches!(err, WeatherError::Lookup { .. }));
}

#[tokio::test]
async fn coordinate_requests_query_by_lat_lon() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "50.45"))
        .and(query_param("lon", "30.52"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("lat", "50.45"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution"))
        .and(query_param("lat", "50.45"))
        .respond_with(ResponseTemplate::new(200).set_body_json(air_body()))
        .mount(&server)
        .await;

    let provider =
        OpenWeatherProvider::new("KEY".into(), Client::new()).with_base_url(server.uri());
    let mut req = request("ignored");
    req.coords = Some(skycast_core::Coordinates { lat: 50.45, lon: 30.52 });

    let snapshot = provider.fetch(&req).await.unwrap();
    assert_eq!(snapshot.city, "Kyiv");
    assert!(snapshot.air_quality.is_some());
}

#[tokio::test]
async fn chinese_requests_use_the_zh_cn_code() {
    let server = MockServer::start().await;
    // Only lang=zh_cn is mocked; the unmapped "zh" would 404 and fail the fetch.
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lang", "zh_cn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("lang", "zh_cn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/air_pollution"))
        .respond_with(ResponseTemplate::new(200).set_body_json(air_body()))
        .mount(&server)
        .await;

    let provider =
        OpenWeatherProvider::new("KEY".into(), Client::new()).with_base_url(server.uri());
    let mut req = request("Kyiv");
    req.lang = "zh".to_string();

    assert!(provider.fetch(&req).await.is_ok());
}

#[tokio::test]
async fn search_maps_geocoding_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "Springfield"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Springfield", "lat": 39.8, "lon": -89.6, "country": "US", "state": "Illinois"},
            {"name": "Springfield", "lat": 42.1, "lon": -72.6, "country": "US", "state": "Massachusetts"}
        ])))
        .mount(&server)
        .await;

    let provider =
        OpenWeatherProvider::new("KEY".into(), Client::new()).with_base_url(server.uri());
    let hits = provider.search("Springfield", "en").await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].name, "Springfield");
    assert_eq!(hits[0].region.as_deref(), Some("Illinois"));
    assert_eq!(hits[0].country.as_deref(), Some("US"));
    assert_eq!(hits[1].lat, 42.1);
    assert!(hits[0].id.is_none());
}
