//! Integration tests for the custom-endpoint adapter and the aggregation
//! facade: caching, bulk refresh resilience and the documented relaxed
//! consistency of concurrent misses.

use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skycast_core::provider::custom::CustomProvider;
use skycast_core::provider::{FetchRequest, WeatherProvider};
use skycast_core::{
    CacheManager, MemoryStore, Settings, TimeFormat, TrackedLocation, WeatherError,
    WeatherService, WeatherSnapshot,
};

fn unified_body(city: &str, temperature: i32) -> Value {
    json!({
        "city": city,
        "temperature": temperature,
        "condition": "Sunny",
        "humidity": 50,
        "windSpeed": 2.5,
        "feelsLike": temperature,
        "pressure": 1015,
        "visibility": 10.0,
        "uvIndex": 1.0,
        "hourlyForecast": [{"time": "12:00", "temperature": temperature, "condition": "Sunny", "icon": ""}],
        "dailyForecast": [{"date": "2024/03/01", "tempMin": temperature - 5, "tempMax": temperature + 5,
                           "condition": "Sunny", "icon": ""}],
        "source": "custom",
        "lat": 1.0,
        "lon": 2.0
    })
}

fn request(city: &str) -> FetchRequest {
    FetchRequest {
        city: city.to_string(),
        lang: "en".to_string(),
        coords: None,
        time_format: TimeFormat::H24,
    }
}

fn custom_service(server: &MockServer) -> WeatherService {
    let settings = Settings {
        custom_url: Some(format!("{}/wx", server.uri())),
        ..Settings::default()
    };
    let cache = CacheManager::new(Arc::new(MemoryStore::new()));
    WeatherService::new(settings, cache).unwrap()
}

#[tokio::test]
async fn custom_fetch_sends_city_key_lang_and_trusts_the_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wx"))
        .and(query_param("city", "Oslo"))
        .and(query_param("key", "SECRET"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(unified_body("Oslo", -3)))
        .mount(&server)
        .await;

    let provider = CustomProvider::new(format!("{}/wx", server.uri()), "SECRET".into(), Client::new());
    let snapshot = provider.fetch(&request("Oslo")).await.unwrap();

    assert_eq!(snapshot.city, "Oslo");
    assert_eq!(snapshot.temperature, -3);
    assert_eq!(snapshot.source, "custom");
    assert_eq!(snapshot.hourly_forecast.len(), 1);
}

#[tokio::test]
async fn custom_rejects_payloads_missing_the_unified_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wx"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"city": "Oslo", "temperature": -3})),
        )
        .mount(&server)
        .await;

    let provider = CustomProvider::new(format!("{}/wx", server.uri()), String::new(), Client::new());
    let err = provider.fetch(&request("Oslo")).await.unwrap_err();

    assert!(matches!(err, WeatherError::Decode { .. }));
    assert!(err.to_string().contains("hourlyForecast"), "got: {err}");
}

#[tokio::test]
async fn get_weather_fetches_once_then_serves_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(unified_body("Oslo", 4)))
        .expect(1)
        .mount(&server)
        .await;

    let service = custom_service(&server);
    let first = service.get_weather("Oslo", None, "en", None).await.unwrap();
    let second = service.get_weather("Oslo", None, "en", None).await.unwrap();

    assert_eq!(first, second);
    // MockServer verifies the expect(1) on drop.
}

#[tokio::test]
async fn refresh_all_survives_a_failing_city() {
    let server = MockServer::start().await;
    for city in ["Kyiv", "Lviv", "Odesa", "Dnipro"] {
        Mock::given(method("GET"))
            .and(path("/wx"))
            .and(query_param("city", city))
            .respond_with(ResponseTemplate::new(200).set_body_json(unified_body(city, 20)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/wx"))
        .and(query_param("city", "Ghosttown"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = custom_service(&server);
    let locations: Vec<TrackedLocation> = ["Kyiv", "Lviv", "Ghosttown", "Odesa", "Dnipro"]
        .into_iter()
        .map(TrackedLocation::named)
        .collect();
    let previous = HashMap::from([(
        "Ghosttown".to_string(),
        WeatherSnapshot { city: "Ghosttown".into(), temperature: 1, ..WeatherSnapshot::default() },
    )]);

    let completions = AtomicUsize::new(0);
    let results = service
        .refresh_all(&locations, &previous, "en", |_, _| {
            completions.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    // Five slots in input order, one completion callback each.
    assert_eq!(results.len(), 5);
    assert_eq!(completions.load(Ordering::SeqCst), 5);

    assert_eq!(results[0].as_ref().unwrap().city, "Kyiv");
    assert_eq!(results[0].as_ref().unwrap().temperature, 20);
    assert_eq!(results[4].as_ref().unwrap().city, "Dnipro");

    // The failed city keeps its previous snapshot instead of poisoning the batch.
    let ghost = results[2].as_ref().unwrap();
    assert_eq!(ghost.city, "Ghosttown");
    assert_eq!(ghost.temperature, 1);
}

#[tokio::test]
async fn refresh_all_without_previous_yields_none_for_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wx"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = custom_service(&server);
    let locations = vec![TrackedLocation::named("Kyiv")];

    let results = service.refresh_all(&locations, &HashMap::new(), "en", |_, _| {}).await;
    assert_eq!(results, vec![None]);
}

/// Characterizes the documented relaxed-consistency choice: two concurrent
/// misses on one key both fetch, and whichever resolves later wins the cache,
/// even if it started earlier. No generation guard exists.
#[tokio::test]
async fn slower_superseded_fetch_overwrites_the_faster_one() {
    let server = MockServer::start().await;
    // The first request is served slowly with temp 10, the second instantly
    // with temp 20.
    Mock::given(method("GET"))
        .and(path("/wx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(unified_body("Kyiv", 10))
                .set_delay(Duration::from_millis(400)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(unified_body("Kyiv", 20)))
        .mount(&server)
        .await;

    let service = custom_service(&server);
    let (slow, fast) = tokio::join!(service.get_weather("Kyiv", None, "en", None), async {
        // Give the first call time to miss the cache and reach the server.
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.get_weather("Kyiv", None, "en", None).await
    });

    assert_eq!(slow.unwrap().temperature, 10);
    assert_eq!(fast.unwrap().temperature, 20);

    // The slow fetch finished last, so its write is the one that stuck.
    let cached = service.get_weather("Kyiv", None, "en", None).await.unwrap();
    assert_eq!(cached.temperature, 10);
}
