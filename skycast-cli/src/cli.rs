use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, Select, Text};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use skycast_core::{
    CacheManager, JsonFileStore, KvStore, ProviderId, Settings, TrackedLocation, WeatherService,
};

use crate::output;

/// Store key the tracked-location list lives under, next to the weather cache.
const LOCATIONS_KEY: &str = "locations";

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Multi-provider weather dashboard for the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show current weather and forecasts for a city.
    Show {
        /// City name, e.g. "Kyiv" or "北京".
        city: String,

        /// Provider override for this call, e.g. "weatherapi".
        #[arg(long)]
        source: Option<String>,

        /// Language override, e.g. "zh".
        #[arg(long)]
        lang: Option<String>,
    },

    /// Search for cities via the active provider.
    Search {
        /// Full or partial city name.
        query: String,
    },

    /// Add a city to the tracked list.
    Add {
        /// City name; ambiguous names offer a pick list.
        city: String,

        /// Pin this city to a provider instead of the global default.
        #[arg(long)]
        source: Option<String>,
    },

    /// Remove a city from the tracked list.
    Remove {
        city: String,
    },

    /// List tracked cities.
    List,

    /// Refresh every tracked city, printing each as it completes.
    Refresh,

    /// Configure credentials for a provider.
    Configure {
        /// Provider short name: "openweather", "weatherapi", "qweather" or "custom".
        provider: String,
    },

    /// Check that the saved API key for a provider still works.
    Verify {
        provider: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = Settings::load()?;
        let store = Arc::new(JsonFileStore::new(JsonFileStore::default_path()?));
        let cache = CacheManager::new(store.clone());
        let service = WeatherService::new(settings, cache)?;

        match self.command {
            Command::Show { city, source, lang } => show(&service, &city, source, lang).await?,
            Command::Search { query } => search(&service, &query).await?,
            Command::Add { city, source } => add(&service, store.as_ref(), &city, source).await?,
            Command::Remove { city } => remove(store.as_ref(), &city).await?,
            Command::List => list(store.as_ref()).await?,
            Command::Refresh => refresh(&service, store.as_ref()).await?,
            Command::Configure { provider } => configure(&service, &provider).await?,
            Command::Verify { provider } => verify(&service, &provider).await?,
        }

        // Drain any pending debounced cache write before the process exits.
        service.cache().flush().await?;
        Ok(())
    }
}

fn parse_source(source: Option<&str>) -> Result<Option<ProviderId>> {
    source.map(ProviderId::try_from).transpose()
}

async fn show(
    service: &WeatherService,
    city: &str,
    source: Option<String>,
    lang: Option<String>,
) -> Result<()> {
    let preferred = parse_source(source.as_deref())?;
    let lang = lang.unwrap_or_else(|| service.settings().language.clone());

    let snapshot = match service.get_weather(city, preferred, &lang, None).await {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_configuration() => {
            bail!("{e}\nRun `skycast configure <provider>` to set one up.")
        }
        Err(e) => return Err(e.into()),
    };

    output::print_snapshot(&snapshot);
    Ok(())
}

async fn search(service: &WeatherService, query: &str) -> Result<()> {
    let lang = service.settings().language.clone();
    let hits = service.search_cities(query, &lang).await?;

    if hits.is_empty() {
        println!("No matches for '{query}'.");
        return Ok(());
    }
    for hit in &hits {
        println!("{}  ({:.2}, {:.2})", hit.display_label(), hit.lat, hit.lon);
    }
    Ok(())
}

async fn add(
    service: &WeatherService,
    store: &dyn KvStore,
    city: &str,
    source: Option<String>,
) -> Result<()> {
    let preferred = parse_source(source.as_deref())?;
    let lang = service.settings().language.clone();
    let mut tracked = load_tracked(store).await?;

    let mut location = TrackedLocation {
        name: city.to_string(),
        source: source.clone(),
        lat: None,
        lon: None,
    };

    // Ambiguous names get a pick list; a single hit is taken as-is. Search is
    // advisory, so a failure here just means we fetch by the raw name.
    let hits = service.search_cities(city, &lang).await.unwrap_or_default();
    if hits.len() > 1 {
        let labels: Vec<String> = hits.iter().map(|h| h.display_label()).collect();
        let choice = Select::new("Which location?", labels).raw_prompt()?;
        let hit = &hits[choice.index];
        location.name = hit.name.clone();
        location.lat = Some(hit.lat);
        location.lon = Some(hit.lon);
    } else if let Some(hit) = hits.first() {
        location.name = hit.name.clone();
        location.lat = Some(hit.lat);
        location.lon = Some(hit.lon);
    }

    if tracked.iter().any(|t| t.name.eq_ignore_ascii_case(&location.name)) {
        bail!("'{}' is already tracked.", location.name);
    }

    // Fetch once so a bad city fails now rather than on the next refresh, and
    // so the stored entry carries the provider's canonical name and coordinates.
    let snapshot = service.get_weather(&location.name, preferred, &lang, location.coords()).await?;
    location.name = snapshot.city.clone();
    location.lat = Some(snapshot.lat);
    location.lon = Some(snapshot.lon);
    output::print_progress_line(&location.name, &snapshot);

    tracked.push(location.clone());
    save_tracked(store, &tracked).await?;
    println!("Tracking {} ({} total).", location.name, tracked.len());
    Ok(())
}

async fn remove(store: &dyn KvStore, city: &str) -> Result<()> {
    let mut tracked = load_tracked(store).await?;
    let before = tracked.len();
    tracked.retain(|t| !t.name.eq_ignore_ascii_case(city));

    if tracked.len() == before {
        bail!("'{city}' is not tracked.");
    }
    save_tracked(store, &tracked).await?;
    println!("Removed {city}.");
    Ok(())
}

async fn list(store: &dyn KvStore) -> Result<()> {
    let tracked = load_tracked(store).await?;
    if tracked.is_empty() {
        println!("No tracked cities. Add one with `skycast add <city>`.");
        return Ok(());
    }

    for (i, loc) in tracked.iter().enumerate() {
        let source = loc.source.as_deref().map(|s| format!("  [{s}]")).unwrap_or_default();
        match loc.coords() {
            Some(c) => println!("{:2}. {}{source}  ({:.2}, {:.2})", i + 1, loc.name, c.lat, c.lon),
            None => println!("{:2}. {}{source}", i + 1, loc.name),
        }
    }
    Ok(())
}

async fn refresh(service: &WeatherService, store: &dyn KvStore) -> Result<()> {
    let mut tracked = load_tracked(store).await?;
    if tracked.is_empty() {
        println!("No tracked cities. Add one with `skycast add <city>`.");
        return Ok(());
    }

    debug!(count = tracked.len(), "starting bulk refresh");
    println!("Refreshing {} cities:", tracked.len());

    // The CLI holds no previous snapshots across runs, so failed cities
    // report as failed instead of falling back to an older value.
    let previous = HashMap::new();
    let lang = service.settings().language.clone();
    let results = service
        .refresh_all(&tracked, &previous, &lang, |index, result| match result {
            Some(snapshot) => output::print_progress_line(&tracked[index].name, snapshot),
            None => println!("  x {}: refresh failed", tracked[index].name),
        })
        .await;

    // Persist provider-corrected names and resolved coordinates.
    let mut changed = false;
    for (location, result) in tracked.iter_mut().zip(&results) {
        let Some(snapshot) = result else { continue };
        if location.name != snapshot.city {
            location.name = snapshot.city.clone();
            changed = true;
        }
        if location.lat != Some(snapshot.lat) || location.lon != Some(snapshot.lon) {
            location.lat = Some(snapshot.lat);
            location.lon = Some(snapshot.lon);
            changed = true;
        }
    }
    if changed {
        save_tracked(store, &tracked).await?;
    }

    let ok = results.iter().filter(|r| r.is_some()).count();
    println!(
        "{ok}/{} cities refreshed at {}.",
        results.len(),
        chrono::Local::now().format("%H:%M")
    );
    Ok(())
}

async fn configure(service: &WeatherService, provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut settings = service.settings().clone();

    match id {
        ProviderId::Custom => {
            let url = Text::new("Endpoint URL:")
                .with_help_message("GET endpoint answering {city, key, lang} with the unified snapshot shape")
                .prompt()?;
            let key = Text::new("API key (leave empty if none):").prompt()?;

            settings.custom_url = Some(url.trim().to_string());
            if !key.trim().is_empty() {
                settings.set_api_key(ProviderId::Custom, key.trim().to_string());
            }
        }
        _ => {
            let key = Password::new("API key:").without_confirmation().prompt()?;
            let host = if id == ProviderId::QWeather {
                let host = Text::new("API host (empty for devapi.qweather.com):").prompt()?;
                (!host.trim().is_empty()).then(|| host.trim().to_string())
            } else {
                None
            };

            println!("Verifying key against {id}...");
            let ok = service
                .verify_connection(id, &key, &settings.language, host.as_deref())
                .await
                .context("Key verification failed")?;
            if !ok {
                bail!("{id} returned no results for the probe query; the key looks invalid.");
            }
            println!("Key works.");

            settings.set_api_key(id, key);
            if host.is_some() {
                settings.qweather_host = host;
            }
        }
    }

    if settings.source.as_deref() != Some(id.as_str()) {
        let make_default = Confirm::new(&format!("Make {id} the default provider?"))
            .with_default(true)
            .prompt()?;
        if make_default {
            settings.source = Some(id.to_string());
        }
    }

    settings.save()?;
    println!("Saved settings to {}.", Settings::settings_file_path()?.display());
    Ok(())
}

async fn verify(service: &WeatherService, provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let settings = service.settings();

    if id == ProviderId::Custom {
        println!("Custom endpoints have no verification protocol; nothing to check.");
        return Ok(());
    }
    let Some(key) = settings.api_key(id) else {
        bail!("No API key saved for {id}. Run `skycast configure {id}` first.");
    };

    let ok = service
        .verify_connection(id, key, &settings.language, settings.qweather_host.as_deref())
        .await?;
    if ok {
        println!("{id}: key works.");
    } else {
        println!("{id}: probe search returned no results; the key may be invalid.");
    }
    Ok(())
}

async fn load_tracked(store: &dyn KvStore) -> Result<Vec<TrackedLocation>> {
    match store.get(LOCATIONS_KEY).await? {
        Some(value) => {
            serde_json::from_value(value).context("Tracked-location list is unreadable")
        }
        None => Ok(Vec::new()),
    }
}

async fn save_tracked(store: &dyn KvStore, tracked: &[TrackedLocation]) -> Result<()> {
    store.set(LOCATIONS_KEY, serde_json::to_value(tracked)?).await
}
