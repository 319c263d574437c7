//! Terminal rendering of weather snapshots.

use skycast_core::{Condition, WeatherSnapshot, classify};

/// Glyph for a condition category; the terminal stand-in for the dashboard's
/// icon/background theming.
fn condition_glyph(condition: &str) -> &'static str {
    match classify(condition) {
        Condition::Sunny => "☀",
        Condition::Rainy => "☂",
        Condition::Snowy => "❄",
        Condition::Cloudy => "☁",
        Condition::Mist => "≋",
        Condition::Unknown => "·",
    }
}

/// Full card for a single city: current conditions plus both forecasts.
pub fn print_snapshot(s: &WeatherSnapshot) {
    println!(
        "{} {}  [{}]  ({:.2}, {:.2})",
        condition_glyph(&s.condition),
        s.city,
        s.source,
        s.lat,
        s.lon
    );
    println!("  {}°C  {}  (feels like {}°C)", s.temperature, s.condition, s.feels_like);
    println!(
        "  humidity {}%  wind {:.1} m/s  pressure {} hPa  visibility {:.1} km",
        s.humidity, s.wind_speed, s.pressure, s.visibility
    );
    if s.uv_index > 0.0 {
        println!("  UV index {:.1}", s.uv_index);
    }
    if let (Some(sunrise), Some(sunset)) = (&s.sunrise, &s.sunset) {
        println!("  sunrise {sunrise}  sunset {sunset}");
    }
    if let Some(aq) = &s.air_quality {
        println!("  air quality {}  PM2.5 {:.1}  PM10 {:.1}", aq.aqi, aq.pm25, aq.pm10);
    }

    if !s.hourly_forecast.is_empty() {
        println!("\n  Next 24h:");
        for hour in &s.hourly_forecast {
            println!(
                "    {:>8}  {:>3}°C  {} {}",
                hour.time,
                hour.temperature,
                condition_glyph(&hour.condition),
                hour.condition
            );
        }
    }

    if !s.daily_forecast.is_empty() {
        println!("\n  Daily:");
        for day in &s.daily_forecast {
            println!(
                "    {:<10}  {:>3}°C .. {:>3}°C  {} {}",
                day.date,
                day.temp_min,
                day.temp_max,
                condition_glyph(&day.condition),
                day.condition
            );
        }
    }
}

/// One-line summary, used as each refresh completion arrives.
pub fn print_progress_line(name: &str, s: &WeatherSnapshot) {
    println!(
        "  {} {name}: {}°C {}",
        condition_glyph(&s.condition),
        s.temperature,
        s.condition
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyphs_cover_every_category() {
        assert_eq!(condition_glyph("Heavy rain"), "☂");
        assert_eq!(condition_glyph("晴"), "☀");
        assert_eq!(condition_glyph("Overcast"), "☁");
        assert_eq!(condition_glyph("Blizzard"), "❄");
        assert_eq!(condition_glyph("Fog"), "≋");
        assert_eq!(condition_glyph("???"), "·");
    }
}
