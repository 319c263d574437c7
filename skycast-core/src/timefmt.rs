//! Provider-agnostic clock-time rendering.
//!
//! Cached snapshots bake their time strings in at fetch time, so the display
//! format is part of the cache key's validity check rather than a render-time
//! concern. Every adapter funnels its sunrise/sunset and hourly labels
//! through here.

use serde::{Deserialize, Serialize};

/// Display format for clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    /// Zero-padded "HH:MM".
    #[default]
    #[serde(rename = "24h")]
    H24,
    /// "h:MM AM/PM", hour not padded.
    #[serde(rename = "12h")]
    H12,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFormat::H24 => "24h",
            TimeFormat::H12 => "12h",
        }
    }
}

impl std::fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TimeFormat {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "24h" => Ok(TimeFormat::H24),
            "12h" => Ok(TimeFormat::H12),
            _ => Err(anyhow::anyhow!("Unknown time format '{value}'. Expected '24h' or '12h'.")),
        }
    }
}

/// Render an hour/minute pair in the requested format. Hours wrap modulo 24.
pub fn format_hm(hour: u32, minute: u32, format: TimeFormat) -> String {
    let hour = hour % 24;
    match format {
        TimeFormat::H24 => format!("{hour:02}:{minute:02}"),
        TimeFormat::H12 => {
            let meridiem = if hour < 12 { "AM" } else { "PM" };
            let display_hour = match hour % 12 {
                0 => 12,
                h => h,
            };
            format!("{display_hour}:{minute:02} {meridiem}")
        }
    }
}

/// Re-render a provider-supplied clock string ("HH:MM", "H:MM" or
/// "hh:MM AM/PM") in the requested format. Returns `None` when the input
/// cannot be parsed; callers treat that as "field absent".
pub fn reformat(raw: &str, format: TimeFormat) -> Option<String> {
    let (hour, minute) = parse_hm(raw)?;
    Some(format_hm(hour, minute, format))
}

fn parse_hm(raw: &str) -> Option<(u32, u32)> {
    let trimmed = raw.trim();
    let upper = trimmed.to_uppercase();

    let (clock, meridiem) = if let Some(rest) = upper.strip_suffix("AM") {
        (rest.trim_end().to_string(), Some(false))
    } else if let Some(rest) = upper.strip_suffix("PM") {
        (rest.trim_end().to_string(), Some(true))
    } else {
        (upper, None)
    };

    let (h, m) = clock.split_once(':')?;
    let hour: u32 = h.trim().parse().ok()?;
    let minute: u32 = m.trim().parse().ok()?;
    if minute > 59 {
        return None;
    }

    let hour = match meridiem {
        // 12-hour clock: 12 AM is midnight, 12 PM is noon.
        Some(false) if hour == 12 => 0,
        Some(true) if hour < 12 => hour + 12,
        Some(_) => hour,
        None if hour > 23 => return None,
        None => hour,
    };
    if hour > 23 {
        return None;
    }

    Some((hour, minute))
}
