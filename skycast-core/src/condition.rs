//! Maps free-text weather descriptions onto a closed category set.
//!
//! Providers describe conditions in whatever language the caller requested,
//! so matching covers English and Chinese keywords. Downstream consumers use
//! the category purely for icon/background selection.

/// Weather condition category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Sunny,
    Rainy,
    Snowy,
    Cloudy,
    Mist,
    Unknown,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Sunny => "sunny",
            Condition::Rainy => "rainy",
            Condition::Snowy => "snowy",
            Condition::Cloudy => "cloudy",
            Condition::Mist => "mist",
            Condition::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories are checked in this order and the first keyword hit wins, so a
/// mixed description like "light rain with fog" classifies as rainy. The order
/// is part of the contract, not an accident.
const KEYWORDS: &[(Condition, &[&str])] = &[
    (Condition::Sunny, &["sunny", "clear", "晴"]),
    (Condition::Rainy, &["rain", "drizzle", "thunder", "雨", "雷"]),
    (Condition::Snowy, &["snow", "sleet", "blizzard", "雪", "冰"]),
    (Condition::Cloudy, &["cloud", "overcast", "云", "阴"]),
    (
        Condition::Mist,
        &[
            "mist", "fog", "haze", "smoke", "dust", "sand", "ash", "squall", "tornado", "霾",
            "雾", "霧",
        ],
    ),
];

/// Classify a weather description. Total: every input yields exactly one
/// category, with `Unknown` for empty or unrecognized text.
pub fn classify(description: &str) -> Condition {
    let text = description.trim().to_lowercase();
    if text.is_empty() {
        return Condition::Unknown;
    }

    for (condition, keywords) in KEYWORDS {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return *condition;
        }
    }

    Condition::Unknown
}
