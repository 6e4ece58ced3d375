//! Configuration schema validation and helpers

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Parse a duration string like "15s", "1m", "1h30m"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let mut total_millis: u64 = 0;
    let mut current_num = String::new();
    let mut chars = s.trim().chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }

        let num: u64 = current_num
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;
        current_num.clear();

        let unit_millis: u64 = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            's' => 1000,
            'm' => 60_000,
            'h' => 3_600_000,
            'd' => 86_400_000,
            _ => return Err(format!("Unknown duration unit: {}", c)),
        };
        total_millis = num
            .checked_mul(unit_millis)
            .and_then(|millis| total_millis.checked_add(millis))
            .ok_or_else(|| format!("Duration too large: {}", s))?;
    }

    if !current_num.is_empty() {
        return Err(format!("Missing unit in duration: {}", s));
    }
    if total_millis == 0 {
        return Err(format!("Invalid duration: {}", s));
    }

    Ok(Duration::from_millis(total_millis))
}

/// Accepts either a duration string (`"15s"`) or a bare number of seconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(0) => Err(serde::de::Error::custom("duration must be positive")),
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
