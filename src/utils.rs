use std::str::FromStr;
use tokio::time::Duration;

/// Parses a duration string in the format "30s", "10m", "5h", "3d".
///
/// Supported units:
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
///
/// A bare number ("30") is read as seconds.
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let unit_char = s.chars().last().unwrap();

    if unit_char.is_ascii_digit() {
        return match u64::from_str(s) {
            Ok(v) => Ok(Duration::from_secs(v)),
            Err(_) => Err(format!("Invalid numeric value in duration: '{}'", s)),
        };
    }

    let value_str = &s[0..s.len() - unit_char.len_utf8()];

    let value = match u64::from_str(value_str) {
        Ok(v) => v,
        Err(_) => {
            return Err(format!(
                "Invalid numeric value in duration: '{}'",
                value_str
            ))
        }
    };

    let seconds = match unit_char {
        's' => Some(value),
        'm' => value.checked_mul(60),
        'h' => value.checked_mul(60 * 60),
        'd' => value.checked_mul(24 * 60 * 60),
        _ => {
            return Err(format!(
                "Unknown duration unit: '{}'. Use 's', 'm', 'h', or 'd'.",
                unit_char
            ))
        }
    };

    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration value out of range: '{}'", s))
}
