//! Millisecond-precision timing utilities
//!
//! Wall-clock timestamps are epoch milliseconds; elapsed times are measured
//! against `Instant` so they stay monotonic even if the clock steps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Format a duration as a compact human-readable string (`1h30m15s`, `500ms`)
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = duration.subsec_millis();

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 || hours > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || (hours == 0 && minutes == 0 && millis == 0) {
        out.push_str(&format!("{seconds}s"));
    }
    if millis > 0 && hours == 0 && minutes == 0 {
        out.push_str(&format!("{millis}ms"));
    }
    out
}

/// Parse a duration given either in humantime shorthand (`10m`, `30s`,
/// `1h30m`, `500ms`) or as an ISO-8601 duration (`PT10M`, `PT1H30M`,
/// `P1DT2H`, `PT0.5S`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("duration string cannot be empty".to_string());
    }

    if trimmed.starts_with('P') || trimmed.starts_with('p') {
        return parse_iso8601(trimmed);
    }

    humantime::parse_duration(trimmed).map_err(|e| format!("invalid duration '{trimmed}': {e}"))
}

fn parse_iso8601(input: &str) -> Result<Duration, String> {
    let body = &input[1..];
    let (date_part, time_part) = match body.find(['T', 't']) {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, ""),
    };

    let mut total = 0.0f64;
    for (part, in_time) in [(date_part, false), (time_part, true)] {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() || ch == '.' {
                number.push(ch);
                continue;
            }
            let value: f64 = number
                .parse()
                .map_err(|_| format!("invalid duration '{input}'"))?;
            number.clear();
            let seconds = match (ch.to_ascii_uppercase(), in_time) {
                ('D', false) => value * 86_400.0,
                ('H', true) => value * 3_600.0,
                ('M', true) => value * 60.0,
                ('S', true) => value,
                _ => return Err(format!("invalid duration designator '{ch}' in '{input}'")),
            };
            total += seconds;
        }
        if !number.is_empty() {
            return Err(format!("invalid duration '{input}': dangling number"));
        }
    }

    if total <= 0.0 && input.len() <= 2 {
        return Err(format!("invalid duration '{input}'"));
    }
    Ok(Duration::from_secs_f64(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_ms_advances() {
        let t1 = epoch_ms();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = epoch_ms();
        assert!(t2 > t1, "Epoch clock should advance");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(15)), "15s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(5415)), "1h30m15s");
    }

    #[test]
    fn test_parse_shorthand() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn test_parse_iso8601() {
        assert_eq!(parse_duration("PT10M").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("PT1H30M").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("P1DT2H").unwrap(), Duration::from_secs(93_600));
        assert_eq!(parse_duration("PT0.5S").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("banana").is_err());
        assert!(parse_duration("P").is_err());
        assert!(parse_duration("PT5X").is_err());
    }
}
