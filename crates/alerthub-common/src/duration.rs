//! Parser for compact duration strings as stored on rules
//! (`check_interval`, `duration`, `send_interval`, `aggregate_window`,
//! suppression durations).
//!
//! Accepts one or more `<number><unit>` segments where unit is `s`, `m`,
//! `h` or `d`, e.g. `"90s"`, `"5m"`, `"1h30m"`. A bare `"0"` parses to
//! zero. Anything else returns `None`.

use chrono::Duration;

pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::zero());
    }

    let mut total_secs: i64 = 0;
    let mut num = String::new();
    let mut saw_segment = false;

    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let value: i64 = num.parse().ok()?;
        num.clear();
        let unit_secs = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return None,
        };
        total_secs = total_secs.checked_add(value.checked_mul(unit_secs)?)?;
        saw_segment = true;
    }

    // Trailing digits without a unit make the whole string invalid.
    if !num.is_empty() || !saw_segment {
        return None;
    }
    Some(Duration::seconds(total_secs))
}
