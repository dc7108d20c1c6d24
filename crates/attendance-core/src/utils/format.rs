use std::cmp::Ordering;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

/// Escape text for interpolation into an HTML fragment
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse the date shapes the backend emits into local wall-clock time.
///
/// Accepts RFC 3339 timestamps (converted to local time), `YYYY-MM-DD`,
/// `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM[:SS]` and `YYYY/MM/DD`.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// `YYYY-MM-DD`, or the input unchanged when it is not a date
pub fn format_date(value: &str) -> String {
    match parse_date(value) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => value.to_string(),
    }
}

/// `YYYY/MM/DD`
pub fn format_date_slash(value: &str) -> String {
    match parse_date(value) {
        Some(dt) => dt.format("%Y/%m/%d").to_string(),
        None => value.to_string(),
    }
}

/// `YYYY/MM/DD HH:MM`
pub fn format_date_time(value: &str) -> String {
    match parse_date(value) {
        Some(dt) => dt.format("%Y/%m/%d %H:%M").to_string(),
        None => value.to_string(),
    }
}

/// Trim seconds: `19:00:00` becomes `19:00`. Full timestamps keep only the time.
pub fn format_time(value: &str) -> String {
    if let Some(dt) = parse_date(value) {
        return dt.format("%H:%M").to_string();
    }
    let mut parts = value.split(':');
    match (parts.next(), parts.next()) {
        (Some(h), Some(m)) => format!("{}:{}", h, m),
        _ => value.to_string(),
    }
}

/// Yen with thousands separators, e.g. `¥12,000`
pub fn format_currency(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-¥{}", grouped)
    } else {
        format!("¥{}", grouped)
    }
}

/// Whole calendar days from `now` to `value`, negative when in the past
pub fn days_until(value: &str, now: NaiveDateTime) -> Option<i64> {
    let target = parse_date(value)?;
    Some((target.date() - now.date()).num_days())
}

/// True once `now` is strictly after `value`. Unparseable input is never past.
pub fn is_past(value: &str, now: NaiveDateTime) -> bool {
    parse_date(value).map(|dt| now > dt).unwrap_or(false)
}

/// Case-insensitive ordering used for name sorts
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Case-insensitive substring match. `needle` is expected lowercased.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Truncate to `max_len` characters, adding an ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
