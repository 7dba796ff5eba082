use chrono::{DateTime, Local, Utc};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Calendar date in the local timezone, e.g. "May 01, 2024"
pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%b %d, %Y").to_string()
}

/// Date and time in the local timezone, e.g. "May 01, 2024 14:05"
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%b %d, %Y %H:%M").to_string()
}

/// Fixed-width text bar filled in proportion to `percentage` (0-100)
pub fn percent_bar(percentage: f64, width: usize) -> String {
    let clamped = percentage.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}
