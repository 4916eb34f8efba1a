//! Human-readable formatting helpers for sizes, speeds, times and file names

use chrono::DateTime;
use std::path::Path;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count, e.g. `1536` -> `"1.5 KB"`
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", size, SIZE_UNITS[unit])
}

pub fn format_download_speed(bytes_per_second: f64) -> String {
    if bytes_per_second < 1024.0 {
        format!("{:.1} B/s", bytes_per_second)
    } else if bytes_per_second < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bytes_per_second / 1024.0)
    } else {
        format!("{:.1} MB/s", bytes_per_second / (1024.0 * 1024.0))
    }
}

/// Rough time left for `total_bytes` at the given speed
pub fn estimate_download_time(total_bytes: u64, bytes_per_second: f64) -> String {
    if bytes_per_second <= 0.0 {
        return "unknown".to_string();
    }

    let seconds = total_bytes as f64 / bytes_per_second;
    if seconds < 60.0 {
        format!("{} sec", seconds as u64)
    } else if seconds < 3600.0 {
        format!("{} min", (seconds / 60.0) as u64)
    } else {
        let hours = (seconds / 3600.0) as u64;
        let minutes = ((seconds % 3600.0) / 60.0) as u64;
        format!("{}h {}m", hours, minutes)
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

/// Relative age of `timestamp` as seen at `now` (both unix seconds)
pub fn format_time_ago(timestamp: i64, now: i64) -> String {
    let diff = now - timestamp;
    if diff < 0 {
        return "just now".to_string();
    }

    let days = diff / 86_400;
    let seconds = diff % 86_400;

    if days > 365 {
        plural(days / 365, "year")
    } else if days > 30 {
        plural(days / 30, "month")
    } else if days > 0 {
        plural(days, "day")
    } else if seconds > 3600 {
        plural(seconds / 3600, "hour")
    } else if seconds > 60 {
        plural(seconds / 60, "minute")
    } else {
        "just now".to_string()
    }
}

/// `dd.mm.YYYY` in UTC
pub fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `HH:MM` in UTC
pub fn format_clock(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Compact counter, e.g. `1500` -> `"1.5K"`
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1000 {
        format!("{:.1}K", count as f64 / 1000.0)
    } else {
        count.to_string()
    }
}

/// Replace characters that are invalid in file names and cap the length,
/// keeping the extension when the name has to be shortened.
pub fn sanitize_filename(filename: &str, max_length: usize) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let replaced: String = filename
        .chars()
        .map(|c| if INVALID.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= max_length {
        return trimmed.to_string();
    }

    // An extension only counts when the dot is not the first character
    let ext_start = chars.iter().rposition(|&c| c == '.').filter(|&i| i > 0);
    match ext_start {
        Some(idx) if chars.len() - idx < max_length => {
            let ext: String = chars[idx..].iter().collect();
            let keep = max_length - ext.chars().count();
            let stem: String = chars[..keep].iter().collect();
            format!("{}{}", stem, ext)
        }
        _ => chars[..max_length].iter().collect(),
    }
}

/// True when the string parses as a URL with both a scheme and a host
pub fn is_valid_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Lowercase extension (with dot) of the URL path, `.zip` when there is none
pub fn extension_from_url(candidate: &str) -> String {
    let Ok(parsed) = url::Url::parse(candidate) else {
        return ".zip".to_string();
    };

    Path::new(parsed.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| ".zip".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_download_speed() {
        assert_eq!(format_download_speed(100.0), "100.0 B/s");
        assert_eq!(format_download_speed(2048.0), "2.0 KB/s");
        assert_eq!(format_download_speed(3.0 * 1024.0 * 1024.0), "3.0 MB/s");
    }

    #[test]
    fn test_estimate_download_time() {
        assert_eq!(estimate_download_time(100, 0.0), "unknown");
        assert_eq!(estimate_download_time(300, 10.0), "30 sec");
        assert_eq!(estimate_download_time(1200, 10.0), "2 min");
        assert_eq!(estimate_download_time(90_000, 10.0), "2h 30m");
    }

    #[test]
    fn test_format_time_ago() {
        let now = 1_700_000_000;
        assert_eq!(format_time_ago(now - 10, now), "just now");
        assert_eq!(format_time_ago(now - 120, now), "2 minutes ago");
        assert_eq!(format_time_ago(now - 7200 - 5, now), "2 hours ago");
        assert_eq!(format_time_ago(now - 86_400, now), "1 day ago");
        assert_eq!(format_time_ago(now - 86_400 * 3, now), "3 days ago");
        assert_eq!(format_time_ago(now - 86_400 * 61, now), "2 months ago");
        assert_eq!(format_time_ago(now - 86_400 * 366, now), "1 year ago");
        assert_eq!(format_time_ago(now + 50, now), "just now");
    }

    #[test]
    fn test_format_date_and_clock() {
        // 2023-11-14 22:13:20 UTC
        assert_eq!(format_date(1_700_000_000), "14.11.2023");
        assert_eq!(format_clock(1_700_000_000), "22:13");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1500), "1.5K");
        assert_eq!(format_count(2_500_000), "2.5M");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a<b>c:d.zip", 100), "a_b_c_d.zip");
        assert_eq!(sanitize_filename("  .hidden name. ", 100), "hidden name");
        assert_eq!(sanitize_filename("abcdefghij.zip", 8), "abcd.zip");
        assert_eq!(sanitize_filename("abcdefghij", 4), "abcd");
    }

    #[test]
    fn test_url_helpers() {
        assert!(is_valid_url("https://steamcommunity.com/sharedfiles"));
        assert!(!is_valid_url("steamcommunity.com"));
        assert!(!is_valid_url("mailto:someone@example.com"));

        assert_eq!(extension_from_url("https://cdn.example.com/files/Map.BSP?x=1"), ".bsp");
        assert_eq!(extension_from_url("https://cdn.example.com/download/12345"), ".zip");
        assert_eq!(extension_from_url("not a url"), ".zip");
    }
}
