use regex::Regex;

/// Parse a display size string ("2.5 GiB", "500 MB", "120 B") into bytes.
///
/// The agent writes sizes with binary units but is inconsistent about the
/// `KB` vs `KiB` spelling, so both map to 1024-based multipliers. Anything
/// unrecognized is treated as zero so one odd row cannot break the queue
/// totals.
pub fn parse_size_to_bytes(size: &str) -> i64 {
    let trimmed = size.trim();
    if trimmed.is_empty() {
        return 0;
    }
    let re = Regex::new(r"(?i)^([0-9.]+)\s*([KMGT]i?B?|B)$").expect("size pattern is valid");
    let Some(caps) = re.captures(trimmed) else {
        return 0;
    };
    let Ok(num) = caps[1].parse::<f64>() else {
        return 0;
    };
    let exponent = match caps[2].to_ascii_uppercase().as_str() {
        "B" => 0,
        "K" | "KB" | "KIB" => 1,
        "M" | "MB" | "MIB" => 2,
        "G" | "GB" | "GIB" => 3,
        "T" | "TB" | "TIB" => 4,
        _ => return 0,
    };
    (num * 1024_f64.powi(exponent)) as i64
}

/// Compact duration string for the dashboard's elapsed / "ago" columns,
/// e.g. `1d 2h 3m 4s` with leading zero components dropped.
pub fn format_duration(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 || !parts.is_empty() {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || !parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}
