/// Helper utilities for volume-backup

use chrono::{DateTime, Utc};

/// Deterministic archive file name for a backup taken at `timestamp`
///
/// `db` at 2024-05-01 10:20:30.123 UTC becomes `db__2024-05-01T10-20-30-123Z__.tar.gz`.
pub fn archive_name(backup_name: &str, timestamp: DateTime<Utc>) -> String {
    let iso = timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    format!("{}__{}__.tar.gz", backup_name, iso.replace([':', '.'], "-"))
}

/// Join an optional key prefix and an object name with a single `/`
pub fn object_key(prefix: Option<&str>, name: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    }
}

/// Format bytes to human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Mask sensitive data (show only first and last N characters)
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    if value.len() <= visible_chars * 2 {
        "*".repeat(value.len())
    } else {
        let start = &value[..visible_chars];
        let end = &value[value.len() - visible_chars..];
        format!("{}...{}", start, end)
    }
}

/// Interpret an environment flag such as DEBUG=true
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
