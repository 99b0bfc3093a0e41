//! Recording names: timestamp-derived on the companion, re-used verbatim on the host.

use chrono::{DateTime, TimeZone};

use crate::protocol::AUDIO_EXTENSION;

/// Timestamp layout of recording names (`2024-01-01_10-00-00`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Name a recording captured at `at`: `<timestamp><extension>`.
pub fn file_name_for<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}{}", at.format(TIMESTAMP_FORMAT), AUDIO_EXTENSION)
}

/// True if `name` is a single plain path component the store may create.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

/// True if `name` ends with `extension` (with or without the leading dot).
pub fn has_extension(name: &str, extension: &str) -> bool {
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        return false;
    }
    match name.rsplit_once('.') {
        Some((stem, found)) => !stem.is_empty() && found == ext,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn name_from_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(file_name_for(&at), "2024-01-01_10-00-00.m4a");
    }

    #[test]
    fn safe_names() {
        assert!(is_safe_file_name("2024-01-01_10-00-00.m4a"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name(".hidden.m4a"));
        assert!(!is_safe_file_name("a/b.m4a"));
        assert!(!is_safe_file_name("a\\b.m4a"));
    }

    #[test]
    fn extension_match() {
        assert!(has_extension("x.m4a", ".m4a"));
        assert!(has_extension("x.m4a", "m4a"));
        assert!(!has_extension("x.m4a.part", ".m4a"));
        assert!(!has_extension(".m4a", ".m4a"));
        assert!(!has_extension("x.wav", ".m4a"));
        assert!(!has_extension("x.m4a", ""));
    }
}
