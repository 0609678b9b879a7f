//! Runtime configuration loaded from environment variables.
//!
//! `dotenvy` is loaded in `main` before this runs, so a local `.env` file
//! works the same as real environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Subtitle languages offered to users, code -> display name.
pub const SUBTITLE_LANGUAGES: &[(&str, &str)] = &[
    ("ar", "العربية"),
    ("en", "English"),
    ("fr", "Français"),
    ("es", "Español"),
    ("de", "Deutsch"),
    ("it", "Italiano"),
    ("pt", "Português"),
    ("ru", "Русский"),
    ("ja", "日本語"),
    ("ko", "한국어"),
    ("zh", "中文"),
];

/// Quality ladder offered to users (video heights).
pub const QUALITY_LADDER: &[u32] = &[144, 240, 360, 480, 720, 1080, 1440, 2160];

pub fn language_name(code: &str) -> Option<&'static str> {
    SUBTITLE_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn is_supported_language(code: &str) -> bool {
    language_name(code).is_some()
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for downloaded files
    pub download_dir: PathBuf,
    /// Maximum number of items a collection may have before it is rejected
    pub max_collection_items: usize,
    /// Maximum file size the bot will deliver, in bytes
    pub max_delivery_bytes: u64,
    /// Inactivity timeout after which an abandoned session is destroyed
    pub session_ttl: Duration,
    /// Minimum interval between progress message edits
    pub progress_interval: Duration,
    /// Maximum number of downloads running at once
    pub max_concurrent_downloads: usize,
    /// How many collection files are delivered directly, the rest is summarized
    pub max_collection_deliveries: usize,
    pub database_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            download_dir: PathBuf::from(env_or("DOWNLOAD_PATH", "downloads".to_string())),
            max_collection_items: env_or("MAX_PLAYLIST_SIZE", 50),
            max_delivery_bytes: env_or("MAX_FILE_SIZE_MB", 50u64) * 1024 * 1024,
            session_ttl: Duration::from_secs(env_or("SESSION_TTL_SECONDS", 900u64)),
            progress_interval: Duration::from_secs(env_or("PROGRESS_INTERVAL_SECONDS", 2u64)),
            max_concurrent_downloads: env_or("MAX_CONCURRENT_DOWNLOADS", 3),
            max_collection_deliveries: 5,
            database_url: env_or("DATABASE_URL", "sqlite://tubefetch.db?mode=rwc".to_string()),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_lookup() {
        assert_eq!(language_name("en"), Some("English"));
        assert!(language_name("xx").is_none());
        assert!(is_supported_language("ar"));
    }
}
