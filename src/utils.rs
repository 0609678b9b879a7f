use url::Url;

/// What kind of downloadable thing a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    /// A single video
    Item,
    /// A playlist
    Collection,
}

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Classify a message as a supported media URL, or `None` if it is neither
/// a URL nor one we handle.
pub fn classify_url(text: &str) -> Option<UrlKind> {
    let url = Url::parse(text.trim()).ok()?;

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?;
    if !YOUTUBE_HOSTS.contains(&host) {
        return None;
    }

    let has_list = url.query_pairs().any(|(k, _)| k == "list");
    if url.path() == "/playlist" || has_list {
        return Some(UrlKind::Collection);
    }

    if host == "youtu.be" {
        let id = url.path().trim_start_matches('/');
        return (!id.is_empty()).then_some(UrlKind::Item);
    }

    if url.path() == "/watch" && url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty()) {
        return Some(UrlKind::Item);
    }

    None
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_single_videos() {
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(UrlKind::Item)
        );
        assert_eq!(
            classify_url("https://youtu.be/dQw4w9WgXcQ"),
            Some(UrlKind::Item)
        );
        assert_eq!(
            classify_url("  https://m.youtube.com/watch?v=abc123  "),
            Some(UrlKind::Item)
        );
    }

    #[test]
    fn classifies_collections() {
        assert_eq!(
            classify_url("https://www.youtube.com/playlist?list=PLabc"),
            Some(UrlKind::Collection)
        );
        // A watch link carrying a list parameter is treated as a collection
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=abc&list=PLabc"),
            Some(UrlKind::Collection)
        );
    }

    #[test]
    fn rejects_unsupported() {
        assert_eq!(classify_url("not a url"), None);
        assert_eq!(classify_url("https://vimeo.com/12345"), None);
        assert_eq!(classify_url("https://youtu.be/"), None);
        assert_eq!(classify_url("https://www.youtube.com/watch"), None);
        assert_eq!(classify_url("ftp://youtube.com/watch?v=abc"), None);
        // Lookalike domain must not pass
        assert_eq!(classify_url("https://notyoutube.com/watch?v=abc"), None);
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(999), "999 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(52_428_800), "50.0 MB");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(125), "2:05");
        assert_eq!(format_duration(3661), "1:01:01");
    }
}
