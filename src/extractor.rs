//! Metadata extraction via yt-dlp.
//!
//! `resolve` shells out to `yt-dlp -J` and parses the JSON into a tagged
//! [`MediaInfo`], so every consumer handles the single-item and collection
//! cases exhaustively instead of poking at optional fields.

use std::collections::BTreeMap;

use serde::Deserialize;
use tokio::process;

use crate::config::{self, QUALITY_LADDER};
use crate::errors::{BotError, BotResult};
use crate::utils::UrlKind;

#[derive(Debug, Clone, PartialEq)]
pub enum MediaInfo {
    Item(ItemMetadata),
    Collection(CollectionMetadata),
}

impl MediaInfo {
    pub fn title(&self) -> &str {
        match self {
            MediaInfo::Item(i) => &i.title,
            MediaInfo::Collection(c) => &c.title,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemMetadata {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_secs: u32,
    pub view_count: Option<u64>,
    /// Ascending, filtered to the standard ladder
    pub qualities: Vec<QualityOption>,
    /// Keyed by language code, manual tracks shadow automatic ones
    pub subtitles: BTreeMap<String, SubtitleTrack>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityOption {
    pub height: u32,
    pub approx_size: Option<u64>,
}

impl QualityOption {
    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleOrigin {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleTrack {
    pub origin: SubtitleOrigin,
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMetadata {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub entries: Vec<CollectionEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionEntry {
    pub id: String,
    pub title: String,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    #[serde(default)]
    subtitles: BTreeMap<String, Vec<RawSubtitle>>,
    #[serde(default)]
    automatic_captions: BTreeMap<String, Vec<RawSubtitle>>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    height: Option<u32>,
    vcodec: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSubtitle {
    ext: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
}

pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a URL into metadata. Collections are resolved flat (no
    /// per-entry format probing) since only the entry list is needed to
    /// render the prompt and enforce the size limit.
    pub async fn resolve(&self, url: &str, kind: UrlKind) -> BotResult<MediaInfo> {
        let mut cmd = process::Command::new("yt-dlp");
        cmd.args(["--socket-timeout", "5", "--retries", "3"])
            .arg("-J");

        match kind {
            UrlKind::Item => {
                cmd.arg("--no-playlist");
            }
            UrlKind::Collection => {
                cmd.arg("--flat-playlist");
            }
        }
        cmd.arg(url);

        let output = cmd
            .output()
            .await
            .map_err(|e| BotError::extraction(format!("failed to spawn yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(BotError::extraction(stderr));
        }

        parse_info(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_info(json: &str) -> BotResult<MediaInfo> {
    let raw: RawInfo = serde_json::from_str(json)?;

    if raw.kind.as_deref() == Some("playlist") {
        Ok(MediaInfo::Collection(CollectionMetadata {
            id: raw.id.unwrap_or_default(),
            title: raw.title.unwrap_or_else(|| "Unknown playlist".to_string()),
            uploader: raw.uploader.unwrap_or_else(|| "Unknown".to_string()),
            entries: raw
                .entries
                .into_iter()
                .filter_map(|e| {
                    Some(CollectionEntry {
                        id: e.id?,
                        title: e.title.unwrap_or_else(|| "Untitled".to_string()),
                        duration_secs: e.duration.map(|d| d as u32),
                    })
                })
                .collect(),
        }))
    } else {
        Ok(MediaInfo::Item(ItemMetadata {
            id: raw.id.unwrap_or_default(),
            title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
            uploader: raw.uploader.unwrap_or_else(|| "Unknown".to_string()),
            duration_secs: raw.duration.map(|d| d as u32).unwrap_or(0),
            view_count: raw.view_count,
            qualities: collect_qualities(&raw.formats),
            subtitles: collect_subtitles(&raw.subtitles, &raw.automatic_captions),
        }))
    }
}

/// Collapse raw formats into the offered ladder: one option per standard
/// height that the source can actually serve, annotated with the size of
/// the matching format when yt-dlp reports one.
fn collect_qualities(formats: &[RawFormat]) -> Vec<QualityOption> {
    let video_formats: Vec<&RawFormat> = formats
        .iter()
        .filter(|f| {
            f.vcodec.as_deref().is_some_and(|v| v != "none")
                && f.height.is_some_and(|h| h > 0)
        })
        .collect();

    let max_height = video_formats
        .iter()
        .filter_map(|f| f.height)
        .max()
        .unwrap_or(0);

    QUALITY_LADDER
        .iter()
        .filter(|&&h| h <= max_height)
        .map(|&height| {
            let approx_size = video_formats
                .iter()
                .filter(|f| f.height == Some(height))
                .find_map(|f| f.filesize.or(f.filesize_approx));
            QualityOption { height, approx_size }
        })
        .collect()
}

fn collect_subtitles(
    manual: &BTreeMap<String, Vec<RawSubtitle>>,
    automatic: &BTreeMap<String, Vec<RawSubtitle>>,
) -> BTreeMap<String, SubtitleTrack> {
    let mut tracks = BTreeMap::new();

    for (lang, subs) in manual {
        if config::is_supported_language(lang) {
            tracks.insert(
                lang.clone(),
                SubtitleTrack {
                    origin: SubtitleOrigin::Manual,
                    formats: subs.iter().filter_map(|s| s.ext.clone()).collect(),
                },
            );
        }
    }

    for (lang, subs) in automatic {
        if config::is_supported_language(lang) && !tracks.contains_key(lang) {
            tracks.insert(
                lang.clone(),
                SubtitleTrack {
                    origin: SubtitleOrigin::Automatic,
                    formats: subs.iter().filter_map(|s| s.ext.clone()).collect(),
                },
            );
        }
    }

    tracks
}
