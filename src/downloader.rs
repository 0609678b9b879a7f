//! Download execution via yt-dlp subprocesses.
//!
//! Media fetches stream progress lines (`--newline --progress-template`)
//! which are parsed into [`DownloadProgress`] events and pushed over an
//! unbounded channel; debouncing is the receiver's job. All commands are
//! `kill_on_drop` so an aborted download task takes its subprocess with it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process;
use tokio::sync::mpsc;

use crate::errors::{BotError, BotResult};
use crate::flow::SubtitleFormat;

const PROGRESS_PREFIX: &str = "download:";
const PROGRESS_TEMPLATE: &str =
    "download:%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.speed)s";

/// One progress tick from yt-dlp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Bytes per second
    pub rate: Option<u64>,
}

impl DownloadProgress {
    pub fn percent(&self) -> Option<f64> {
        let total = self.total.filter(|&t| t > 0)?;
        Some(self.downloaded as f64 / total as f64 * 100.0)
    }
}

pub struct Downloader;

impl Downloader {
    pub fn new() -> Self {
        Self
    }

    /// Download a single item at the given quality into `dest_dir`,
    /// reporting progress over `progress`. Returns the final file path.
    pub async fn fetch(
        &self,
        url: &str,
        height: u32,
        dest_dir: &Path,
        progress: mpsc::UnboundedSender<DownloadProgress>,
    ) -> BotResult<PathBuf> {
        let mut cmd = base_command();
        cmd.arg("--no-playlist")
            .args(["-N", "4"])
            .args(["--remux-video", "mp4"])
            .args(["-f", &media_format_selector(height)])
            .args(["--newline", "--progress-template", PROGRESS_TEMPLATE])
            .args(["-o", &output_template(dest_dir)])
            .args(["--no-simulate", "--print", "after_move:filepath"])
            .arg(url);

        let paths = run_streaming(cmd, progress).await?;
        paths
            .into_iter()
            .next()
            .ok_or_else(|| BotError::download("yt-dlp produced no file"))
    }

    /// Download every item of a collection at the given quality. Items that
    /// fail are skipped (`--ignore-errors`); the produced files are returned
    /// in playlist order.
    pub async fn fetch_collection(
        &self,
        url: &str,
        height: u32,
        dest_dir: &Path,
        progress: mpsc::UnboundedSender<DownloadProgress>,
    ) -> BotResult<Vec<PathBuf>> {
        let template = dest_dir
            .join("%(playlist_index)s_%(id)s.%(ext)s")
            .to_string_lossy()
            .into_owned();

        let mut cmd = base_command();
        cmd.arg("--ignore-errors")
            .args(["-N", "4"])
            .args(["--remux-video", "mp4"])
            .args(["-f", &media_format_selector(height)])
            .args(["--newline", "--progress-template", PROGRESS_TEMPLATE])
            .args(["-o", &template])
            .args(["--no-simulate", "--print", "after_move:filepath"])
            .arg(url);

        run_streaming(cmd, progress).await
    }

    /// Download only the subtitle track for an item.
    pub async fn fetch_subtitle(
        &self,
        url: &str,
        lang: &str,
        format: SubtitleFormat,
        dest_dir: &Path,
    ) -> BotResult<PathBuf> {
        let mut cmd = base_command();
        cmd.arg("--no-playlist")
            .arg("--skip-download")
            .args(["--write-subs", "--write-auto-subs"])
            .args(["--sub-langs", lang])
            .args(["--convert-subs", &format.to_string()])
            .args(["-o", &output_template(dest_dir)])
            .arg(url);

        let output = cmd
            .output()
            .await
            .map_err(|e| BotError::download(format!("failed to spawn yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(BotError::download(stderr));
        }

        // --skip-download has no after_move hook, so locate the produced
        // file by its extension.
        let suffix = format!(".{}", format);
        let mut entries = tokio::fs::read_dir(dest_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.to_string_lossy().ends_with(&suffix) {
                return Ok(path);
            }
        }

        Err(BotError::download(format!(
            "no {} subtitles available for language '{}'",
            format, lang
        )))
    }
}

fn base_command() -> process::Command {
    let mut cmd = process::Command::new("yt-dlp");
    cmd.args(["--socket-timeout", "5", "--retries", "3"])
        .kill_on_drop(true);
    cmd
}

fn output_template(dest_dir: &Path) -> String {
    dest_dir
        .join("%(id)s.%(ext)s")
        .to_string_lossy()
        .into_owned()
}

/// Prefer H.264 + AAC at or below the requested height; Telegram plays those
/// without re-encoding.
fn media_format_selector(height: u32) -> String {
    format!(
        "bestvideo[height<={h}][vcodec^=avc1]+bestaudio[acodec^=mp4a]/\
         bestvideo[height<={h}][vcodec^=avc1]+bestaudio/\
         bestvideo[height<={h}]+bestaudio/\
         best[height<={h}]/best",
        h = height
    )
}

/// Run a download command, relaying progress lines and collecting the
/// printed file paths.
async fn run_streaming(
    mut cmd: process::Command,
    progress: mpsc::UnboundedSender<DownloadProgress>,
) -> BotResult<Vec<PathBuf>> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| BotError::download(format!("failed to spawn yt-dlp: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BotError::download("yt-dlp stdout unavailable"))?;

    let mut paths = Vec::new();
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(p) = parse_progress_line(&line) {
            // Receiver may already be gone (final edit in flight); fine.
            let _ = progress.send(p);
        } else if !line.trim().is_empty() {
            paths.push(PathBuf::from(line.trim()));
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| BotError::download(format!("yt-dlp wait failed: {}", e)))?;

    if !output.status.success() && paths.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        log::error!("yt-dlp failed: {}", stderr);
        return Err(BotError::download(stderr));
    }

    Ok(paths)
}

fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let payload = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = payload.split('|');

    let downloaded = parse_number(fields.next()?)?;
    let total = fields.next().and_then(parse_number);
    let rate = fields.next().and_then(parse_number);

    Some(DownloadProgress {
        downloaded,
        total,
        rate,
    })
}

/// yt-dlp renders missing values as "NA" and speeds as floats.
fn parse_number(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        return None;
    }
    field.parse::<f64>().ok().map(|v| v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_lines() {
        let p = parse_progress_line("download:1048576|10485760|524288.5").unwrap();
        assert_eq!(p.downloaded, 1048576);
        assert_eq!(p.total, Some(10485760));
        assert_eq!(p.rate, Some(524288));
        assert_eq!(p.percent(), Some(10.0));
    }

    #[test]
    fn tolerates_missing_fields() {
        let p = parse_progress_line("download:512|NA|NA").unwrap();
        assert_eq!(p.downloaded, 512);
        assert_eq!(p.total, None);
        assert_eq!(p.rate, None);
        assert_eq!(p.percent(), None);
    }

    #[test]
    fn ignores_non_progress_lines() {
        assert_eq!(parse_progress_line("/tmp/videos/abc.mp4"), None);
        assert_eq!(parse_progress_line(""), None);
        assert_eq!(parse_progress_line("[download] Destination: x"), None);
    }

    #[test]
    fn format_selector_caps_height() {
        let sel = media_format_selector(720);
        assert!(sel.contains("height<=720"));
        assert!(sel.ends_with("/best"));
    }
}
