//! Background download execution.
//!
//! Each user has at most one in-flight download, tracked by its join handle
//! so a cancel event (or a session overwrite) aborts it. Aborting the task
//! kills the yt-dlp subprocess (`kill_on_drop`) and drops the working
//! directory guard, so no partial file survives and nothing is delivered
//! after a cancel. A semaphore caps how many downloads run at once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId};
use teloxide::{ApiError, RequestError};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::HistoryDb;
use crate::downloader::{DownloadProgress, Downloader};
use crate::errors::{BotError, BotResult};
use crate::extractor::{CollectionMetadata, ItemMetadata, MediaInfo};
use crate::session::{DownloadRequest, Session, SessionStore};
use crate::temp_file::TempDir;
use crate::utils::format_size;

/// Registry of in-flight download tasks, one per chat.
pub struct ActiveDownloads {
    tasks: Mutex<HashMap<ChatId, JoinHandle<()>>>,
    limiter: Arc<Semaphore>,
}

impl ActiveDownloads {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            limiter: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Abort and forget the chat's in-flight download, if any.
    pub async fn cancel(&self, chat: ChatId) -> bool {
        match self.tasks.lock().await.remove(&chat) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    async fn insert(&self, chat: ChatId, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks.lock().await.insert(chat, handle) {
            // Session was overwritten while a download was still running.
            old.abort();
        }
    }

    async fn clear(&self, chat: ChatId) {
        self.tasks.lock().await.remove(&chat);
    }
}

/// Execute the `BeginDownload` effect: spawn the tracked task that fetches,
/// delivers, records history, and tears the session down on every exit path.
pub async fn spawn_download(
    bot: Bot,
    chat: ChatId,
    session: Session,
    config: Arc<Config>,
    downloader: Arc<Downloader>,
    sessions: Arc<SessionStore>,
    active: Arc<ActiveDownloads>,
    history: HistoryDb,
) {
    let limiter = active.limiter.clone();
    let registry = active.clone();

    let handle = tokio::spawn(async move {
        let permit = match limiter.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                let _ = bot
                    .edit_message_text(
                        chat,
                        session.status_message,
                        "⏳ Waiting for a free download slot...",
                    )
                    .await;
                match limiter.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                }
            }
        };

        let outcome = run_download(&bot, chat, &session, &config, &downloader, &history).await;
        drop(permit);

        if let Err(e) = &outcome {
            log::error!("download for chat {} failed: {}", chat, e);
            let _ = bot
                .edit_message_text(chat, session.status_message, e.user_message())
                .await;
            let _ = history
                .record_completion(
                    chat.0,
                    &session.url,
                    session.media.title(),
                    history_kind(&session),
                    session.quality.map(|h| format!("{}p", h)).as_deref(),
                    None,
                    "failed",
                )
                .await;
        }

        sessions.remove(chat).await;
        registry.clear(chat).await;
    });

    active.insert(chat, handle).await;
}

fn history_kind(session: &Session) -> &'static str {
    match (&session.media, session.download_request()) {
        (MediaInfo::Collection(_), _) => "collection",
        (_, Some(DownloadRequest::Media { .. })) => "media",
        (_, Some(DownloadRequest::Subtitle { .. })) => "subtitle",
        (_, Some(DownloadRequest::Both { .. })) => "media+subtitle",
        (_, None) => "unknown",
    }
}

async fn run_download(
    bot: &Bot,
    chat: ChatId,
    session: &Session,
    config: &Config,
    downloader: &Downloader,
    history: &HistoryDb,
) -> BotResult<()> {
    let request = session
        .download_request()
        .ok_or_else(|| BotError::download("selection incomplete"))?;

    // Working directory for this session; removed on every exit path,
    // abort included.
    let work = TempDir::create(
        config
            .download_dir
            .join(format!("chat{}_{}", chat.0, session.token)),
    )?;

    match &session.media {
        MediaInfo::Item(item) => {
            run_item_download(
                bot, chat, session, item, &request, config, downloader, history,
                work.path(),
            )
            .await
        }
        MediaInfo::Collection(coll) => {
            run_collection_download(
                bot, chat, session, coll, &request, config, downloader, history,
                work.path(),
            )
            .await
        }
    }
}

async fn run_item_download(
    bot: &Bot,
    chat: ChatId,
    session: &Session,
    item: &ItemMetadata,
    request: &DownloadRequest,
    config: &Config,
    downloader: &Downloader,
    history: &HistoryDb,
    work: &Path,
) -> BotResult<()> {
    let mut delivered_bytes: i64 = 0;

    if let DownloadRequest::Media { quality } | DownloadRequest::Both { quality, .. } = request {
        bot.edit_message_text(
            chat,
            session.status_message,
            format!("⏳ Downloading in {}p...", quality),
        )
        .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = spawn_progress_relay(
            bot.clone(),
            chat,
            session.status_message,
            item.title.clone(),
            config.progress_interval,
            rx,
        );
        let fetched = downloader.fetch(&session.url, *quality, work, tx).await;
        let _ = relay.await;
        let file = fetched?;

        delivered_bytes += deliver_media(bot, chat, &file, &item.title, config).await?;
    }

    if let DownloadRequest::Subtitle { lang, format }
    | DownloadRequest::Both { lang, format, .. } = request
    {
        bot.edit_message_text(
            chat,
            session.status_message,
            format!("⏳ Fetching {} subtitles...", lang),
        )
        .await?;

        let file = downloader
            .fetch_subtitle(&session.url, lang, *format, work)
            .await?;
        delivered_bytes += deliver_document(bot, chat, &file, &item.title, config).await?;
    }

    bot.edit_message_text(chat, session.status_message, "✅ Done!")
        .await?;

    history
        .record_completion(
            chat.0,
            &session.url,
            &item.title,
            history_kind(session),
            session.quality.map(|h| format!("{}p", h)).as_deref(),
            Some(delivered_bytes),
            "completed",
        )
        .await?;

    Ok(())
}

async fn run_collection_download(
    bot: &Bot,
    chat: ChatId,
    session: &Session,
    coll: &CollectionMetadata,
    request: &DownloadRequest,
    config: &Config,
    downloader: &Downloader,
    history: &HistoryDb,
    work: &Path,
) -> BotResult<()> {
    // Collections only go through the media path; the type prompt never
    // offers subtitle downloads for them.
    let DownloadRequest::Media { quality } = request else {
        return Err(BotError::download(
            "subtitle downloads are not available for collections",
        ));
    };

    let total = coll.entries.len();
    bot.edit_message_text(
        chat,
        session.status_message,
        format!("⏳ Downloading playlist ({} items) in {}p...", total, quality),
    )
    .await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let relay = spawn_progress_relay(
        bot.clone(),
        chat,
        session.status_message,
        coll.title.clone(),
        config.progress_interval,
        rx,
    );
    let fetched = downloader
        .fetch_collection(&session.url, *quality, work, tx)
        .await;
    let _ = relay.await;
    let files = fetched?;

    let failed = total.saturating_sub(files.len());
    let mut delivered = 0usize;
    let mut skipped_oversize = 0usize;
    let mut delivered_bytes: i64 = 0;

    for file in files.iter().take(config.max_collection_deliveries) {
        match deliver_media(bot, chat, file, &coll.title, config).await {
            Ok(bytes) => {
                delivered += 1;
                delivered_bytes += bytes;
            }
            Err(BotError::FileTooLarge { .. }) => skipped_oversize += 1,
            Err(e) => return Err(e),
        }
    }

    let mut summary = format!(
        "✅ Playlist finished: {} downloaded, {} failed.",
        files.len(),
        failed
    );
    if files.len() > delivered + skipped_oversize {
        summary.push_str(&format!("\n📁 Sent the first {} files.", delivered));
    }
    if skipped_oversize > 0 {
        summary.push_str(&format!(
            "\n⚠️ {} files were too large to send.",
            skipped_oversize
        ));
    }
    bot.edit_message_text(chat, session.status_message, summary)
        .await?;

    history
        .record_completion(
            chat.0,
            &session.url,
            &coll.title,
            "collection",
            Some(&format!("{}p", quality)),
            Some(delivered_bytes),
            "completed",
        )
        .await?;

    Ok(())
}

/// Send a media file, enforcing the delivery size limit. Returns the file
/// size in bytes.
async fn deliver_media(
    bot: &Bot,
    chat: ChatId,
    file: &Path,
    caption: &str,
    config: &Config,
) -> BotResult<i64> {
    let size = tokio::fs::metadata(file).await?.len();
    if size > config.max_delivery_bytes {
        return Err(BotError::FileTooLarge { size });
    }

    let result = bot
        .send_video(chat, InputFile::file(file))
        .caption(format!("🎬 {}", caption))
        .supports_streaming(true)
        .await;

    match result {
        Ok(_) => Ok(size as i64),
        Err(RequestError::Api(ApiError::RequestEntityTooLarge)) => {
            Err(BotError::FileTooLarge { size })
        }
        Err(e) => Err(e.into()),
    }
}

async fn deliver_document(
    bot: &Bot,
    chat: ChatId,
    file: &Path,
    caption: &str,
    config: &Config,
) -> BotResult<i64> {
    let size = tokio::fs::metadata(file).await?.len();
    if size > config.max_delivery_bytes {
        return Err(BotError::FileTooLarge { size });
    }

    bot.send_document(chat, InputFile::file(file))
        .caption(format!("📄 {}", caption))
        .await?;

    Ok(size as i64)
}

/// Relay progress events into message edits, at most one edit per
/// `interval`. The task ends when the sender side (the fetch) is dropped.
fn spawn_progress_relay(
    bot: Bot,
    chat: ChatId,
    message: MessageId,
    title: String,
    interval: Duration,
    mut rx: mpsc::UnboundedReceiver<DownloadProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_edit: Option<Instant> = None;

        while let Some(progress) = rx.recv().await {
            if last_edit.is_some_and(|t| t.elapsed() < interval) {
                continue;
            }
            last_edit = Some(Instant::now());

            // Identical-text edits fail with a Telegram error; ignore.
            let _ = bot
                .edit_message_text(chat, message, progress_text(&title, &progress))
                .await;
        }
    })
}

fn progress_text(title: &str, progress: &DownloadProgress) -> String {
    let mut text = format!("⬇️ {}\n", title);

    match (progress.percent(), progress.total) {
        (Some(percent), Some(total)) => {
            text.push_str(&format!(
                "📊 {:.1}% ({} / {})",
                percent,
                format_size(progress.downloaded),
                format_size(total)
            ));
        }
        _ => {
            text.push_str(&format!("📊 {} downloaded", format_size(progress.downloaded)));
        }
    }

    if let Some(rate) = progress.rate {
        text.push_str(&format!("\n🚀 {}/s", format_size(rate)));
    }

    text
}
