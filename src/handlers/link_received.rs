use std::sync::Arc;

use teloxide::prelude::*;

use crate::config::Config;
use crate::errors::{BotError, HandlerResult};
use crate::extractor::{Extractor, MediaInfo};
use crate::flow::admit_media;
use crate::handlers::type_keyboard;
use crate::session::{Session, SessionStore};
use crate::utils::{classify_url, format_duration};
use crate::worker::ActiveDownloads;

/// A supported media URL arrived: resolve it, gate it, open a session and
/// show the download type prompt.
pub async fn link_received(
    bot: Bot,
    msg: Message,
    sessions: Arc<SessionStore>,
    extractor: Arc<Extractor>,
    active: Arc<ActiveDownloads>,
    config: Arc<Config>,
) -> HandlerResult {
    let text = msg
        .text()
        .ok_or_else(|| BotError::Parse("text handler got a non-text message".into()))?;
    let kind = classify_url(text).ok_or(BotError::InvalidUrl)?;
    let chat = msg.chat.id;

    // Immediate feedback while yt-dlp probes the URL.
    let status = bot.send_message(chat, "🔍 Fetching info...").await?;

    // A new link replaces whatever the user had going, in-flight download
    // included.
    if sessions.remove(chat).await.is_some() {
        active.cancel(chat).await;
    }

    let media = match extractor.resolve(text, kind).await {
        Ok(media) => media,
        Err(e) => {
            log::warn!("extraction failed for {}: {}", text, e);
            bot.edit_message_text(chat, status.id, e.user_message())
                .await?;
            return Ok(());
        }
    };

    if let Err(e) = admit_media(&media, config.max_collection_items) {
        bot.edit_message_text(chat, status.id, e.user_message())
            .await?;
        return Ok(());
    }

    let session = Session::new(text.to_string(), media, status.id);
    let preview = preview_text(&session.media);
    let keyboard = type_keyboard(&session);
    sessions.put(chat, session).await;

    bot.edit_message_text(chat, status.id, preview)
        .reply_markup(keyboard)
        .await?;

    Ok(())
}

/// Fallback for text that is not a command and not a supported URL.
pub async fn unsupported_message(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "🤔 Send me a YouTube video or playlist link and I'll take it from there.",
    )
    .await?;
    Ok(())
}

fn preview_text(media: &MediaInfo) -> String {
    match media {
        MediaInfo::Item(item) => {
            let mut text = format!(
                "🎬 {}\n👤 {}\n⏱ {}",
                item.title,
                item.uploader,
                format_duration(item.duration_secs)
            );
            if let Some(views) = item.view_count {
                text.push_str(&format!("\n👁 {} views", views));
            }
            text.push_str("\n\nWhat do you want to download?");
            text
        }
        MediaInfo::Collection(coll) => format!(
            "📚 {}\n👤 {}\n🎞 {} items\n\nWhat do you want to download?",
            coll.title,
            coll.uploader,
            coll.entries.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{CollectionEntry, CollectionMetadata, ItemMetadata};
    use std::collections::BTreeMap;

    #[test]
    fn item_preview_carries_the_metadata() {
        let media = MediaInfo::Item(ItemMetadata {
            id: "abc".into(),
            title: "A Video".into(),
            uploader: "Channel".into(),
            duration_secs: 125,
            view_count: Some(42),
            qualities: vec![],
            subtitles: BTreeMap::new(),
        });
        let text = preview_text(&media);
        assert!(text.contains("A Video"));
        assert!(text.contains("2:05"));
        assert!(text.contains("42 views"));
    }

    #[test]
    fn collection_preview_counts_entries() {
        let media = MediaInfo::Collection(CollectionMetadata {
            id: "pl".into(),
            title: "A Playlist".into(),
            uploader: "Channel".into(),
            entries: vec![CollectionEntry {
                id: "v1".into(),
                title: "First".into(),
                duration_secs: None,
            }],
        });
        assert!(preview_text(&media).contains("1 items"));
    }
}
