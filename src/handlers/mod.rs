//! Message and callback handlers.
//!
//! Every inline button carries `prefix:payload:token`; the token pins the
//! press to the session it was rendered for. Handlers parse the payload,
//! run the compare-and-swap stage transition, and render the resulting
//! effect. A losing press (expired, replaced, or already consumed session)
//! gets a callback toast and changes nothing.

mod cancel_received;
mod link_received;
mod quality_received;
mod subtitle_format_received;
mod subtitle_lang_received;
mod type_received;

pub use cancel_received::cancel_received;
pub use link_received::{link_received, unsupported_message};
pub use quality_received::quality_received;
pub use subtitle_format_received::subtitle_format_received;
pub use subtitle_lang_received::subtitle_lang_received;
pub use type_received::type_received;

use std::sync::Arc;

use strum::IntoEnumIterator;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, MessageId,
};

use crate::config::{self, Config, QUALITY_LADDER};
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::errors::{BotError, HandlerResult};
use crate::extractor::{ItemMetadata, MediaInfo, SubtitleOrigin};
use crate::flow::{DownloadType, Effect, SubtitleFormat};
use crate::session::{Session, SessionStore};
use crate::utils::format_size;
use crate::worker::{ActiveDownloads, spawn_download};

/// Chat and message the pressed keyboard is attached to.
pub(crate) fn message_coords(query: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    match query.message.as_ref()? {
        MaybeInaccessibleMessage::Regular(m) => Some((m.chat.id, m.id)),
        MaybeInaccessibleMessage::Inaccessible(m) => Some((m.chat.id, m.message_id)),
    }
}

/// Split `prefix:payload:token` callback data.
pub(crate) fn split_payload<'a>(data: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    data.strip_prefix(prefix)?.split_once(':')
}

/// Acknowledge a press against a dead or already-consumed session with a
/// toast; the message it was attached to stays as-is.
pub(crate) async fn answer_stale(bot: &Bot, query: &CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(&query.id)
        .text(BotError::StaleSession.user_message())
        .await?;
    Ok(())
}

fn cancel_button(session: &Session) -> InlineKeyboardButton {
    InlineKeyboardButton::callback("❌ Cancel", format!("cx:{}", session.token))
}

fn chunked_keyboard(
    buttons: Vec<InlineKeyboardButton>,
    per_row: usize,
    session: &Session,
) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();
    for row in buttons.chunks(per_row) {
        keyboard = keyboard.append_row(row.to_vec());
    }
    keyboard.append_row([cancel_button(session)])
}

/// Download type prompt. Collections only get the media button; subtitle
/// fetching is a single-item feature.
pub(crate) fn type_keyboard(session: &Session) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = DownloadType::iter()
        .enumerate()
        .filter(|(_, ty)| {
            matches!(session.media, MediaInfo::Item(_)) || *ty == DownloadType::MediaOnly
        })
        .map(|(idx, ty)| {
            InlineKeyboardButton::callback(ty.to_string(), format!("dt:{}:{}", idx, session.token))
        })
        .collect();

    chunked_keyboard(buttons, 3, session)
}

fn quality_keyboard(session: &Session) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = match &session.media {
        MediaInfo::Item(item) if !item.qualities.is_empty() => item
            .qualities
            .iter()
            .map(|q| {
                let label = match q.approx_size {
                    Some(size) => format!("{} ({})", q.label(), format_size(size)),
                    None => q.label(),
                };
                InlineKeyboardButton::callback(label, format!("q:{}:{}", q.height, session.token))
            })
            .collect(),
        // No format data (collections, or probing came back empty): offer
        // the standard ladder and let yt-dlp pick the closest match.
        _ => QUALITY_LADDER
            .iter()
            .map(|&h| {
                InlineKeyboardButton::callback(format!("{}p", h), format!("q:{}:{}", h, session.token))
            })
            .collect(),
    };

    chunked_keyboard(buttons, 3, session)
}

/// Language prompt; manual tracks are marked ✅, auto-generated ones 🔄.
fn subtitle_lang_keyboard(item: &ItemMetadata, session: &Session) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = item
        .subtitles
        .iter()
        .map(|(lang, track)| {
            let marker = match track.origin {
                SubtitleOrigin::Manual => "✅",
                SubtitleOrigin::Automatic => "🔄",
            };
            let name = config::language_name(lang).unwrap_or(lang);
            InlineKeyboardButton::callback(
                format!("{} {}", marker, name),
                format!("sl:{}:{}", lang, session.token),
            )
        })
        .collect();

    chunked_keyboard(buttons, 2, session)
}

fn subtitle_format_keyboard(session: &Session) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = SubtitleFormat::iter()
        .map(|f| {
            InlineKeyboardButton::callback(
                f.to_string().to_uppercase(),
                format!("sf:{}:{}", f, session.token),
            )
        })
        .collect();

    chunked_keyboard(buttons, 3, session)
}

/// Render the effect of a successful stage transition.
pub(crate) async fn dispatch_effect(
    bot: &Bot,
    chat: ChatId,
    session: &Session,
    effect: Effect,
    sessions: &Arc<SessionStore>,
    downloader: &Arc<Downloader>,
    active: &Arc<ActiveDownloads>,
    history: &HistoryDb,
    config: &Arc<Config>,
) -> HandlerResult {
    match effect {
        Effect::PromptQuality => {
            bot.edit_message_text(chat, session.status_message, "🎚 Pick a quality:")
                .reply_markup(quality_keyboard(session))
                .await?;
        }
        Effect::PromptSubtitleLang => {
            let MediaInfo::Item(item) = &session.media else {
                return Err(BotError::StaleSession);
            };
            if item.subtitles.is_empty() {
                sessions.remove(chat).await;
                bot.edit_message_text(
                    chat,
                    session.status_message,
                    "❌ No subtitles are available for this video.",
                )
                .await?;
                return Ok(());
            }
            bot.edit_message_text(chat, session.status_message, "🗣 Pick a subtitle language:")
                .reply_markup(subtitle_lang_keyboard(item, session))
                .await?;
        }
        Effect::PromptSubtitleFormat => {
            bot.edit_message_text(chat, session.status_message, "📄 Pick a subtitle format:")
                .reply_markup(subtitle_format_keyboard(session))
                .await?;
        }
        Effect::BeginDownload => {
            spawn_download(
                bot.clone(),
                chat,
                session.clone(),
                config.clone(),
                downloader.clone(),
                sessions.clone(),
                active.clone(),
                history.clone(),
            )
            .await;
        }
        Effect::Cancelled => {
            sessions.remove(chat).await;
            active.cancel(chat).await;
            bot.edit_message_text(chat, session.status_message, "❌ Cancelled.")
                .await?;
        }
    }

    Ok(())
}
