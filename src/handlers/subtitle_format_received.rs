use std::str::FromStr;
use std::sync::Arc;

use teloxide::prelude::*;

use crate::config::Config;
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::errors::{BotError, HandlerResult};
use crate::flow::{self, SelectionEvent, Stage, SubtitleFormat};
use crate::handlers::{answer_stale, dispatch_effect, message_coords, split_payload};
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

/// Subtitle format chosen, the last prompt of the subtitle path.
/// Callback data: `sf:format:token`.
pub async fn subtitle_format_received(
    bot: Bot,
    query: CallbackQuery,
    sessions: Arc<SessionStore>,
    downloader: Arc<Downloader>,
    active: Arc<ActiveDownloads>,
    history: HistoryDb,
    config: Arc<Config>,
) -> HandlerResult {
    let data = query
        .data
        .as_deref()
        .ok_or_else(|| BotError::Parse("callback without data".into()))?;
    let (format, token) = split_payload(data, "sf:")
        .ok_or_else(|| BotError::Parse(format!("bad format callback: {}", data)))?;
    let (chat, _) = message_coords(&query)
        .ok_or_else(|| BotError::Parse("callback without message".into()))?;

    let format = SubtitleFormat::from_str(format)?;

    let (next_stage, effect) = match flow::advance(
        Stage::ChoosingSubtitleFormat,
        None,
        &SelectionEvent::SubtitleFormatChosen(format),
    ) {
        Ok(outcome) => outcome,
        Err(BotError::StaleSession) => return answer_stale(&bot, &query).await,
        Err(e) => return Err(e),
    };

    let session = match sessions
        .advance(chat, token, Stage::ChoosingSubtitleFormat, |s| {
            s.subtitle_format = Some(format);
            s.stage = next_stage;
        })
        .await
    {
        Ok(session) => session,
        Err(BotError::StaleSession) => return answer_stale(&bot, &query).await,
        Err(e) => return Err(e),
    };

    bot.answer_callback_query(&query.id).await?;
    dispatch_effect(
        &bot, chat, &session, effect, &sessions, &downloader, &active, &history, &config,
    )
    .await
}
