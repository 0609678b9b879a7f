use std::sync::Arc;

use teloxide::prelude::*;

use crate::config::{self, Config};
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::errors::{BotError, HandlerResult};
use crate::flow::{self, SelectionEvent, Stage};
use crate::handlers::{answer_stale, dispatch_effect, message_coords, split_payload};
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

/// Subtitle language chosen. Callback data: `sl:lang:token`.
pub async fn subtitle_lang_received(
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
    let (lang, token) = split_payload(data, "sl:")
        .ok_or_else(|| BotError::Parse(format!("bad language callback: {}", data)))?;
    let (chat, _) = message_coords(&query)
        .ok_or_else(|| BotError::Parse("callback without message".into()))?;

    if !config::is_supported_language(lang) {
        return Err(BotError::Parse(format!("unknown language code: {}", lang)));
    }

    let (next_stage, effect) = match flow::advance(
        Stage::ChoosingSubtitleLang,
        None,
        &SelectionEvent::SubtitleLangChosen(lang.to_string()),
    ) {
        Ok(outcome) => outcome,
        Err(BotError::StaleSession) => return answer_stale(&bot, &query).await,
        Err(e) => return Err(e),
    };

    let lang = lang.to_string();
    let session = match sessions
        .advance(chat, token, Stage::ChoosingSubtitleLang, |s| {
            s.subtitle_lang = Some(lang);
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
