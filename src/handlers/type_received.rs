use std::sync::Arc;

use strum::IntoEnumIterator;
use teloxide::prelude::*;

use crate::config::Config;
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::errors::{BotError, HandlerResult};
use crate::extractor::MediaInfo;
use crate::flow::{self, DownloadType, SelectionEvent, Stage};
use crate::handlers::{answer_stale, dispatch_effect, message_coords, split_payload};
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

/// Download type chosen. Callback data: `dt:type_index:token`.
pub async fn type_received(
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
    let (idx, token) = split_payload(data, "dt:")
        .ok_or_else(|| BotError::Parse(format!("bad type callback: {}", data)))?;
    let (chat, _) = message_coords(&query)
        .ok_or_else(|| BotError::Parse("callback without message".into()))?;

    let ty = idx
        .parse::<usize>()
        .ok()
        .and_then(|i| DownloadType::iter().nth(i))
        .ok_or_else(|| BotError::Parse(format!("bad type index: {}", idx)))?;

    // Collections never get the subtitle buttons; a press asking for them
    // can only come from a stale keyboard.
    let current = sessions.get(chat).await;
    if ty.wants_subtitles()
        && !matches!(
            current.as_ref().map(|s| &s.media),
            Some(MediaInfo::Item(_))
        )
    {
        return answer_stale(&bot, &query).await;
    }

    let (next_stage, effect) =
        match flow::advance(Stage::ChoosingType, None, &SelectionEvent::TypeChosen(ty)) {
            Ok(outcome) => outcome,
            Err(BotError::StaleSession) => return answer_stale(&bot, &query).await,
            Err(e) => return Err(e),
        };

    let session = match sessions
        .advance(chat, token, Stage::ChoosingType, |s| {
            s.download_type = Some(ty);
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
