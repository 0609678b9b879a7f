use std::sync::Arc;

use teloxide::prelude::*;

use crate::config::Config;
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::errors::{BotError, HandlerResult};
use crate::flow::{self, SelectionEvent, Stage};
use crate::handlers::{answer_stale, dispatch_effect, message_coords, split_payload};
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

/// Quality chosen. Callback data: `q:height:token`.
pub async fn quality_received(
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
    let (height, token) = split_payload(data, "q:")
        .ok_or_else(|| BotError::Parse(format!("bad quality callback: {}", data)))?;
    let (chat, _) = message_coords(&query)
        .ok_or_else(|| BotError::Parse("callback without message".into()))?;

    let height = height
        .parse::<u32>()
        .map_err(|_| BotError::Parse(format!("bad quality height: {}", height)))?;

    // The chosen download type decides whether quality was the last prompt;
    // the stage check in the swap below keeps this read consistent.
    let Some(current) = sessions.get(chat).await else {
        return answer_stale(&bot, &query).await;
    };

    let (next_stage, effect) = match flow::advance(
        Stage::ChoosingQuality,
        current.download_type,
        &SelectionEvent::QualityChosen(height),
    ) {
        Ok(outcome) => outcome,
        Err(BotError::StaleSession) => return answer_stale(&bot, &query).await,
        Err(e) => return Err(e),
    };

    let session = match sessions
        .advance(chat, token, Stage::ChoosingQuality, |s| {
            s.quality = Some(height);
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
