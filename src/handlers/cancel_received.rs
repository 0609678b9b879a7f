use std::sync::Arc;

use teloxide::prelude::*;

use crate::config::Config;
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::errors::{BotError, HandlerResult};
use crate::flow::{self, SelectionEvent};
use crate::handlers::{answer_stale, dispatch_effect, message_coords};
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

/// Cancel button pressed. Callback data: `cx:token`. Accepted at any stage,
/// downloading included; an in-flight fetch is aborted.
pub async fn cancel_received(
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
    let token = data
        .strip_prefix("cx:")
        .ok_or_else(|| BotError::Parse(format!("bad cancel callback: {}", data)))?;
    let (chat, _) = message_coords(&query)
        .ok_or_else(|| BotError::Parse("callback without message".into()))?;

    let Some(session) = sessions.get(chat).await.filter(|s| s.token.0 == token) else {
        return answer_stale(&bot, &query).await;
    };

    let (_, effect) = flow::advance(session.stage, session.download_type, &SelectionEvent::Cancel)?;

    bot.answer_callback_query(&query.id).await?;
    dispatch_effect(
        &bot, chat, &session, effect, &sessions, &downloader, &active, &history, &config,
    )
    .await
}
