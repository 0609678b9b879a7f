use teloxide::prelude::*;

use crate::db::HistoryDb;
use crate::errors::HandlerResult;

pub async fn start(bot: Bot, msg: Message, history: HistoryDb) -> HandlerResult {
    let username = msg.from.as_ref().and_then(|u| u.username.as_deref());
    history.upsert_user(msg.chat.id.0, username).await?;

    bot.send_message(
        msg.chat.id,
        "👋 Send me a YouTube video or playlist link and I'll download it for you.\n\
         You can grab the video itself, its subtitles, or both.\n\n\
         /help shows everything I can do.",
    )
    .await?;
    Ok(())
}
