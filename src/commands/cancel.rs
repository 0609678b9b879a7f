use std::sync::Arc;

use teloxide::prelude::*;

use crate::errors::HandlerResult;
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

/// /cancel tears down the whole session, aborting an in-flight download
/// if there is one.
pub async fn cancel(
    bot: Bot,
    msg: Message,
    sessions: Arc<SessionStore>,
    active: Arc<ActiveDownloads>,
) -> HandlerResult {
    let chat = msg.chat.id;
    let removed = sessions.remove(chat).await;
    let aborted = active.cancel(chat).await;

    let reply = if removed.is_some() || aborted {
        "❌ Cancelled."
    } else {
        "🤷 Nothing to cancel."
    };
    bot.send_message(chat, reply).await?;

    Ok(())
}
