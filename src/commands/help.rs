use teloxide::prelude::*;

use crate::errors::HandlerResult;

pub async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "📖 How it works:\n\n\
         1. Send a YouTube video or playlist link.\n\
         2. Pick what to download: the media, its subtitles, or both.\n\
         3. Pick a quality (and a subtitle language and format if you asked for subtitles).\n\
         4. I fetch it and send the file here.\n\n\
         Commands:\n\
         /start — intro message\n\
         /help — this text\n\
         /stats — your download history\n\
         /cancel — abandon the current selection or download",
    )
    .await?;
    Ok(())
}
