use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};

use crate::{
    commands::{cancel, help, start, stats},
    errors::BotError,
    handlers::{
        cancel_received, link_received, quality_received, subtitle_format_received,
        subtitle_lang_received, type_received, unsupported_message,
    },
    utils::classify_url,
};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// Show the welcome message
    Start,
    /// How to use the bot
    Help,
    /// Your download statistics
    Stats,
    /// Cancel the current selection or download
    Cancel,
}

fn callback_with_prefix(prefix: &'static str) -> impl Fn(CallbackQuery) -> bool {
    move |query: CallbackQuery| {
        query
            .data
            .as_deref()
            .is_some_and(|data| data.starts_with(prefix))
    }
}

pub fn schema() -> UpdateHandler<BotError> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Help].endpoint(help))
        .branch(case![Command::Stats].endpoint(stats))
        .branch(case![Command::Cancel].endpoint(cancel));

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            Message::filter_text()
                .filter(|text: String| classify_url(&text).is_some())
                .endpoint(link_received),
        )
        .branch(Message::filter_text().endpoint(unsupported_message));

    let callback_handler = Update::filter_callback_query()
        .branch(
            dptree::filter(callback_with_prefix("dt:")).endpoint(type_received),
        )
        .branch(dptree::filter(callback_with_prefix("q:")).endpoint(quality_received))
        .branch(
            dptree::filter(callback_with_prefix("sl:")).endpoint(subtitle_lang_received),
        )
        .branch(
            dptree::filter(callback_with_prefix("sf:")).endpoint(subtitle_format_received),
        )
        .branch(dptree::filter(callback_with_prefix("cx:")).endpoint(cancel_received));

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}
