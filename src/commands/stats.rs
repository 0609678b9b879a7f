use chrono::DateTime;
use teloxide::prelude::*;

use crate::db::{HistoryDb, UserStats};
use crate::errors::HandlerResult;
use crate::utils::format_size;

pub async fn stats(bot: Bot, msg: Message, history: HistoryDb) -> HandlerResult {
    let stats = history.user_stats(msg.chat.id.0).await?;
    bot.send_message(msg.chat.id, stats_text(&stats)).await?;
    Ok(())
}

fn stats_text(stats: &UserStats) -> String {
    if stats.total_downloads == 0 {
        return "📊 No downloads yet. Send me a link to get started!".to_string();
    }

    let mut text = format!(
        "📊 Your stats:\n\n\
         📥 Downloads: {}\n\
         ✅ Completed: {}\n\
         ❌ Failed: {}\n\
         💾 Total delivered: {}",
        stats.total_downloads,
        stats.completed,
        stats.failed,
        format_size(stats.total_bytes.max(0) as u64)
    );

    if let Some(since) = stats
        .member_since
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
    {
        text.push_str(&format!("\n📅 Member since: {}", since.format("%Y-%m-%d")));
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_get_a_nudge() {
        let stats = UserStats {
            total_downloads: 0,
            completed: 0,
            failed: 0,
            total_bytes: 0,
            member_since: None,
        };
        assert!(stats_text(&stats).contains("No downloads yet"));
    }

    #[test]
    fn stats_render_all_counters() {
        let stats = UserStats {
            total_downloads: 5,
            completed: 4,
            failed: 1,
            total_bytes: 52_428_800,
            member_since: Some(1_700_000_000),
        };
        let text = stats_text(&stats);
        assert!(text.contains("Downloads: 5"));
        assert!(text.contains("Completed: 4"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("50.0 MB"));
        assert!(text.contains("2023-11-14"));
    }
}
