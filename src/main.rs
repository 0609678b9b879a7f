mod commands;
mod config;
mod db;
mod downloader;
mod errors;
mod extractor;
mod flow;
mod handlers;
mod migrations;
mod schema;
mod session;
mod temp_file;
mod utils;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use teloxide::prelude::*;

use crate::config::Config;
use crate::db::HistoryDb;
use crate::downloader::Downloader;
use crate::extractor::Extractor;
use crate::migrations::run_migrations;
use crate::schema::schema;
use crate::session::SessionStore;
use crate::worker::ActiveDownloads;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    pretty_env_logger::init();
    log::info!("Starting download bot...");

    let config = Arc::new(Config::from_env());
    if let Err(e) = tokio::fs::create_dir_all(&config.download_dir).await {
        log::error!("cannot create {:?}: {}", config.download_dir, e);
        return;
    }

    let pool = match SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("cannot open database {}: {}", config.database_url, e);
            return;
        }
    };
    if let Err(e) = run_migrations(&pool).await {
        log::error!("migrations failed: {}", e);
        return;
    }
    let history = HistoryDb::new(pool);

    let bot = Bot::from_env();
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let extractor = Arc::new(Extractor::new());
    let downloader = Arc::new(Downloader::new());
    let active = Arc::new(ActiveDownloads::new(config.max_concurrent_downloads));

    // Sweep abandoned sessions so their downloads don't outlive the user's
    // interest.
    tokio::spawn(sweep_expired_sessions(sessions.clone(), active.clone()));

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![
            sessions,
            extractor,
            downloader,
            active,
            history,
            config
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn sweep_expired_sessions(sessions: Arc<SessionStore>, active: Arc<ActiveDownloads>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        for chat in sessions.purge_expired().await {
            active.cancel(chat).await;
            log::info!("expired session for chat {}", chat);
        }
    }
}
