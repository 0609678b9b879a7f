//! Per-user selection sessions.
//!
//! One session per chat at a time, created when a supported URL arrives and
//! destroyed on cancel, completion, failure, or inactivity. The store is
//! injected through the dispatcher dependency map so tests can build an
//! isolated instance; nothing here is a process-wide singleton.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use teloxide::types::{ChatId, MessageId};
use tokio::sync::Mutex;

use crate::errors::{BotError, BotResult};
use crate::extractor::MediaInfo;
use crate::flow::{DownloadType, Stage, SubtitleFormat};

/// Callback-safe session identifier (8 chars of a UUID). Every inline button
/// carries the token of the session it was rendered for, so a press against
/// a dead or replaced session is detectable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string()[..8].to_string())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub stage: Stage,
    /// Set once when the URL is accepted, immutable afterwards
    pub url: String,
    pub media: MediaInfo,
    pub download_type: Option<DownloadType>,
    pub quality: Option<u32>,
    pub subtitle_lang: Option<String>,
    pub subtitle_format: Option<SubtitleFormat>,
    /// The message the bot keeps editing through the flow
    pub status_message: MessageId,
    last_activity: Instant,
}

/// Fully validated download parameters, only constructible once every field
/// the chosen type needs is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadRequest {
    Media {
        quality: u32,
    },
    Subtitle {
        lang: String,
        format: SubtitleFormat,
    },
    Both {
        quality: u32,
        lang: String,
        format: SubtitleFormat,
    },
}

impl Session {
    pub fn new(url: String, media: MediaInfo, status_message: MessageId) -> Self {
        Self {
            token: SessionToken::new(),
            stage: Stage::ChoosingType,
            url,
            media,
            download_type: None,
            quality: None,
            subtitle_lang: None,
            subtitle_format: None,
            status_message,
            last_activity: Instant::now(),
        }
    }

    /// Assemble the download parameters, or `None` if a field required by
    /// the chosen type is missing.
    pub fn download_request(&self) -> Option<DownloadRequest> {
        match self.download_type? {
            DownloadType::MediaOnly => Some(DownloadRequest::Media {
                quality: self.quality?,
            }),
            DownloadType::SubtitleOnly => Some(DownloadRequest::Subtitle {
                lang: self.subtitle_lang.clone()?,
                format: self.subtitle_format?,
            }),
            DownloadType::Both => Some(DownloadRequest::Both {
                quality: self.quality?,
                lang: self.subtitle_lang.clone()?,
                format: self.subtitle_format?,
            }),
        }
    }
}

pub struct SessionStore {
    inner: Mutex<HashMap<ChatId, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get(&self, chat: ChatId) -> Option<Session> {
        self.inner.lock().await.get(&chat).cloned()
    }

    /// Create or replace the session for a chat. Last writer wins; the
    /// caller is responsible for aborting any in-flight download that
    /// belonged to the replaced session.
    pub async fn put(&self, chat: ChatId, session: Session) {
        self.inner.lock().await.insert(chat, session);
    }

    pub async fn remove(&self, chat: ChatId) -> Option<Session> {
        self.inner.lock().await.remove(&chat)
    }

    /// Compare-and-swap stage transition. The mutation only runs if the
    /// session still exists, still carries `token`, and is still at
    /// `expected` — otherwise the press is stale. Held under the map lock,
    /// so of two rapid presses only the first can win.
    pub async fn advance<F>(
        &self,
        chat: ChatId,
        token: &str,
        expected: Stage,
        apply: F,
    ) -> BotResult<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut inner = self.inner.lock().await;
        let session = inner.get_mut(&chat).ok_or(BotError::StaleSession)?;

        if session.token.0 != token || session.stage != expected {
            return Err(BotError::StaleSession);
        }

        apply(session);
        session.last_activity = Instant::now();
        Ok(session.clone())
    }

    /// Drop sessions idle longer than the TTL and return their owners so
    /// the caller can abort any in-flight work.
    pub async fn purge_expired(&self) -> Vec<ChatId> {
        let mut inner = self.inner.lock().await;
        let expired: Vec<ChatId> = inner
            .iter()
            .filter(|(_, s)| s.last_activity.elapsed() > self.ttl)
            .map(|(chat, _)| *chat)
            .collect();

        for chat in &expired {
            inner.remove(chat);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ItemMetadata;
    use std::collections::BTreeMap;

    fn media() -> MediaInfo {
        MediaInfo::Item(ItemMetadata {
            id: "abc".into(),
            title: "A Video".into(),
            uploader: "someone".into(),
            duration_secs: 60,
            view_count: Some(10),
            qualities: vec![],
            subtitles: BTreeMap::new(),
        })
    }

    fn session() -> Session {
        Session::new("https://youtu.be/abc".into(), media(), MessageId(1))
    }

    #[tokio::test]
    async fn put_get_remove() {
        let store = SessionStore::new(Duration::from_secs(900));
        let chat = ChatId(1);

        assert!(store.get(chat).await.is_none());
        store.put(chat, session()).await;
        assert!(store.get(chat).await.is_some());
        assert!(store.remove(chat).await.is_some());
        assert!(store.get(chat).await.is_none());
        // remove is a no-op when absent
        assert!(store.remove(chat).await.is_none());
    }

    #[tokio::test]
    async fn put_overwrites_previous_session() {
        let store = SessionStore::new(Duration::from_secs(900));
        let chat = ChatId(1);

        let first = session();
        let first_token = first.token.clone();
        store.put(chat, first).await;
        store.put(chat, session()).await;

        let current = store.get(chat).await.unwrap();
        assert_ne!(current.token, first_token);
    }

    #[tokio::test]
    async fn advance_applies_under_matching_token_and_stage() {
        let store = SessionStore::new(Duration::from_secs(900));
        let chat = ChatId(1);
        let s = session();
        let token = s.token.0.clone();
        store.put(chat, s).await;

        let updated = store
            .advance(chat, &token, Stage::ChoosingType, |s| {
                s.download_type = Some(DownloadType::MediaOnly);
                s.stage = Stage::ChoosingQuality;
            })
            .await
            .unwrap();
        assert_eq!(updated.stage, Stage::ChoosingQuality);
    }

    #[tokio::test]
    async fn double_press_is_stale() {
        let store = SessionStore::new(Duration::from_secs(900));
        let chat = ChatId(1);
        let s = session();
        let token = s.token.0.clone();
        store.put(chat, s).await;

        // First press advances the stage.
        store
            .advance(chat, &token, Stage::ChoosingType, |s| {
                s.stage = Stage::ChoosingQuality;
            })
            .await
            .unwrap();

        // Second press carries the same expectations and must lose.
        let err = store
            .advance(chat, &token, Stage::ChoosingType, |s| {
                s.stage = Stage::ChoosingQuality;
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::StaleSession));
    }

    #[tokio::test]
    async fn wrong_token_is_stale_and_mutates_nothing() {
        let store = SessionStore::new(Duration::from_secs(900));
        let chat = ChatId(1);
        store.put(chat, session()).await;

        let err = store
            .advance(chat, "deadbeef", Stage::ChoosingType, |s| {
                s.stage = Stage::Downloading;
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::StaleSession));
        assert_eq!(store.get(chat).await.unwrap().stage, Stage::ChoosingType);
    }

    #[tokio::test]
    async fn stale_press_never_touches_other_users() {
        let store = SessionStore::new(Duration::from_secs(900));
        store.put(ChatId(1), session()).await;
        let other = session();
        let other_token = other.token.0.clone();
        store.put(ChatId(2), other).await;

        let _ = store
            .advance(ChatId(1), "deadbeef", Stage::ChoosingQuality, |s| {
                s.stage = Stage::Downloading;
            })
            .await;

        let untouched = store.get(ChatId(2)).await.unwrap();
        assert_eq!(untouched.token.0, other_token);
        assert_eq!(untouched.stage, Stage::ChoosingType);
    }

    #[tokio::test]
    async fn purge_removes_only_idle_sessions() {
        let store = SessionStore::new(Duration::ZERO);
        store.put(ChatId(1), session()).await;
        // Zero TTL: everything is instantly idle.
        let expired = store.purge_expired().await;
        assert_eq!(expired, vec![ChatId(1)]);
        assert!(store.get(ChatId(1)).await.is_none());

        let store = SessionStore::new(Duration::from_secs(900));
        store.put(ChatId(1), session()).await;
        assert!(store.purge_expired().await.is_empty());
        assert!(store.get(ChatId(1)).await.is_some());
    }

    #[test]
    fn download_request_requires_fields_for_type() {
        let mut s = session();
        assert_eq!(s.download_request(), None);

        s.download_type = Some(DownloadType::Both);
        assert_eq!(s.download_request(), None);

        s.quality = Some(480);
        assert_eq!(s.download_request(), None);

        s.subtitle_lang = Some("en".into());
        s.subtitle_format = Some(SubtitleFormat::Srt);
        assert_eq!(
            s.download_request(),
            Some(DownloadRequest::Both {
                quality: 480,
                lang: "en".into(),
                format: SubtitleFormat::Srt,
            })
        );

        s.download_type = Some(DownloadType::MediaOnly);
        assert_eq!(
            s.download_request(),
            Some(DownloadRequest::Media { quality: 480 })
        );
    }
}
