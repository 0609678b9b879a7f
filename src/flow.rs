//! The selection flow state machine.
//!
//! A session walks forward through `ChoosingType -> ChoosingQuality ->
//! ChoosingSubtitleLang -> ChoosingSubtitleFormat -> Downloading`, skipping
//! the stages the chosen download type doesn't need. [`advance`] is a pure
//! function of the current stage and the incoming event; it never touches
//! the store, so the whole transition table is unit-testable without a bot.

use strum::{Display, EnumIter, EnumString};

use crate::errors::{BotError, BotResult};
use crate::extractor::MediaInfo;

/// Discrete point in the selection flow. `AwaitingURL` is implicit: a user
/// without a session is awaiting a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ChoosingType,
    ChoosingQuality,
    ChoosingSubtitleLang,
    ChoosingSubtitleFormat,
    Downloading,
}

#[derive(EnumIter, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadType {
    #[strum(to_string = "🎬 Media")]
    MediaOnly,
    #[strum(to_string = "📝 Subtitles")]
    SubtitleOnly,
    #[strum(to_string = "🎬📝 Both")]
    Both,
}

impl DownloadType {
    pub fn wants_media(self) -> bool {
        matches!(self, DownloadType::MediaOnly | DownloadType::Both)
    }

    pub fn wants_subtitles(self) -> bool {
        matches!(self, DownloadType::SubtitleOnly | DownloadType::Both)
    }
}

#[derive(EnumIter, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Ass,
}

/// A single user choice arriving from a button press or /cancel.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    TypeChosen(DownloadType),
    QualityChosen(u32),
    SubtitleLangChosen(String),
    SubtitleFormatChosen(SubtitleFormat),
    Cancel,
}

/// What the controller must do after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    PromptQuality,
    PromptSubtitleLang,
    PromptSubtitleFormat,
    BeginDownload,
    /// Session destroyed by explicit cancel
    Cancelled,
}

/// Gate for the `AwaitingURL -> ChoosingType` transition: a collection over
/// the configured limit never gets a session.
pub fn admit_media(media: &MediaInfo, max_items: usize) -> BotResult<()> {
    match media {
        MediaInfo::Item(_) => Ok(()),
        MediaInfo::Collection(c) if c.entries.len() <= max_items => Ok(()),
        MediaInfo::Collection(c) => Err(BotError::OversizeCollection {
            count: c.entries.len(),
            max: max_items,
        }),
    }
}

/// Compute the next stage and effect for an event, or `StaleSession` if the
/// event is not legal for the current stage. The stage only moves forward;
/// cancel is the one event accepted everywhere.
pub fn advance(
    stage: Stage,
    download_type: Option<DownloadType>,
    event: &SelectionEvent,
) -> BotResult<(Stage, Effect)> {
    use SelectionEvent::*;

    match (stage, event) {
        (_, Cancel) => Ok((stage, Effect::Cancelled)),
        (Stage::ChoosingType, TypeChosen(t)) => {
            if t.wants_media() {
                Ok((Stage::ChoosingQuality, Effect::PromptQuality))
            } else {
                Ok((Stage::ChoosingSubtitleLang, Effect::PromptSubtitleLang))
            }
        }
        (Stage::ChoosingQuality, QualityChosen(_)) => {
            if download_type == Some(DownloadType::Both) {
                Ok((Stage::ChoosingSubtitleLang, Effect::PromptSubtitleLang))
            } else {
                Ok((Stage::Downloading, Effect::BeginDownload))
            }
        }
        (Stage::ChoosingSubtitleLang, SubtitleLangChosen(_)) => {
            Ok((Stage::ChoosingSubtitleFormat, Effect::PromptSubtitleFormat))
        }
        (Stage::ChoosingSubtitleFormat, SubtitleFormatChosen(_)) => {
            Ok((Stage::Downloading, Effect::BeginDownload))
        }
        _ => Err(BotError::StaleSession),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{CollectionEntry, CollectionMetadata, ItemMetadata, MediaInfo};
    use std::collections::BTreeMap;

    fn item() -> MediaInfo {
        MediaInfo::Item(ItemMetadata {
            id: "abc".into(),
            title: "A Video".into(),
            uploader: "someone".into(),
            duration_secs: 120,
            view_count: None,
            qualities: vec![],
            subtitles: BTreeMap::new(),
        })
    }

    fn collection(n: usize) -> MediaInfo {
        MediaInfo::Collection(CollectionMetadata {
            id: "pl".into(),
            title: "A Playlist".into(),
            uploader: "someone".into(),
            entries: (0..n)
                .map(|i| CollectionEntry {
                    id: format!("v{}", i),
                    title: format!("Video {}", i),
                    duration_secs: None,
                })
                .collect(),
        })
    }

    #[test]
    fn items_and_small_collections_are_admitted() {
        assert!(admit_media(&item(), 50).is_ok());
        assert!(admit_media(&collection(50), 50).is_ok());
    }

    #[test]
    fn oversize_collection_is_rejected() {
        let err = admit_media(&collection(80), 50).unwrap_err();
        assert!(matches!(
            err,
            BotError::OversizeCollection { count: 80, max: 50 }
        ));
    }

    #[test]
    fn media_only_skips_subtitle_stages() {
        let (stage, effect) = advance(
            Stage::ChoosingType,
            None,
            &SelectionEvent::TypeChosen(DownloadType::MediaOnly),
        )
        .unwrap();
        assert_eq!(stage, Stage::ChoosingQuality);
        assert_eq!(effect, Effect::PromptQuality);

        let (stage, effect) = advance(
            stage,
            Some(DownloadType::MediaOnly),
            &SelectionEvent::QualityChosen(720),
        )
        .unwrap();
        assert_eq!(stage, Stage::Downloading);
        assert_eq!(effect, Effect::BeginDownload);
    }

    #[test]
    fn subtitle_only_skips_quality() {
        let (stage, effect) = advance(
            Stage::ChoosingType,
            None,
            &SelectionEvent::TypeChosen(DownloadType::SubtitleOnly),
        )
        .unwrap();
        assert_eq!(stage, Stage::ChoosingSubtitleLang);
        assert_eq!(effect, Effect::PromptSubtitleLang);
    }

    #[test]
    fn both_walks_every_stage() {
        let ty = DownloadType::Both;

        let (stage, _) = advance(Stage::ChoosingType, None, &SelectionEvent::TypeChosen(ty)).unwrap();
        assert_eq!(stage, Stage::ChoosingQuality);

        let (stage, effect) =
            advance(stage, Some(ty), &SelectionEvent::QualityChosen(480)).unwrap();
        assert_eq!(stage, Stage::ChoosingSubtitleLang);
        assert_eq!(effect, Effect::PromptSubtitleLang);

        let (stage, effect) = advance(
            stage,
            Some(ty),
            &SelectionEvent::SubtitleLangChosen("en".into()),
        )
        .unwrap();
        assert_eq!(stage, Stage::ChoosingSubtitleFormat);
        assert_eq!(effect, Effect::PromptSubtitleFormat);

        let (stage, effect) = advance(
            stage,
            Some(ty),
            &SelectionEvent::SubtitleFormatChosen(SubtitleFormat::Srt),
        )
        .unwrap();
        assert_eq!(stage, Stage::Downloading);
        assert_eq!(effect, Effect::BeginDownload);
    }

    #[test]
    fn cancel_is_accepted_at_every_stage() {
        for stage in [
            Stage::ChoosingType,
            Stage::ChoosingQuality,
            Stage::ChoosingSubtitleLang,
            Stage::ChoosingSubtitleFormat,
            Stage::Downloading,
        ] {
            let (_, effect) = advance(stage, None, &SelectionEvent::Cancel).unwrap();
            assert_eq!(effect, Effect::Cancelled);
        }
    }

    #[test]
    fn out_of_order_events_are_stale() {
        // Quality press while still choosing the type
        assert!(matches!(
            advance(Stage::ChoosingType, None, &SelectionEvent::QualityChosen(720)),
            Err(BotError::StaleSession)
        ));
        // Repeated quality press after the stage already advanced
        assert!(matches!(
            advance(
                Stage::Downloading,
                Some(DownloadType::MediaOnly),
                &SelectionEvent::QualityChosen(720)
            ),
            Err(BotError::StaleSession)
        ));
        // Format press before a language was picked
        assert!(matches!(
            advance(
                Stage::ChoosingSubtitleLang,
                Some(DownloadType::SubtitleOnly),
                &SelectionEvent::SubtitleFormatChosen(SubtitleFormat::Vtt)
            ),
            Err(BotError::StaleSession)
        ));
    }

    #[test]
    fn transition_is_deterministic() {
        for _ in 0..3 {
            let a = advance(
                Stage::ChoosingType,
                None,
                &SelectionEvent::TypeChosen(DownloadType::Both),
            )
            .unwrap();
            assert_eq!(a, (Stage::ChoosingQuality, Effect::PromptQuality));
        }
    }
}
