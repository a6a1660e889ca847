//! Lyrics module for fetching and timing synchronized lyrics
//!
//! This module provides:
//! - The `LyricsProvider` seam the companion fetches documents through
//! - LRCLIB API client and the provider built on it
//! - LRC format parser and the timed document it produces
//! - Title/artist cleanup applied before lookups

pub mod document;
pub mod lrclib;
pub mod parser;
pub mod text;

use crate::track::TrackIdentity;
use async_trait::async_trait;
use thiserror::Error;

pub use document::{InvalidDocumentError, LyricUnit, TimedLyricsDocument};
pub use lrclib::LrclibClient;
pub use parser::ParsedLyrics;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("lyrics provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of timed lyrics for a track.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// `Ok(None)` when the provider has nothing synced for the track.
    async fn fetch(
        &self,
        identity: &TrackIdentity,
    ) -> Result<Option<TimedLyricsDocument>, ProviderError>;
}

/// `LyricsProvider` backed by LRCLIB.
#[derive(Debug, Clone)]
pub struct LrclibProvider {
    client: LrclibClient,
    last_line_ms: u64,
}

impl LrclibProvider {
    pub fn new(client: LrclibClient, last_line_ms: u64) -> Self {
        Self {
            client,
            last_line_ms,
        }
    }

    async fn lookup(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Option<TimedLyricsDocument>, ProviderError> {
        let result = self
            .client
            .get_lyrics(title, artist, None, None)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{e:#}")))?;

        let Some(lyrics) = result else {
            return Ok(None);
        };
        tracing::debug!(
            matched_title = %lyrics.track_name,
            matched_artist = %lyrics.artist_name,
            "lrclib match"
        );
        let Some(synced) = lyrics.synced_lyrics.as_deref().filter(|s| !s.is_empty()) else {
            let has_plain = lyrics.plain_lyrics.as_deref().is_some_and(|s| !s.is_empty());
            tracing::info!(title, artist, has_plain, "lyrics found but not synced");
            return Ok(None);
        };

        let parsed = ParsedLyrics::parse(synced, true);
        Ok(parsed.to_document(lyrics.duration_ms(), self.last_line_ms))
    }
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    async fn fetch(
        &self,
        identity: &TrackIdentity,
    ) -> Result<Option<TimedLyricsDocument>, ProviderError> {
        let title = text::clean_track_name(identity.title());
        let title = title.as_str();
        fetch_with_artist_fallback(title, identity.artist(), move |artist: String| async move {
            self.lookup(title, &artist).await
        })
        .await
    }
}

/// Try the combined artist string first, then each individual performer.
pub async fn fetch_with_artist_fallback<F, Fut>(
    title: &str,
    artist: &str,
    mut lookup: F,
) -> Result<Option<TimedLyricsDocument>, ProviderError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<Option<TimedLyricsDocument>, ProviderError>>,
{
    tracing::info!(title, artist, "searching lyrics");
    if let Some(doc) = lookup(artist.to_string()).await? {
        return Ok(Some(doc));
    }

    for single in text::split_artists(artist) {
        tracing::info!(title, artist = %single, "retrying lyrics with single artist");
        if let Some(doc) = lookup(single).await? {
            return Ok(Some(doc));
        }
    }

    tracing::info!(title, artist, "no lyrics found");
    Ok(None)
}
