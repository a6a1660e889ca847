//! Media tracker
//!
//! Media players report position sparsely (on play, pause, seek). The
//! tracker keeps an anchor `(position, instant)` and extrapolates from it so
//! the synchronizer can be ticked far more often than reports arrive.

use crate::track::{PlaybackState, Provider, TrackIdentity};
use serde::Deserialize;
use time::OffsetDateTime;

pub const DEFAULT_SEEK_THRESHOLD_MS: u64 = 2_000;
pub const DEFAULT_RADIO_PREFIX: &str = "library://radio";

const SPOTIFY_TRACK_PREFIX: &str = "spotify:track:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Playing,
    Paused,
    Idle,
}

/// One state report from a media player, as read from the JSON-lines feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerReport {
    /// Media player entity the report came from.
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    pub status: PlayerStatus,
    /// Position at `updated_at`.
    #[serde(default)]
    pub position_secs: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl PlayerReport {
    /// What the player says is loaded, if anything.
    pub fn identity(&self) -> Option<TrackIdentity> {
        let title = self.title.clone().unwrap_or_default();
        let artist = self.artist.clone().unwrap_or_default();

        if let Some(id) = self.content_id.as_deref().filter(|id| !id.is_empty()) {
            return Some(match id.strip_prefix(SPOTIFY_TRACK_PREFIX) {
                Some(spotify_id) => TrackIdentity::new(Provider::Spotify, spotify_id, title, artist),
                None => TrackIdentity::new(Provider::Manual, id, title, artist),
            });
        }

        if title.is_empty() {
            return None;
        }
        let key = format!("{artist} - {title}");
        Some(TrackIdentity::new(Provider::Manual, key, title, artist))
    }

    fn source_key(&self) -> SourceKey {
        SourceKey {
            content_id: self.content_id.clone().unwrap_or_default(),
            title: self.title.clone().unwrap_or_default(),
            artist: self.artist.clone().unwrap_or_default(),
        }
    }

    fn position_ms(&self) -> Option<u64> {
        self.position_secs
            .filter(|p| p.is_finite() && *p >= 0.0)
            .map(|p| (p * 1000.0).round() as u64)
    }
}

/// What a report changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerUpdate {
    /// A different item is loaded in the player.
    TrackChanged(Option<TrackIdentity>),
    /// Same item, but the reported position jumped away from the clock.
    Seeked { position_ms: u64 },
    /// Play/pause/idle transition without a jump.
    StateChanged(PlayerStatus),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct SourceKey {
    content_id: String,
    title: String,
    artist: String,
}

#[derive(Debug, Clone)]
pub struct MediaTracker {
    source: Option<SourceKey>,
    track: Option<TrackIdentity>,
    status: PlayerStatus,
    anchor_ms: u64,
    anchor_at: OffsetDateTime,
    seek_threshold_ms: u64,
    radio_prefixes: Vec<String>,
}

impl MediaTracker {
    pub fn new(seek_threshold_ms: u64, radio_prefixes: Vec<String>) -> Self {
        Self {
            source: None,
            track: None,
            status: PlayerStatus::Idle,
            anchor_ms: 0,
            anchor_at: OffsetDateTime::UNIX_EPOCH,
            seek_threshold_ms,
            radio_prefixes,
        }
    }

    pub fn track(&self) -> Option<&TrackIdentity> {
        self.track.as_ref()
    }

    /// True once any player report has been observed.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// True when the loaded content is a radio stream. Radio positions are
    /// meaningless; lyrics for radio come from recognition.
    pub fn is_radio(&self) -> bool {
        self.source.as_ref().is_some_and(|s| {
            self.radio_prefixes
                .iter()
                .any(|p| !p.is_empty() && s.content_id.starts_with(p.as_str()))
        })
    }

    /// Extrapolated position at `now`. Frozen unless playing.
    pub fn position_at(&self, now: OffsetDateTime) -> u64 {
        if self.status != PlayerStatus::Playing {
            return self.anchor_ms;
        }
        self.anchor_ms + elapsed_ms(self.anchor_at, now)
    }

    pub fn snapshot(&self, now: OffsetDateTime) -> PlaybackState {
        PlaybackState {
            track: self.track.clone(),
            position_ms: self.position_at(now),
            is_playing: self.status == PlayerStatus::Playing,
            observed_at: now,
        }
    }

    /// Pin the clock to a recognized track.
    pub fn anchor(&mut self, track: TrackIdentity, position_ms: u64, at: OffsetDateTime) {
        tracing::debug!(track = %track, position_ms, "tracker anchored");
        self.track = Some(track);
        self.anchor_ms = position_ms;
        self.anchor_at = at;
        self.status = PlayerStatus::Playing;
    }

    pub fn observe(&mut self, report: &PlayerReport, now: OffsetDateTime) -> TrackerUpdate {
        let key = report.source_key();

        if self.source.as_ref() != Some(&key) {
            self.source = Some(key);
            self.track = report.identity();
            self.status = report.status;
            let (position, at) = match (report.position_ms(), self.is_radio()) {
                (Some(p), false) => (p, report.updated_at.unwrap_or(now)),
                _ => (0, now),
            };
            self.anchor_ms = match self.status {
                PlayerStatus::Playing => position + elapsed_ms(at, now),
                _ => position,
            };
            self.anchor_at = now;
            tracing::info!(
                track = ?self.track.as_ref().map(ToString::to_string),
                status = ?self.status,
                "player track changed"
            );
            return TrackerUpdate::TrackChanged(self.track.clone());
        }

        let clock_ms = self.position_at(now);
        let previous_status = self.status;
        self.status = report.status;
        // Paused time is not counted: every transition restarts the clock.
        self.anchor_ms = clock_ms;
        self.anchor_at = now;

        if !self.is_radio()
            && let Some(reported) = report.position_ms()
        {
            let reported_now = match (report.status, report.updated_at) {
                (PlayerStatus::Playing, Some(at)) => reported + elapsed_ms(at, now),
                _ => reported,
            };
            if reported_now.abs_diff(clock_ms) > self.seek_threshold_ms {
                self.anchor_ms = reported_now;
                tracing::debug!(from = clock_ms, to = reported_now, "player seeked");
                return TrackerUpdate::Seeked {
                    position_ms: reported_now,
                };
            }
        }

        if previous_status != self.status {
            tracing::debug!(from = ?previous_status, to = ?self.status, "player state changed");
            return TrackerUpdate::StateChanged(self.status);
        }
        TrackerUpdate::Unchanged
    }
}

fn elapsed_ms(from: OffsetDateTime, to: OffsetDateTime) -> u64 {
    (to - from).whole_milliseconds().max(0) as u64
}
