use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Where a track identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    AcrCloud,
    Spotify,
    Manual,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::AcrCloud => "acrcloud",
            Provider::Spotify => "spotify",
            Provider::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "acrcloud" => Some(Provider::AcrCloud),
            "spotify" => Some(Provider::Spotify),
            "manual" => Some(Provider::Manual),
            _ => None,
        }
    }
}

/// Identity of a playing track. Used as the lyrics lookup and cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackIdentity {
    provider: Provider,
    external_id: String,
    title: String,
    artist: String,
}

impl TrackIdentity {
    pub fn new(
        provider: Provider,
        external_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            external_id: external_id.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({}:{})",
            self.artist,
            self.title,
            self.provider.as_str(),
            self.external_id
        )
    }
}

/// Snapshot of the player as seen by a position source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub track: Option<TrackIdentity>,
    pub position_ms: u64,
    pub is_playing: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl PlaybackState {
    pub fn new(track: Option<TrackIdentity>, position_ms: u64, is_playing: bool) -> Self {
        Self {
            track,
            position_ms,
            is_playing,
            observed_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_covers_every_field() {
        let a = TrackIdentity::new(Provider::Manual, "x", "Song", "Band");
        let b = TrackIdentity::new(Provider::Manual, "x", "Song", "Band");
        let c = TrackIdentity::new(Provider::Spotify, "x", "Song", "Band");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_provider_round_trips_through_str() {
        for p in [Provider::AcrCloud, Provider::Spotify, Provider::Manual] {
            assert_eq!(Provider::parse(p.as_str()), Some(p));
        }
        assert_eq!(Provider::parse("youtube"), None);
    }

    #[test]
    fn test_playback_state_json_uses_rfc3339() {
        let state = PlaybackState::new(None, 1500, true);
        let raw = serde_json::to_string(&state).unwrap();
        assert!(raw.contains("\"observed_at\":\""));
        let back: PlaybackState = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.position_ms, 1500);
    }
}
