//! Lyric synchronizer
//!
//! Maps playback snapshots to the active lyric unit of the loaded track.
//! Lookup is a binary search over the document, so seeks in either
//! direction resolve the same way as steady playback.

use crate::lyrics::{InvalidDocumentError, LyricUnit, TimedLyricsDocument};
use crate::track::{PlaybackState, TrackIdentity};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Outcome of resolving one playback snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricResolution {
    /// The snapshot names a different track than the loaded session.
    TrackChanged,
    /// The session has no lyrics document.
    NoLyrics,
    /// Position precedes the first unit.
    BeforeFirst,
    /// `index` is the active unit, or the nearest preceding one when the
    /// position sits in a gap (`in_gap`).
    Unit {
        index: usize,
        unit: LyricUnit,
        in_gap: bool,
    },
    /// Position is at or past the end of the last unit.
    AfterLast,
}

impl LyricResolution {
    pub fn index(&self) -> Option<usize> {
        match self {
            LyricResolution::Unit { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Notifications for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// `load_track` replaced the session. Unit indices in later events
    /// refer to this `document`.
    SessionReset {
        track: TrackIdentity,
        document: Option<TimedLyricsDocument>,
    },
    /// The cursor landed on a unit with no unit before it (first resolution
    /// after a reset, or coming back from before-first / after-last).
    UnitEntered { index: usize },
    /// The cursor moved from one unit to another.
    UnitChanged { previous: usize, current: usize },
    /// The cursor left the document (before-first or after-last).
    UnitCleared { previous: usize },
}

/// Binding between one track and its (possibly absent) lyrics.
#[derive(Debug, Clone)]
pub struct SyncSession {
    track: TrackIdentity,
    document: Option<TimedLyricsDocument>,
    last_resolved: Option<usize>,
}

impl SyncSession {
    pub fn track(&self) -> &TrackIdentity {
        &self.track
    }

    #[cfg(test)]
    pub fn document(&self) -> Option<&TimedLyricsDocument> {
        self.document.as_ref()
    }

    #[cfg(test)]
    pub fn last_resolved(&self) -> Option<usize> {
        self.last_resolved
    }
}

#[derive(Debug)]
pub struct LyricSynchronizer {
    session: Option<SyncSession>,
    events: broadcast::Sender<SyncEvent>,
}

impl Default for LyricSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LyricSynchronizer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session: None,
            events,
        }
    }

    /// Receive session resets and cursor movements.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Option<&SyncSession> {
        self.session.as_ref()
    }

    /// Replace the active session. An empty document counts as no lyrics.
    ///
    /// A document that fails validation is refused and the current session
    /// stays as it was.
    pub fn load_track(
        &mut self,
        track: TrackIdentity,
        document: Option<TimedLyricsDocument>,
    ) -> Result<(), InvalidDocumentError> {
        if let Some(doc) = &document {
            doc.validate()?;
        }
        let document = document.filter(|d| !d.is_empty());

        tracing::debug!(
            track = %track,
            units = document.as_ref().map_or(0, |d| d.len()),
            "lyric session loaded"
        );

        self.session = Some(SyncSession {
            track: track.clone(),
            document: document.clone(),
            last_resolved: None,
        });
        // No subscribers is fine
        let _ = self.events.send(SyncEvent::SessionReset { track, document });
        Ok(())
    }

    /// Drop the session entirely.
    pub fn clear(&mut self) {
        self.session = None;
    }

    pub fn resolve(&mut self, position: &PlaybackState) -> LyricResolution {
        let Some(session) = self.session.as_mut() else {
            return match position.track {
                Some(_) => LyricResolution::TrackChanged,
                None => LyricResolution::NoLyrics,
            };
        };

        if position.track.as_ref() != Some(&session.track) {
            return LyricResolution::TrackChanged;
        }

        let Some(document) = session.document.as_ref() else {
            return LyricResolution::NoLyrics;
        };

        let resolution = lookup(document, position.position_ms);
        let current = resolution.index();
        let previous = session.last_resolved;
        session.last_resolved = current;

        let event = match (previous, current) {
            (Some(p), Some(c)) if p != c => Some(SyncEvent::UnitChanged {
                previous: p,
                current: c,
            }),
            (None, Some(c)) => Some(SyncEvent::UnitEntered { index: c }),
            (Some(p), None) => Some(SyncEvent::UnitCleared { previous: p }),
            _ => None,
        };

        if let Some(event) = event {
            tracing::trace!(
                ?event,
                position_ms = position.position_ms,
                playing = position.is_playing,
                "lyric cursor moved"
            );
            let _ = self.events.send(event);
        }

        resolution
    }
}

fn lookup(document: &TimedLyricsDocument, position_ms: u64) -> LyricResolution {
    let Some(end_ms) = document.end_ms() else {
        return LyricResolution::NoLyrics;
    };
    if position_ms >= end_ms {
        return LyricResolution::AfterLast;
    }
    let Some(index) = document.last_started(position_ms) else {
        return LyricResolution::BeforeFirst;
    };
    // Sorted, non-overlapping: if the last unit to start does not contain
    // the position, the position lies in the gap after it.
    let unit = document.units()[index].clone();
    let in_gap = !unit.contains(position_ms);
    LyricResolution::Unit {
        index,
        unit,
        in_gap,
    }
}
