use super::synchronizer::{LyricResolution, LyricSynchronizer, SyncEvent};
use crate::lyrics::{InvalidDocumentError, TimedLyricsDocument};
use crate::track::{PlaybackState, TrackIdentity};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Cloneable handle serializing `load_track` / `resolve` across tasks.
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedSynchronizer {
    inner: Arc<Mutex<LyricSynchronizer>>,
}

impl SharedSynchronizer {
    fn lock(&self) -> MutexGuard<'_, LyricSynchronizer> {
        // Mutations never panic midway, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load_track(
        &self,
        track: TrackIdentity,
        document: Option<TimedLyricsDocument>,
    ) -> Result<(), InvalidDocumentError> {
        self.lock().load_track(track, document)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn resolve(&self, position: &PlaybackState) -> LyricResolution {
        self.lock().resolve(position)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.lock().subscribe()
    }

    pub fn current_track(&self) -> Option<TrackIdentity> {
        self.lock().session().map(|s| s.track().clone())
    }

    /// Clone of the loaded document.
    #[cfg(test)]
    pub fn document(&self) -> Option<TimedLyricsDocument> {
        self.lock()
            .session()
            .and_then(|s| s.document().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricUnit;
    use crate::track::Provider;

    #[tokio::test]
    async fn test_handles_share_one_session() {
        let shared = SharedSynchronizer::default();
        let other = shared.clone();
        let track = TrackIdentity::new(Provider::Manual, "1", "Song", "Band");
        let doc = TimedLyricsDocument::new(vec![LyricUnit::new(0, 1000, "hi")]);

        let loader = {
            let track = track.clone();
            tokio::spawn(async move { other.load_track(track, Some(doc)) })
        };
        loader.await.unwrap().unwrap();

        assert_eq!(shared.current_track(), Some(track.clone()));
        let state = PlaybackState::new(Some(track), 10, true);
        assert_eq!(shared.resolve(&state).index(), Some(0));
        assert_eq!(shared.document().map(|d| d.len()), Some(1));
    }
}
