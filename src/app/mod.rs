pub mod events;

use crate::config::{DeviceConfig, SyncConfig};
use crate::lyrics::{LyricsProvider, TimedLyricsDocument};
use crate::recognition::capture::{self, CaptureSettings};
use crate::recognition::{Recognition, Recognizer};
use crate::storage::Storage;
use crate::sync::{LyricResolution, SharedSynchronizer, display};
use crate::track::TrackIdentity;
use crate::tracker::{MediaTracker, PlayerReport, TrackerUpdate};
use events::{Event, LyricsEvent, RecognitionEvent};
use lru::LruCache;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cached "no lyrics" results older than this are looked up again.
const MISS_TTL_SECS: i64 = 24 * 60 * 60;

/// Everything a device needs to identify radio audio.
pub struct RecognitionSetup {
    pub recognizer: Arc<dyn Recognizer>,
    pub udp_port: u16,
    pub capture: CaptureSettings,
}

/// One media player and the lyrics following it.
pub struct Device {
    name: String,
    media_player: String,
    tracker: MediaTracker,
    sync: SharedSynchronizer,
    provider: Arc<dyn LyricsProvider>,
    cache: LyricsCache,
    recognition: Option<Arc<RecognitionSetup>>,
    recognition_task: Option<JoinHandle<()>>,
    tick_every: Duration,
    recognition_latency_ms: u64,
}

impl Device {
    pub fn new(
        device: &DeviceConfig,
        sync: &SyncConfig,
        provider: Arc<dyn LyricsProvider>,
        cache: LyricsCache,
    ) -> Self {
        Self {
            name: device.name.clone(),
            media_player: device.media_player.clone(),
            tracker: MediaTracker::new(sync.seek_threshold_ms, device.radio_prefixes.clone()),
            sync: SharedSynchronizer::default(),
            provider,
            cache,
            recognition: None,
            recognition_task: None,
            tick_every: Duration::from_millis(sync.tick_ms.max(1)),
            recognition_latency_ms: sync.recognition_latency_ms,
        }
    }

    pub fn with_recognition(mut self, setup: RecognitionSetup) -> Self {
        self.recognition = Some(Arc::new(setup));
        self
    }

    pub fn synchronizer(&self) -> &SharedSynchronizer {
        &self.sync
    }

    /// Drive the device until `Shutdown` arrives or every sender is gone.
    /// Lyric windows are written to `out`.
    pub async fn run<W>(mut self, tx: mpsc::Sender<Event>, mut rx: mpsc::Receiver<Event>, out: W)
    where
        W: Write + Send + 'static,
    {
        let display = display::spawn_display(self.name.clone(), self.sync.subscribe(), out);
        let mut ticker = tokio::time::interval(self.tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(device = %self.name, "device loop started");

        loop {
            tokio::select! {
                ev = rx.recv() => match ev {
                    Some(Event::Shutdown) | None => break,
                    Some(ev) => self.handle(ev, &tx),
                },
                _ = ticker.tick() => self.tick(OffsetDateTime::now_utc()),
            }
        }

        if let Some(task) = self.recognition_task.take() {
            task.abort();
        }
        display.abort();
        tracing::info!(device = %self.name, "device loop stopped");
    }

    fn handle(&mut self, event: Event, tx: &mpsc::Sender<Event>) {
        let now = OffsetDateTime::now_utc();
        match event {
            Event::Player(report) if !self.accepts(&report) => {
                tracing::trace!(device = %self.name, player = ?report.player, "report for another player");
            }
            Event::Player(report) => match self.tracker.observe(&report, now) {
                TrackerUpdate::TrackChanged(Some(track)) => {
                    self.cancel_recognition();
                    self.start_session(track.clone());
                    if self.tracker.is_radio() {
                        tracing::info!(device = %self.name, "radio source, lyrics come from recognition");
                        self.spawn_recognition(tx);
                    } else {
                        self.spawn_lyrics_fetch(track, tx);
                    }
                }
                TrackerUpdate::TrackChanged(None) => {
                    self.cancel_recognition();
                    self.sync.clear();
                }
                TrackerUpdate::Seeked { .. } | TrackerUpdate::StateChanged(_) => self.tick(now),
                TrackerUpdate::Unchanged => {}
            },
            Event::Lyrics(LyricsEvent::Loaded { track, document }) => {
                if self.sync.current_track().as_ref() != Some(&track) {
                    tracing::debug!(device = %self.name, track = %track, "dropping stale lyrics");
                    return;
                }
                match self.sync.load_track(track, document) {
                    Ok(()) => self.tick(now),
                    Err(e) => {
                        tracing::warn!(device = %self.name, "rejected lyrics document: {e}");
                    }
                }
            }
            Event::Recognition(RecognitionEvent::Recognized(found)) => {
                self.apply_recognition(found, tx);
            }
            Event::Recognition(RecognitionEvent::Failed(msg)) => {
                tracing::warn!(device = %self.name, "recognition failed: {msg}");
            }
            Event::Shutdown => {}
        }
    }

    /// Reports that name no player are taken by every device.
    fn accepts(&self, report: &PlayerReport) -> bool {
        match report.player.as_deref() {
            Some(player) => self.media_player.is_empty() || player == self.media_player,
            None => true,
        }
    }

    fn apply_recognition(&mut self, found: Recognition, tx: &mpsc::Sender<Event>) {
        // Only radio (or a bare capture with no player) takes its track from audio
        if self.tracker.has_source() && !self.tracker.is_radio() {
            tracing::debug!(
                device = %self.name,
                track = %found.identity,
                "dropping recognition for a source that is no longer radio"
            );
            return;
        }
        self.recognition_task = None;
        let latency = time::Duration::milliseconds(self.recognition_latency_ms as i64);
        self.tracker
            .anchor(found.identity.clone(), found.play_offset_ms, found.captured_at - latency);
        self.start_session(found.identity.clone());
        self.spawn_lyrics_fetch(found.identity, tx);
    }

    fn tick(&mut self, now: OffsetDateTime) {
        let snapshot = self.tracker.snapshot(now);
        if snapshot.track.is_none() {
            return;
        }
        if self.sync.resolve(&snapshot) == LyricResolution::TrackChanged {
            tracing::debug!(device = %self.name, "tracker and session disagree on track");
        }
    }

    fn start_session(&self, track: TrackIdentity) {
        if let Err(e) = self.sync.load_track(track, None) {
            tracing::warn!(device = %self.name, "could not reset session: {e}");
        }
    }

    fn cancel_recognition(&mut self) {
        if let Some(task) = self.recognition_task.take() {
            task.abort();
        }
    }

    fn spawn_lyrics_fetch(&self, track: TrackIdentity, tx: &mpsc::Sender<Event>) {
        let provider = self.provider.clone();
        let cache = self.cache.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let document = fetch_lyrics(&track, provider.as_ref(), &cache).await;
            let _ = tx
                .send(Event::Lyrics(LyricsEvent::Loaded { track, document }))
                .await;
        });
    }

    fn spawn_recognition(&mut self, tx: &mpsc::Sender<Event>) {
        let Some(setup) = self.recognition.clone() else {
            tracing::debug!(device = %self.name, "recognition not configured");
            return;
        };
        self.cancel_recognition();
        let tx = tx.clone();

        self.recognition_task = Some(tokio::spawn(async move {
            let event = match capture::bind(setup.udp_port).await {
                Ok(socket) => {
                    match capture::listen_and_recognize(
                        &socket,
                        setup.recognizer.as_ref(),
                        setup.capture,
                    )
                    .await
                    {
                        Ok(found) => RecognitionEvent::Recognized(found),
                        Err(e) => RecognitionEvent::Failed(e.to_string()),
                    }
                }
                Err(e) => RecognitionEvent::Failed(format!("{e:#}")),
            };
            let _ = tx.send(Event::Recognition(event)).await;
        }));
    }
}

/// Cache, then provider, then cache fill. Provider failures count as "no
/// lyrics" and are not cached.
pub async fn fetch_lyrics(
    track: &TrackIdentity,
    provider: &dyn LyricsProvider,
    cache: &LyricsCache,
) -> Option<TimedLyricsDocument> {
    if let Some(hit) = cache.get(track).await {
        tracing::debug!(track = %track, found = hit.is_some(), "lyrics cache hit");
        return hit;
    }

    match provider.fetch(track).await {
        Ok(document) => {
            cache.put(track, document.clone()).await;
            document
        }
        Err(e) => {
            tracing::warn!(track = %track, "lyrics provider failed: {e}");
            None
        }
    }
}

/// In-memory LRU in front of the SQLite lyrics table.
#[derive(Clone)]
pub struct LyricsCache {
    memory: Arc<Mutex<LruCache<TrackIdentity, Option<TimedLyricsDocument>>>>,
    storage: Option<StorageHandle>,
}

impl LyricsCache {
    /// `storage_path` of `None` keeps the cache in memory only.
    pub fn new(capacity: usize, storage_path: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Arc::new(Mutex::new(LruCache::new(capacity))),
            storage: storage_path.map(|path| StorageHandle { path }),
        }
    }

    fn memory(&self) -> MutexGuard<'_, LruCache<TrackIdentity, Option<TimedLyricsDocument>>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Some(None)` is a cached miss.
    pub async fn get(&self, track: &TrackIdentity) -> Option<Option<TimedLyricsDocument>> {
        let remembered = self.memory().get(track).cloned();
        if remembered.is_some() {
            return remembered;
        }

        let storage = self.storage.clone()?;
        let key = track.clone();
        let cached = match tokio::task::spawn_blocking(move || storage.get_lyrics(&key)).await {
            Ok(Ok(cached)) => cached?,
            Ok(Err(e)) => {
                tracing::warn!("lyrics cache read failed: {e:#}");
                return None;
            }
            Err(e) => {
                tracing::warn!("lyrics cache task failed: {e}");
                return None;
            }
        };

        if cached.document.is_none() && now_unix() - cached.fetched_at > MISS_TTL_SECS {
            return None;
        }
        self.memory().put(track.clone(), cached.document.clone());
        Some(cached.document)
    }

    pub async fn put(&self, track: &TrackIdentity, document: Option<TimedLyricsDocument>) {
        self.memory().put(track.clone(), document.clone());

        let Some(storage) = self.storage.clone() else {
            return;
        };
        let key = track.clone();
        let now = now_unix();
        match tokio::task::spawn_blocking(move || storage.cache_lyrics(&key, document.as_ref(), now))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("lyrics cache write failed: {e:#}"),
            Err(e) => tracing::warn!("lyrics cache task failed: {e}"),
        }
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// Simple way to use rusqlite from async tasks: open per-operation.
#[derive(Clone)]
struct StorageHandle {
    path: PathBuf,
}

impl StorageHandle {
    fn open(&self) -> anyhow::Result<Storage> {
        Storage::open(&self.path)
    }

    fn get_lyrics(&self, track: &TrackIdentity) -> anyhow::Result<Option<crate::storage::CachedLyrics>> {
        self.open()?.get_lyrics(track)
    }

    fn cache_lyrics(
        &self,
        track: &TrackIdentity,
        document: Option<&TimedLyricsDocument>,
        now_unix: i64,
    ) -> anyhow::Result<()> {
        self.open()?.cache_lyrics(track, document, now_unix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::{LyricUnit, ProviderError};
    use crate::recognition::RecognitionError;
    use crate::track::Provider;
    use crate::tracker::PlayerStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a one-line document whose text is the track title, nothing
    /// for "Missing", and an error for "Broken".
    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LyricsProvider for FakeProvider {
        async fn fetch(
            &self,
            identity: &TrackIdentity,
        ) -> Result<Option<TimedLyricsDocument>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match identity.title() {
                "Missing" => Ok(None),
                "Broken" => Err(ProviderError::Unavailable("down".into())),
                title => Ok(Some(TimedLyricsDocument::new(vec![LyricUnit::new(
                    0, 60_000, title,
                )]))),
            }
        }
    }

    /// Never matches, so a capture task stays alive until aborted.
    struct DeafRecognizer;

    #[async_trait]
    impl Recognizer for DeafRecognizer {
        async fn recognize(
            &self,
            _wav: Vec<u8>,
            _captured_at: OffsetDateTime,
        ) -> Result<Recognition, RecognitionError> {
            Err(RecognitionError::NoMatchFound)
        }
    }

    fn recognized(id: &str, title: &str) -> Event {
        Event::Recognition(RecognitionEvent::Recognized(Recognition {
            identity: TrackIdentity::new(Provider::AcrCloud, id, title, "Singer"),
            play_offset_ms: 10_000,
            spotify_id: None,
            captured_at: OffsetDateTime::now_utc(),
        }))
    }

    fn report(id: &str, title: &str) -> PlayerReport {
        PlayerReport {
            player: None,
            content_id: Some(id.to_string()),
            title: Some(title.to_string()),
            artist: Some("Band".into()),
            status: PlayerStatus::Playing,
            position_secs: Some(1.0),
            updated_at: Some(OffsetDateTime::now_utc()),
        }
    }

    fn device(provider: Arc<FakeProvider>) -> Device {
        Device::new(
            &DeviceConfig::default(),
            &SyncConfig::default(),
            provider,
            LyricsCache::new(8, None),
        )
    }

    fn current_text(device: &Device) -> Option<String> {
        device
            .synchronizer()
            .document()
            .and_then(|d| d.get(0).map(|u| u.text.clone()))
    }

    #[tokio::test]
    async fn test_track_change_fetches_and_loads() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        dev.handle(Event::Player(report("file:///a.flac", "Alpha")), &tx);
        assert_eq!(
            dev.synchronizer().current_track().map(|t| t.title().to_string()),
            Some("Alpha".into())
        );
        assert!(dev.synchronizer().document().is_none());

        let loaded = rx.recv().await.unwrap();
        dev.handle(loaded, &tx);
        assert_eq!(current_text(&dev).as_deref(), Some("Alpha"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_fetch_is_dropped() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider);
        let (tx, mut rx) = mpsc::channel(8);

        dev.handle(Event::Player(report("file:///a.flac", "Alpha")), &tx);
        dev.handle(Event::Player(report("file:///b.flac", "Beta")), &tx);

        for _ in 0..2 {
            let loaded = rx.recv().await.unwrap();
            dev.handle(loaded, &tx);
        }
        assert_eq!(
            dev.synchronizer().current_track().map(|t| t.title().to_string()),
            Some("Beta".into())
        );
        assert_eq!(current_text(&dev).as_deref(), Some("Beta"));
    }

    #[tokio::test]
    async fn test_radio_waits_for_recognition() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        dev.handle(Event::Player(report("library://radio/7", "Station")), &tx);
        let nothing = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(nothing.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let recognized = TrackIdentity::new(Provider::AcrCloud, "acr9", "Heard", "Singer");
        let captured_at = OffsetDateTime::now_utc();
        dev.handle(
            Event::Recognition(RecognitionEvent::Recognized(Recognition {
                identity: recognized.clone(),
                play_offset_ms: 10_000,
                spotify_id: None,
                captured_at,
            })),
            &tx,
        );
        assert_eq!(dev.tracker.track(), Some(&recognized));
        assert!(dev.tracker.position_at(captured_at) >= 12_000);

        let loaded = rx.recv().await.unwrap();
        dev.handle(loaded, &tx);
        assert_eq!(current_text(&dev).as_deref(), Some("Heard"));
    }

    #[tokio::test]
    async fn test_late_recognition_after_leaving_radio_is_ignored() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider.clone());
        let (tx, mut rx) = mpsc::channel(8);

        dev.handle(Event::Player(report("library://radio/7", "Station")), &tx);
        dev.handle(Event::Player(report("file:///alpha.flac", "Alpha")), &tx);
        dev.handle(recognized("acr1", "RadioHit"), &tx);

        let loaded = rx.recv().await.unwrap();
        dev.handle(loaded, &tx);

        assert_eq!(dev.tracker.track().map(|t| t.title()), Some("Alpha"));
        assert_eq!(
            dev.synchronizer().current_track().map(|t| t.title().to_string()),
            Some("Alpha".into())
        );
        assert_eq!(current_text(&dev).as_deref(), Some("Alpha"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recognition_without_player_source_is_applied() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider);
        let (tx, mut rx) = mpsc::channel(8);

        dev.handle(recognized("acr1", "Heard"), &tx);
        assert_eq!(dev.tracker.track().map(|t| t.title()), Some("Heard"));

        let loaded = rx.recv().await.unwrap();
        dev.handle(loaded, &tx);
        assert_eq!(current_text(&dev).as_deref(), Some("Heard"));
    }

    #[tokio::test]
    async fn test_leaving_radio_cancels_capture() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider).with_recognition(RecognitionSetup {
            recognizer: Arc::new(DeafRecognizer),
            udp_port: 0,
            capture: CaptureSettings::default(),
        });
        let (tx, _rx) = mpsc::channel(8);

        dev.handle(Event::Player(report("library://radio/7", "Station")), &tx);
        assert!(dev.recognition_task.is_some());

        dev.handle(Event::Player(report("file:///alpha.flac", "Alpha")), &tx);
        assert!(dev.recognition_task.is_none());
    }

    #[tokio::test]
    async fn test_reports_for_other_players_are_ignored() {
        let provider = Arc::new(FakeProvider::default());
        let cfg = DeviceConfig {
            media_player: "media_player.kitchen".into(),
            ..DeviceConfig::default()
        };
        let mut dev = Device::new(
            &cfg,
            &SyncConfig::default(),
            provider.clone(),
            LyricsCache::new(8, None),
        );
        let (tx, mut rx) = mpsc::channel(8);

        let mut den = report("file:///den.flac", "Den");
        den.player = Some("media_player.den".into());
        dev.handle(Event::Player(den), &tx);
        assert!(dev.synchronizer().current_track().is_none());

        let mut kitchen = report("file:///kitchen.flac", "Kitchen");
        kitchen.player = Some("media_player.kitchen".into());
        dev.handle(Event::Player(kitchen), &tx);
        let loaded = rx.recv().await.unwrap();
        dev.handle(loaded, &tx);
        assert_eq!(current_text(&dev).as_deref(), Some("Kitchen"));

        dev.handle(Event::Player(report("file:///any.flac", "Any")), &tx);
        assert_eq!(
            dev.synchronizer().current_track().map(|t| t.title().to_string()),
            Some("Any".into())
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_idle_report_clears_session() {
        let provider = Arc::new(FakeProvider::default());
        let mut dev = device(provider);
        let (tx, _rx) = mpsc::channel(8);

        dev.handle(Event::Player(report("file:///a.flac", "Alpha")), &tx);
        let idle = PlayerReport {
            player: None,
            content_id: None,
            title: None,
            artist: None,
            status: PlayerStatus::Idle,
            position_secs: None,
            updated_at: None,
        };
        dev.handle(Event::Player(idle), &tx);
        assert!(dev.synchronizer().current_track().is_none());
    }

    #[tokio::test]
    async fn test_cache_hits_bypass_provider() {
        let provider = FakeProvider::default();
        let cache = LyricsCache::new(8, None);
        let hit = TrackIdentity::new(Provider::Manual, "1", "Alpha", "Band");
        let miss = TrackIdentity::new(Provider::Manual, "2", "Missing", "Band");
        let broken = TrackIdentity::new(Provider::Manual, "3", "Broken", "Band");

        for _ in 0..2 {
            assert!(fetch_lyrics(&hit, &provider, &cache).await.is_some());
            assert!(fetch_lyrics(&miss, &provider, &cache).await.is_none());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        for _ in 0..2 {
            assert!(fetch_lyrics(&broken, &provider, &cache).await.is_none());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_sqlite_layer_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        let track = TrackIdentity::new(Provider::Spotify, "sp", "Alpha", "Band");
        let doc = TimedLyricsDocument::new(vec![LyricUnit::new(0, 10, "x")]);

        LyricsCache::new(8, Some(path.clone()))
            .put(&track, Some(doc.clone()))
            .await;

        let fresh = LyricsCache::new(8, Some(path));
        assert_eq!(fresh.get(&track).await, Some(Some(doc)));
    }

    #[tokio::test]
    async fn test_sqlite_layer_keeps_same_stream_tracks_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        let a = TrackIdentity::new(Provider::Manual, "airplay://stream", "Song A", "Band");
        let b = TrackIdentity::new(Provider::Manual, "airplay://stream", "Song B", "Band");
        let doc = TimedLyricsDocument::new(vec![LyricUnit::new(0, 10, "lyrics of A")]);

        LyricsCache::new(8, Some(path.clone()))
            .put(&a, Some(doc.clone()))
            .await;

        let fresh = LyricsCache::new(8, Some(path));
        assert_eq!(fresh.get(&b).await, None);
        assert_eq!(fresh.get(&a).await, Some(Some(doc)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let provider = Arc::new(FakeProvider::default());
        let dev = device(provider);
        let (tx, rx) = mpsc::channel(8);

        let task = tokio::spawn(dev.run(tx.clone(), rx, std::io::sink()));
        tx.send(Event::Player(report("file:///a.flac", "Alpha")))
            .await
            .unwrap();
        tx.send(Event::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
