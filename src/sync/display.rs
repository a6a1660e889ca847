//! Three-line lyric window for terminal output.

use super::synchronizer::SyncEvent;
use crate::lyrics::TimedLyricsDocument;
use std::io::Write;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricWindow {
    pub previous: Option<String>,
    pub current: Option<String>,
    pub next: Option<String>,
}

impl LyricWindow {
    /// Window centred on `index`. With no index the upcoming first line is
    /// shown as `next`.
    pub fn around(document: &TimedLyricsDocument, index: Option<usize>) -> Self {
        let text = |i: usize| document.get(i).map(|u| u.text.clone());
        match index {
            Some(i) => Self {
                previous: i.checked_sub(1).and_then(text),
                current: text(i),
                next: text(i + 1),
            },
            None => Self {
                previous: None,
                current: None,
                next: text(0),
            },
        }
    }

    pub fn render(&self) -> String {
        let line = |s: &Option<String>| s.as_deref().unwrap_or("").to_string();
        format!(
            "  {}\n> {}\n  {}",
            line(&self.previous),
            line(&self.current),
            line(&self.next)
        )
    }
}

/// Follows the event stream and renders each event against the document
/// announced by the most recent `SessionReset`.
#[derive(Debug, Default)]
pub struct DisplayState {
    document: Option<TimedLyricsDocument>,
}

impl DisplayState {
    /// Text to print for one synchronizer event, if any.
    pub fn render_event(&mut self, event: &SyncEvent) -> Option<String> {
        match event {
            SyncEvent::SessionReset { track, document } => {
                self.document = document.clone();
                Some(if document.is_some() {
                    format!("♪ {track}")
                } else {
                    format!("♪ {track} (no lyrics)")
                })
            }
            SyncEvent::UnitEntered { index }
            | SyncEvent::UnitChanged { current: index, .. } => {
                let doc = self.document.as_ref()?;
                Some(LyricWindow::around(doc, Some(*index)).render())
            }
            SyncEvent::UnitCleared { .. } => Some(LyricWindow::default().render()),
        }
    }
}

/// Print every synchronizer event to `out` until the channel closes.
pub fn spawn_display<W>(
    device: String,
    mut events: broadcast::Receiver<SyncEvent>,
    mut out: W,
) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        let mut state = DisplayState::default();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(text) = state.render_event(&event) else {
                        continue;
                    };
                    if let Err(e) = writeln!(out, "[{device}]\n{text}").and_then(|_| out.flush()) {
                        tracing::warn!(device = %device, "display write failed: {e}");
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Indices may now refer to a document we never saw
                    tracing::debug!(device = %device, skipped, "display lagging behind");
                    state = DisplayState::default();
                }
                Err(RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricUnit;
    use crate::sync::synchronizer::LyricSynchronizer;
    use crate::track::{PlaybackState, Provider, TrackIdentity};
    use std::sync::{Arc, Mutex};

    fn doc() -> TimedLyricsDocument {
        TimedLyricsDocument::new(vec![
            LyricUnit::new(0, 1000, "one"),
            LyricUnit::new(1000, 2000, "two"),
            LyricUnit::new(2000, 3000, "three"),
        ])
    }

    #[test]
    fn test_window_edges() {
        let d = doc();
        let first = LyricWindow::around(&d, Some(0));
        assert_eq!(first.previous, None);
        assert_eq!(first.current.as_deref(), Some("one"));
        assert_eq!(first.next.as_deref(), Some("two"));

        let last = LyricWindow::around(&d, Some(2));
        assert_eq!(last.previous.as_deref(), Some("two"));
        assert_eq!(last.next, None);

        let before = LyricWindow::around(&d, None);
        assert_eq!(before.next.as_deref(), Some("one"));
        assert_eq!(before.current, None);
    }

    #[test]
    fn test_render_marks_current_line() {
        let w = LyricWindow::around(&doc(), Some(1));
        assert_eq!(w.render(), "  one\n> two\n  three");
    }

    #[test]
    fn test_render_event_follows_cursor() {
        let mut state = DisplayState::default();
        let track = TrackIdentity::new(Provider::Manual, "1", "Song", "Band");

        let reset = state
            .render_event(&SyncEvent::SessionReset {
                track: track.clone(),
                document: Some(doc()),
            })
            .unwrap();
        assert!(reset.starts_with("♪ Band - Song"));

        let text = state
            .render_event(&SyncEvent::UnitChanged {
                previous: 0,
                current: 2,
            })
            .unwrap();
        assert!(text.contains("> three"));

        let reset = state
            .render_event(&SyncEvent::SessionReset {
                track,
                document: None,
            })
            .unwrap();
        assert!(reset.ends_with("(no lyrics)"));
        assert!(state.render_event(&SyncEvent::UnitEntered { index: 0 }).is_none());
    }

    #[test]
    fn test_queued_events_use_their_own_document() {
        let mut sync = LyricSynchronizer::new();
        let mut rx = sync.subscribe();
        let a = TrackIdentity::new(Provider::Manual, "a", "First", "Band");
        let b = TrackIdentity::new(Provider::Manual, "b", "Second", "Band");
        let other = TimedLyricsDocument::new(vec![
            LyricUnit::new(0, 1000, "uno"),
            LyricUnit::new(1000, 2000, "dos"),
            LyricUnit::new(2000, 3000, "tres"),
        ]);

        sync.load_track(a.clone(), Some(doc())).unwrap();
        sync.resolve(&PlaybackState::new(Some(a), 1500, true));
        sync.load_track(b, Some(other)).unwrap();

        let mut state = DisplayState::default();
        let mut rendered = Vec::new();
        while let Ok(event) = rx.try_recv() {
            rendered.extend(state.render_event(&event));
        }
        assert_eq!(rendered.len(), 3);
        assert!(rendered[1].contains("> two"));
        assert!(rendered[2].starts_with("♪ Band - Second"));
    }

    #[tokio::test]
    async fn test_display_task_writes_and_stops_when_channel_closes() {
        let (tx, rx) = broadcast::channel(8);
        let out = SharedBuf::default();
        let handle = spawn_display("test".into(), rx, out.clone());

        let track = TrackIdentity::new(Provider::Manual, "1", "Song", "Band");
        tx.send(SyncEvent::SessionReset {
            track,
            document: Some(doc()),
        })
        .unwrap();
        tx.send(SyncEvent::UnitEntered { index: 1 }).unwrap();
        drop(tx);

        handle.await.unwrap();
        let written = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(written.contains("[test]\n♪ Band - Song"));
        assert!(written.contains("  one\n> two\n  three"));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
