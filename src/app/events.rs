use crate::lyrics::TimedLyricsDocument;
use crate::recognition::Recognition;
use crate::track::TrackIdentity;
use crate::tracker::PlayerReport;

#[derive(Debug, Clone)]
pub enum Event {
    /// A media player state report.
    Player(PlayerReport),
    /// A lyrics fetch finished. `document` is `None` when nothing was found.
    Lyrics(LyricsEvent),
    Recognition(RecognitionEvent),
    /// The report source is exhausted.
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum LyricsEvent {
    Loaded {
        track: TrackIdentity,
        document: Option<TimedLyricsDocument>,
    },
}

#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    Recognized(Recognition),
    Failed(String),
}
