use crate::lyrics::TimedLyricsDocument;
use crate::track::{Provider, TrackIdentity};
use anyhow::Context;
use rusqlite::{Connection, params};
use std::path::Path;

/// A cached lookup. `document` is `None` when the provider had nothing,
/// so misses are not re-fetched on every play.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLyrics {
    pub document: Option<TimedLyricsDocument>,
    pub fetched_at: i64,
}

const SCHEMA_VERSION: i64 = 2;

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("read schema version")?;
        if version < SCHEMA_VERSION {
            // Older caches were keyed on (provider, external_id) only
            self.conn
                .execute_batch("DROP TABLE IF EXISTS lyrics_cache;")
                .context("drop old lyrics cache")?;
        }

        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS lyrics_cache (
  provider TEXT NOT NULL,
  external_id TEXT NOT NULL,
  title TEXT NOT NULL,
  artist TEXT NOT NULL,
  document_json TEXT,
  fetched_at INTEGER NOT NULL,
  PRIMARY KEY (provider, external_id, title, artist)
);

CREATE INDEX IF NOT EXISTS idx_lyrics_fetched_at ON lyrics_cache(fetched_at DESC);
"#,
            )
            .context("init schema")?;
        self.conn
            .pragma_update(None, "user_version", SCHEMA_VERSION)
            .context("write schema version")?;
        Ok(())
    }

    /// Cache a lookup result for a track
    pub fn cache_lyrics(
        &self,
        track: &TrackIdentity,
        document: Option<&TimedLyricsDocument>,
        now_unix: i64,
    ) -> anyhow::Result<()> {
        let document_json = document
            .map(serde_json::to_string)
            .transpose()
            .context("encode lyrics document")?;
        self.conn
            .execute(
                r#"
INSERT INTO lyrics_cache(provider, external_id, title, artist, document_json, fetched_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(provider, external_id, title, artist) DO UPDATE SET
  document_json=excluded.document_json,
  fetched_at=excluded.fetched_at
"#,
                params![
                    track.provider().as_str(),
                    track.external_id(),
                    track.title(),
                    track.artist(),
                    document_json,
                    now_unix
                ],
            )
            .context("cache lyrics")?;
        Ok(())
    }

    /// Get cached lyrics
    pub fn get_lyrics(&self, track: &TrackIdentity) -> anyhow::Result<Option<CachedLyrics>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT document_json, fetched_at FROM lyrics_cache
WHERE provider=?1 AND external_id=?2 AND title=?3 AND artist=?4
"#,
            )
            .context("prepare lyrics cache")?;
        let mut rows = stmt
            .query(params![
                track.provider().as_str(),
                track.external_id(),
                track.title(),
                track.artist()
            ])
            .context("query lyrics cache")?;
        if let Some(row) = rows.next().context("read lyrics cache row")? {
            let json: Option<String> = row.get(0)?;
            let fetched_at: i64 = row.get(1)?;
            let document = json
                .map(|j| serde_json::from_str(&j))
                .transpose()
                .context("decode cached lyrics document")?;
            Ok(Some(CachedLyrics {
                document,
                fetched_at,
            }))
        } else {
            Ok(None)
        }
    }

    /// Recently cached tracks, newest first
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<(TrackIdentity, bool)>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT provider, external_id, title, artist, document_json IS NOT NULL
FROM lyrics_cache
ORDER BY fetched_at DESC
LIMIT ?1
"#,
        )?;

        let tracks = stmt
            .query_map(params![limit as i64], |row| {
                let provider: String = row.get(0)?;
                let external_id: String = row.get(1)?;
                let title: String = row.get(2)?;
                let artist: String = row.get(3)?;
                let has_lyrics: bool = row.get(4)?;
                Ok((provider, external_id, title, artist, has_lyrics))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(provider, id, title, artist, has_lyrics)| {
                let provider = Provider::parse(&provider)?;
                Some((TrackIdentity::new(provider, id, title, artist), has_lyrics))
            })
            .collect();

        Ok(tracks)
    }

    /// Drop every cached entry, returning how many were removed.
    pub fn clear(&self) -> anyhow::Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM lyrics_cache", [])
            .context("clear lyrics cache")?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricUnit;

    fn track(id: &str) -> TrackIdentity {
        TrackIdentity::new(Provider::Spotify, id, "Song", "Band")
    }

    fn doc() -> TimedLyricsDocument {
        TimedLyricsDocument::new(vec![
            LyricUnit::new(0, 1000, "one"),
            LyricUnit::new(1000, 2000, "two"),
        ])
    }

    #[test]
    fn test_cache_round_trip_and_upsert() {
        let s = Storage::open_in_memory().unwrap();
        assert!(s.get_lyrics(&track("a")).unwrap().is_none());

        s.cache_lyrics(&track("a"), None, 10).unwrap();
        let miss = s.get_lyrics(&track("a")).unwrap().unwrap();
        assert_eq!(miss.document, None);
        assert_eq!(miss.fetched_at, 10);

        s.cache_lyrics(&track("a"), Some(&doc()), 20).unwrap();
        let hit = s.get_lyrics(&track("a")).unwrap().unwrap();
        assert_eq!(hit.document, Some(doc()));
        assert_eq!(hit.fetched_at, 20);
    }

    #[test]
    fn test_key_includes_provider() {
        let s = Storage::open_in_memory().unwrap();
        s.cache_lyrics(&track("same"), Some(&doc()), 1).unwrap();
        let other = TrackIdentity::new(Provider::Manual, "same", "Song", "Band");
        assert!(s.get_lyrics(&other).unwrap().is_none());
    }

    #[test]
    fn test_key_includes_title_and_artist() {
        let s = Storage::open_in_memory().unwrap();
        let a = TrackIdentity::new(Provider::Manual, "airplay://stream", "Song A", "Band");
        let b = TrackIdentity::new(Provider::Manual, "airplay://stream", "Song B", "Band");
        let c = TrackIdentity::new(Provider::Manual, "airplay://stream", "Song A", "Other");

        s.cache_lyrics(&a, Some(&doc()), 1).unwrap();
        assert!(s.get_lyrics(&b).unwrap().is_none());
        assert!(s.get_lyrics(&c).unwrap().is_none());

        s.cache_lyrics(&b, None, 2).unwrap();
        assert_eq!(s.get_lyrics(&a).unwrap().unwrap().document, Some(doc()));
        assert_eq!(s.get_lyrics(&b).unwrap().unwrap().document, None);
        assert_eq!(s.recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_old_cache_table_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
CREATE TABLE lyrics_cache (
  provider TEXT NOT NULL,
  external_id TEXT NOT NULL,
  title TEXT NOT NULL,
  artist TEXT NOT NULL,
  document_json TEXT,
  fetched_at INTEGER NOT NULL,
  PRIMARY KEY (provider, external_id)
);
INSERT INTO lyrics_cache VALUES('spotify', 'a', 'Song', 'Band', NULL, 1);
"#,
            )
            .unwrap();
        }

        let s = Storage::open(&path).unwrap();
        assert!(s.get_lyrics(&track("a")).unwrap().is_none());
        s.cache_lyrics(&track("a"), Some(&doc()), 2).unwrap();
        s.cache_lyrics(&track("a"), Some(&doc()), 3).unwrap();
        assert_eq!(s.get_lyrics(&track("a")).unwrap().unwrap().fetched_at, 3);
    }

    #[test]
    fn test_recent_and_clear() {
        let s = Storage::open_in_memory().unwrap();
        s.cache_lyrics(&track("old"), Some(&doc()), 1).unwrap();
        s.cache_lyrics(&track("new"), None, 2).unwrap();

        let recent = s.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].0.external_id(), "new");
        assert!(!recent[0].1);
        assert!(recent[1].1);

        assert_eq!(s.clear().unwrap(), 2);
        assert!(s.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite3");
        {
            let s = Storage::open(&path).unwrap();
            s.cache_lyrics(&track("a"), Some(&doc()), 5).unwrap();
        }
        let reopened = Storage::open(&path).unwrap();
        assert!(reopened.get_lyrics(&track("a")).unwrap().is_some());
    }
}
