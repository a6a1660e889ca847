//! LRCLIB API client
//!
//! LRCLIB is a free lyrics API that provides synchronized (LRC format) lyrics.
//! API Documentation: https://lrclib.net/docs

use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

/// LRCLIB API response
#[derive(Debug, Deserialize, Clone)]
pub struct LrclibResponse {
    #[allow(dead_code)]
    id: i64,
    #[serde(rename = "trackName")]
    pub track_name: String,
    #[serde(rename = "artistName")]
    pub artist_name: String,
    /// Track length in seconds
    pub duration: Option<f64>,
    #[serde(rename = "plainLyrics")]
    pub plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    pub synced_lyrics: Option<String>,
}

impl LrclibResponse {
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| (d * 1000.0).round() as u64)
    }
}

/// LRCLIB API client
#[derive(Debug, Clone)]
pub struct LrclibClient {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://lrclib.net/api";
    const USER_AGENT: &'static str =
        concat!("music-companion/", env!("CARGO_PKG_VERSION"));

    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build lrclib http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get lyrics by track info
    pub async fn get_lyrics(
        &self,
        track_name: &str,
        artist_name: &str,
        album_name: Option<&str>,
        duration_secs: Option<u32>,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        // First try the "get" endpoint with exact match
        if let Some(lyrics) = self
            .get_exact(track_name, artist_name, album_name, duration_secs)
            .await?
        {
            return Ok(Some(lyrics));
        }

        // Fall back to search
        self.search(track_name, artist_name).await
    }

    /// Get lyrics with exact match
    async fn get_exact(
        &self,
        track_name: &str,
        artist_name: &str,
        album_name: Option<&str>,
        duration_secs: Option<u32>,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        let url = self.get_url(track_name, artist_name, album_name, duration_secs);
        tracing::debug!(%url, "lrclib get");

        let response = self.client.get(&url).send().await.context("lrclib get")?;

        if response.status().is_success() {
            let lyrics: LrclibResponse = response.json().await.context("decode lrclib get")?;
            Ok(Some(lyrics))
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            anyhow::bail!("LRCLIB API error: {}", response.status());
        }
    }

    /// Search for lyrics
    async fn search(
        &self,
        track_name: &str,
        artist_name: &str,
    ) -> anyhow::Result<Option<LrclibResponse>> {
        let url = self.search_url(track_name, artist_name);
        tracing::debug!(%url, "lrclib search");

        let response = self.client.get(&url).send().await.context("lrclib search")?;

        if response.status().is_success() {
            let results: Vec<LrclibResponse> =
                response.json().await.context("decode lrclib search")?;
            Ok(pick_best(results))
        } else if response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            anyhow::bail!("LRCLIB search error: {}", response.status());
        }
    }

    fn get_url(
        &self,
        track_name: &str,
        artist_name: &str,
        album_name: Option<&str>,
        duration_secs: Option<u32>,
    ) -> String {
        let mut url = format!(
            "{}/get?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name)
        );

        if let Some(album) = album_name {
            url.push_str(&format!("&album_name={}", urlencoding::encode(album)));
        }

        if let Some(duration) = duration_secs {
            url.push_str(&format!("&duration={}", duration));
        }
        url
    }

    fn search_url(&self, track_name: &str, artist_name: &str) -> String {
        let query = format!("{} {}", track_name, artist_name);
        format!("{}/search?q={}", self.base_url, urlencoding::encode(&query))
    }
}

/// First result with synced lyrics, or any result.
fn pick_best(results: Vec<LrclibResponse>) -> Option<LrclibResponse> {
    let synced = results
        .iter()
        .position(|r| r.synced_lyrics.as_deref().is_some_and(|s| !s.is_empty()));
    let mut results = results;
    match synced {
        Some(i) => Some(results.swap_remove(i)),
        None => results.into_iter().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: i64, synced: Option<&str>) -> LrclibResponse {
        LrclibResponse {
            id,
            track_name: "t".into(),
            artist_name: "a".into(),
            duration: Some(201.5),
            plain_lyrics: Some("plain".into()),
            synced_lyrics: synced.map(str::to_string),
        }
    }

    #[test]
    fn test_urls_are_encoded() {
        let client = LrclibClient::new("https://lrclib.test/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.get_url("Hey Jude", "The Beatles", None, Some(431)),
            "https://lrclib.test/api/get?track_name=Hey%20Jude&artist_name=The%20Beatles&duration=431"
        );
        assert_eq!(
            client.search_url("A&B", "C"),
            "https://lrclib.test/api/search?q=A%26B%20C"
        );
    }

    #[test]
    fn test_pick_best_prefers_synced() {
        let best = pick_best(vec![response(1, None), response(2, Some("")), response(3, Some("[00:01.00]x"))]);
        assert_eq!(best.map(|r| r.id), Some(3));

        let best = pick_best(vec![response(1, None), response(2, None)]);
        assert_eq!(best.map(|r| r.id), Some(1));

        assert!(pick_best(Vec::new()).is_none());
    }

    #[test]
    fn test_response_decodes_and_converts_duration() {
        let raw = r#"{"id":7,"trackName":"Song","artistName":"Band","albumName":null,
            "duration":201.5,"plainLyrics":"x","syncedLyrics":"[00:01.00]x"}"#;
        let r: LrclibResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(r.duration_ms(), Some(201_500));
        assert_eq!(r.track_name, "Song");
    }
}
