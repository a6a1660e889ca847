//! ACRCloud identify client
//!
//! API Documentation: https://docs.acrcloud.com/reference/identification-api

use super::{Recognition, RecognitionError, Recognizer};
use crate::lyrics::text::strip_cjk;
use crate::track::{Provider, TrackIdentity};
use anyhow::Context;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::Sha1;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

type HmacSha1 = Hmac<Sha1>;

const ENDPOINT: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

/// Project credentials, shared read-only by every device.
#[derive(Clone, PartialEq, Eq)]
pub struct AcrCloudCredentials {
    pub host: String,
    pub access_key: String,
    pub access_secret: String,
}

impl fmt::Debug for AcrCloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcrCloudCredentials")
            .field("host", &self.host)
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

impl AcrCloudCredentials {
    /// `base64(HMAC-SHA1(secret, "POST\n/v1/identify\n<key>\naudio\n1\n<timestamp>"))`
    pub fn sign(&self, timestamp: i64) -> Result<String, RecognitionError> {
        let string_to_sign = format!(
            "POST\n{ENDPOINT}\n{}\n{DATA_TYPE}\n{SIGNATURE_VERSION}\n{timestamp}",
            self.access_key
        );
        let mut mac = HmacSha1::new_from_slice(self.access_secret.as_bytes())
            .map_err(|e| RecognitionError::AuthError(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}{ENDPOINT}")
        } else {
            format!("https://{host}{ENDPOINT}")
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    status: Status,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Status {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    music: Vec<Music>,
}

#[derive(Debug, Deserialize)]
struct Music {
    acrid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    play_offset_ms: u64,
    #[serde(default)]
    external_metadata: Option<ExternalMetadata>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalMetadata {
    #[serde(default)]
    spotify: Option<SpotifyMetadata>,
}

#[derive(Debug, Deserialize)]
struct SpotifyMetadata {
    track: SpotifyTrack,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
}

/// Map an identify response body to a recognition outcome.
fn parse_response(body: &str, captured_at: OffsetDateTime) -> Result<Recognition, RecognitionError> {
    let response: IdentifyResponse = serde_json::from_str(body)
        .map_err(|e| RecognitionError::Transport(format!("decode identify response: {e}")))?;

    match response.status.code {
        0 => {}
        1001 => return Err(RecognitionError::NoMatchFound),
        3001 | 3014 => return Err(RecognitionError::AuthError(response.status.msg)),
        3003 | 3015 => return Err(RecognitionError::RateLimited),
        code => {
            return Err(RecognitionError::Service {
                code,
                message: response.status.msg,
            });
        }
    }

    let Some(music) = response
        .metadata
        .and_then(|m| m.music.into_iter().next())
    else {
        return Err(RecognitionError::NoMatchFound);
    };

    let artist = music
        .artists
        .first()
        .map(|a| strip_cjk(&a.name))
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let title = strip_cjk(&music.title);
    let spotify_id = music
        .external_metadata
        .and_then(|m| m.spotify)
        .map(|s| s.track.id);

    Ok(Recognition {
        identity: TrackIdentity::new(Provider::AcrCloud, music.acrid, title, artist),
        play_offset_ms: music.play_offset_ms,
        spotify_id,
        captured_at,
    })
}

#[derive(Debug, Clone)]
pub struct AcrCloudClient {
    client: reqwest::Client,
    credentials: Arc<AcrCloudCredentials>,
}

impl AcrCloudClient {
    pub fn new(credentials: Arc<AcrCloudCredentials>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build acrcloud http client")?;
        Ok(Self {
            client,
            credentials,
        })
    }

    fn form(&self, wav: Vec<u8>, timestamp: i64) -> Result<Form, RecognitionError> {
        let signature = self.credentials.sign(timestamp)?;
        let sample_bytes = wav.len().to_string();
        let sample = Part::bytes(wav)
            .file_name("sample.wav")
            .mime_str("audio/wav")
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;

        Ok(Form::new()
            .part("sample", sample)
            .text("sample_bytes", sample_bytes)
            .text("access_key", self.credentials.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("signature", signature)
            .text("timestamp", timestamp.to_string()))
    }
}

#[async_trait]
impl Recognizer for AcrCloudClient {
    async fn recognize(
        &self,
        wav: Vec<u8>,
        captured_at: OffsetDateTime,
    ) -> Result<Recognition, RecognitionError> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let bytes = wav.len();
        let form = self.form(wav, timestamp)?;
        let url = self.credentials.url();
        tracing::debug!(%url, bytes, "acrcloud identify");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RecognitionError::Transport(format!(
                "ACRCloud HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RecognitionError::Transport(e.to_string()))?;
        let result = parse_response(&body, captured_at);
        match &result {
            Ok(r) => tracing::info!(track = %r.identity, offset_ms = r.play_offset_ms, "recognized"),
            Err(e) => tracing::debug!("recognition failed: {e}"),
        }
        result
    }
}
