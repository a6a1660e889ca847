//! Audio recognition
//!
//! - `acrcloud`: signed identify requests against ACRCloud
//! - `capture`: UDP PCM capture, WAV encoding, and the chunked recognize loop

pub mod acrcloud;
pub mod capture;

use crate::track::TrackIdentity;
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

pub use acrcloud::{AcrCloudClient, AcrCloudCredentials};

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("no match found")]
    NoMatchFound,
    #[error("recognition rate limited")]
    RateLimited,
    #[error("recognition rejected credentials: {0}")]
    AuthError(String),
    #[error("recognition service error {code}: {message}")]
    Service { code: i64, message: String },
    #[error("recognition transport failed: {0}")]
    Transport(String),
}

/// A matched sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub identity: TrackIdentity,
    /// Offset into the track at the start of the sample.
    pub play_offset_ms: u64,
    pub spotify_id: Option<String>,
    /// When the sample started arriving.
    pub captured_at: OffsetDateTime,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Identify a WAV-encoded sample captured at `captured_at`.
    async fn recognize(
        &self,
        wav: Vec<u8>,
        captured_at: OffsetDateTime,
    ) -> Result<Recognition, RecognitionError>;
}
